//! Solvability oracle.
//!
//! Classifies a single statement as solvable, unsolvable, or unknown by
//! asking the judge for a structured verdict. Malformed verdicts are retried
//! like transport failures; an exhausted retry budget degrades to an
//! `unknown` report rather than an error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionRequest, JudgeClient};
use crate::prompts;
use crate::retry::{retry_with, RetryPolicy};
use crate::tokens::{truncate_to_budget, TokenEstimator, SOLVABILITY_TRUNCATION_MARKER};

/// Maximum stored length of a verdict's reason text.
const MAX_REASON_LEN: usize = 300;

/// Three-valued solvability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solvability {
    Solvable,
    Unsolvable,
    /// The oracle could not produce a verdict.
    Unknown,
}

impl Solvability {
    pub fn is_solvable(&self) -> bool {
        matches!(self, Self::Solvable)
    }
}

/// Outcome of one solvability check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvabilityReport {
    pub solvable: Solvability,
    /// Judge confidence in `[0, 1]`; zero when the check failed.
    pub confidence: f64,
    pub reason: String,
    pub missing_info: Vec<String>,
    /// Whether a verdict was obtained at all.
    pub success: bool,
    /// Whether the statement was truncated before judging.
    pub truncated: bool,
}

impl SolvabilityReport {
    fn failed(reason: String, truncated: bool) -> Self {
        Self {
            solvable: Solvability::Unknown,
            confidence: 0.0,
            reason,
            missing_info: Vec::new(),
            success: false,
            truncated,
        }
    }
}

/// Configuration for the solvability oracle.
#[derive(Debug, Clone)]
pub struct SolvabilityConfig {
    /// Retry budget over transport and validation failures.
    pub max_retries: u32,
    /// Token budget for the statement fed to the judge.
    pub token_budget: usize,
}

impl Default for SolvabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            token_budget: 4096,
        }
    }
}

/// Classifies statements as solvable/unsolvable/unknown.
pub struct SolvabilityOracle {
    client: Arc<dyn JudgeClient>,
    estimator: Arc<dyn TokenEstimator>,
    config: SolvabilityConfig,
}

impl SolvabilityOracle {
    pub fn new(
        client: Arc<dyn JudgeClient>,
        estimator: Arc<dyn TokenEstimator>,
        config: SolvabilityConfig,
    ) -> Self {
        Self {
            client,
            estimator,
            config,
        }
    }

    /// Check one statement. Never errors: retry exhaustion degrades to an
    /// `unknown` report carrying the last failure description.
    #[instrument(skip(self, statement))]
    pub async fn check(&self, statement: &str) -> SolvabilityReport {
        if statement.trim().is_empty() {
            return SolvabilityReport {
                solvable: Solvability::Unsolvable,
                confidence: 1.0,
                reason: "Empty or invalid question".to_string(),
                missing_info: vec!["question content".to_string()],
                success: true,
                truncated: false,
            };
        }

        let (processed, truncated) = truncate_to_budget(
            self.estimator.as_ref(),
            statement,
            self.config.token_budget,
            SOLVABILITY_TRUNCATION_MARKER,
        );
        if truncated {
            debug!(
                "statement truncated to {} tokens for solvability check",
                self.config.token_budget
            );
        }

        let messages = vec![
            ChatMessage::system(prompts::SOLVABILITY_SYSTEM_PROMPT),
            ChatMessage::user(prompts::solvability_request(&processed)),
        ];

        let policy = RetryPolicy::new(self.config.max_retries);
        let verdict = retry_with(&policy, "solvability check", |_| {
            let request = CompletionRequest::new()
                .with_messages(messages.clone())
                .with_completions(1)
                .with_json_mode(true);
            async move {
                let responses = self.client.complete(request).await?;
                let raw = responses
                    .first()
                    .ok_or_else(|| Error::validation("empty response from judge"))?;
                parse_verdict(raw)
            }
        })
        .await;

        match verdict {
            Ok(mut report) => {
                report.truncated = truncated;
                report
            }
            Err(e) => SolvabilityReport::failed(format!("Failed to analyze: {}", e), truncated),
        }
    }
}

/// Parse and validate one structured verdict.
///
/// Required fields: `solvable` (bool), `confidence` (number in `[0, 1]`),
/// `reason` (string, silently capped), `missing_info` (list of strings).
/// Anything else is a validation failure.
fn parse_verdict(raw: &str) -> Result<SolvabilityReport> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::validation(format!("invalid JSON: {}", e)))?;

    let solvable = value
        .get("solvable")
        .ok_or_else(|| Error::validation("missing required field: solvable"))?
        .as_bool()
        .ok_or_else(|| Error::validation("'solvable' must be boolean"))?;

    let confidence = value
        .get("confidence")
        .ok_or_else(|| Error::validation("missing required field: confidence"))?
        .as_f64()
        .ok_or_else(|| Error::validation("'confidence' must be a number"))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(Error::validation("'confidence' must be between 0.0 and 1.0"));
    }

    let reason = value
        .get("reason")
        .ok_or_else(|| Error::validation("missing required field: reason"))?
        .as_str()
        .ok_or_else(|| Error::validation("'reason' must be a string"))?;
    let reason = cap_reason(reason);

    let missing_info = value
        .get("missing_info")
        .ok_or_else(|| Error::validation("missing required field: missing_info"))?
        .as_array()
        .ok_or_else(|| Error::validation("'missing_info' must be a list"))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::validation("all items in 'missing_info' must be strings"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SolvabilityReport {
        solvable: if solvable {
            Solvability::Solvable
        } else {
            Solvability::Unsolvable
        },
        confidence,
        reason,
        missing_info,
        success: true,
        truncated: false,
    })
}

fn cap_reason(reason: &str) -> String {
    if reason.chars().count() <= MAX_REASON_LEN {
        return reason.to_string();
    }
    let capped: String = reason.chars().take(MAX_REASON_LEN - 3).collect();
    format!("{}...", capped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubJudge {
        responses: Mutex<Vec<Result<Vec<String>>>>,
        calls: AtomicUsize,
    }

    impl StubJudge {
        fn new(responses: Vec<Result<Vec<String>>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JudgeClient for StubJudge {
        async fn complete(&self, _request: CompletionRequest) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(Error::transport("stub exhausted"))
            } else {
                responses.remove(0)
            }
        }
    }

    fn oracle(judge: Arc<StubJudge>) -> SolvabilityOracle {
        SolvabilityOracle::new(
            judge,
            Arc::new(crate::tokens::CharRatioEstimator::default()),
            SolvabilityConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_statement_short_circuits() {
        let judge = Arc::new(StubJudge::new(Vec::new()));
        let report = oracle(Arc::clone(&judge)).check("   \n ").await;

        assert_eq!(report.solvable, Solvability::Unsolvable);
        assert_eq!(report.confidence, 1.0);
        assert!(report.success);
        assert_eq!(judge.call_count(), 0);
    }

    #[tokio::test]
    async fn test_valid_verdict() {
        let judge = Arc::new(StubJudge::new(vec![Ok(vec![
            r#"{"solvable": true, "confidence": 0.95, "reason": "well-defined", "missing_info": []}"#
                .to_string(),
        ])]));
        let report = oracle(judge).check("What is 2 + 2?").await;

        assert_eq!(report.solvable, Solvability::Solvable);
        assert_eq!(report.confidence, 0.95);
        assert_eq!(report.reason, "well-defined");
        assert!(report.success);
        assert!(!report.truncated);
    }

    #[tokio::test]
    async fn test_malformed_then_valid_retries() {
        let judge = Arc::new(StubJudge::new(vec![
            Ok(vec!["not json".to_string()]),
            Ok(vec![
                r#"{"solvable": false, "confidence": 0.8, "reason": "missing radius", "missing_info": ["radius"]}"#
                    .to_string(),
            ]),
        ]));
        let report = oracle(Arc::clone(&judge)).check("Find the circle area.").await;

        assert_eq!(report.solvable, Solvability::Unsolvable);
        assert_eq!(report.missing_info, vec!["radius".to_string()]);
        assert!(report.success);
        assert_eq!(judge.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_yields_unknown() {
        let judge = Arc::new(StubJudge::new(vec![
            Err(Error::transport("down")),
            Ok(vec![r#"{"solvable": true}"#.to_string()]),
            Ok(vec![r#"{"solvable": true, "confidence": 7.0, "reason": "", "missing_info": []}"#
                .to_string()]),
        ]));
        let report = oracle(Arc::clone(&judge)).check("A question").await;

        assert_eq!(report.solvable, Solvability::Unknown);
        assert_eq!(report.confidence, 0.0);
        assert!(!report.success);
        assert!(report.reason.starts_with("Failed to analyze:"));
        assert_eq!(judge.call_count(), 3);
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        let err = parse_verdict(r#"{"solvable": "yes", "confidence": 0.5, "reason": "", "missing_info": []}"#)
            .unwrap_err();
        assert!(err.to_string().contains("'solvable' must be boolean"));

        let err = parse_verdict(r#"{"solvable": true, "confidence": 0.5, "reason": "", "missing_info": [1]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("missing_info"));
    }

    #[test]
    fn test_reason_is_capped() {
        let long_reason = "x".repeat(500);
        let raw = format!(
            r#"{{"solvable": true, "confidence": 0.5, "reason": "{}", "missing_info": []}}"#,
            long_reason
        );
        let report = parse_verdict(&raw).unwrap();
        assert_eq!(report.reason.chars().count(), MAX_REASON_LEN);
        assert!(report.reason.ends_with("..."));
    }

    #[test]
    fn test_integer_confidence_accepted() {
        let report =
            parse_verdict(r#"{"solvable": true, "confidence": 1, "reason": "r", "missing_info": []}"#)
                .unwrap();
        assert_eq!(report.confidence, 1.0);
    }
}
