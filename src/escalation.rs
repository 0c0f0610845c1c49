//! Escalation state machine.
//!
//! Drives up to `max_round` generate → classify → compare → decide rounds
//! for one seed problem. Each round asks the judge for a harder variant,
//! checks that the variant is still solvable, ranks it against every prior
//! variant (seed included), and keeps the most advanced variant that was
//! both solvable and hardest. Stop conditions are modeled outcomes, not
//! errors: an unsolvable variant, a difficulty regression, or generation
//! retry exhaustion each end the run with a structured failure record.
//!
//! The conversation transcript exists in two parallel views. The raw view
//! (assistant replies verbatim, `<think>` segments included) is kept for
//! audit and per-round records; the distilled view strips reasoning from
//! assistant turns and is what gets replayed to the judge. The raw view is
//! never mutated.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

use crate::error::{Error, Result};
use crate::judge::{
    ComparatorConfig, DifficultyComparator, DifficultyRanking, SolvabilityConfig,
    SolvabilityOracle, SolvabilityReport,
};
use crate::llm::{ChatMessage, ChatRole, CompletionRequest, JudgeClient};
use crate::processor::RecordTransform;
use crate::prompts;
use crate::retry::{retry_with, RetryPolicy};
use crate::tokens::TokenEstimator;

/// Configuration for one escalation run.
#[derive(Debug, Clone)]
pub struct EscalationConfig {
    /// Maximum number of upgrade rounds.
    pub max_round: usize,
    /// Retry budget for variant generation.
    pub max_generation_retries: u32,
    /// Fixed delay between generation retries.
    pub generation_retry_delay: Duration,
    /// Solvability oracle settings.
    pub solvability: SolvabilityConfig,
    /// Difficulty comparator settings.
    pub comparator: ComparatorConfig,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_round: 8,
            max_generation_retries: 5,
            generation_retry_delay: Duration::from_secs(1),
            solvability: SolvabilityConfig::default(),
            comparator: ComparatorConfig::default(),
        }
    }
}

impl EscalationConfig {
    pub fn with_max_round(mut self, max_round: usize) -> Self {
        self.max_round = max_round;
        self
    }

    pub fn with_generation_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.max_generation_retries = retries;
        self.generation_retry_delay = delay;
        self
    }

    pub fn with_solvability(mut self, config: SolvabilityConfig) -> Self {
        self.solvability = config;
        self
    }

    pub fn with_comparator(mut self, config: ComparatorConfig) -> Self {
        self.comparator = config;
        self
    }
}

/// Snapshot of one completed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round index.
    pub round: usize,
    /// Reasoning segment stripped from the raw reply.
    pub reasoning: String,
    /// The produced variant.
    pub statement: String,
    /// The judge's reply verbatim.
    pub raw_output: String,
    /// Cumulative token cost up to and including this round.
    pub token_cost: u64,
    /// Full-history difficulty ranking for this round.
    pub ranking: DifficultyRanking,
    /// Solvability verdict for the produced variant.
    pub solvability: SolvabilityReport,
    /// Whether the variant landed in the hardest tier.
    pub in_hardest_group: bool,
    /// Number of variants compared, seed included.
    pub variant_count: usize,
}

/// The most advanced variant that was solvable and hardest when produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestVariant {
    pub round: usize,
    pub statement: String,
    pub reasoning: String,
    pub token_cost: u64,
    pub ranking: DifficultyRanking,
    pub solvability: SolvabilityReport,
}

/// Why an escalation run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Unsolvable,
    DifficultyDecreased,
    GenerationFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsolvable => write!(f, "unsolvable"),
            Self::DifficultyDecreased => write!(f, "difficulty_decreased"),
            Self::GenerationFailed => write!(f, "generation_failed"),
        }
    }
}

/// Structured terminal failure entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// 1-based round at which the run stopped.
    pub round: usize,
    pub reason: FailureReason,
    /// Reason-specific payload.
    pub detail: Value,
}

/// Outcome of one full escalation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationResult {
    /// All completed rounds in order.
    pub rounds: Vec<RoundRecord>,
    /// Best-known solvable-and-hardest snapshot, if any round qualified.
    pub best: Option<BestVariant>,
    /// Terminal failure, absent when all rounds ran clean.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

/// Split a raw judge reply into (reasoning, statement).
///
/// Reasoning is the segment after the last `<think>` up to the following
/// `</think>`; the statement is everything after the last `</think>`.
/// Missing or unpaired markers mean no reasoning and the whole reply is the
/// statement.
pub(crate) fn split_reasoning(raw: &str) -> (String, String) {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    if !raw.contains(OPEN) || !raw.contains(CLOSE) {
        return (String::new(), raw.trim().to_string());
    }

    let after_open = &raw[raw.rfind(OPEN).map_or(0, |pos| pos + OPEN.len())..];
    let reasoning = after_open
        .split(CLOSE)
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    let statement = raw[raw.rfind(CLOSE).map_or(0, |pos| pos + CLOSE.len())..]
        .trim()
        .to_string();
    (reasoning, statement)
}

/// Distilled transcript view: assistant turns with reasoning stripped.
fn distill(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|msg| match msg.role {
            ChatRole::Assistant => {
                let (_, statement) = split_reasoning(&msg.content);
                ChatMessage::assistant(statement)
            }
            _ => msg.clone(),
        })
        .collect()
}

/// Strip a leading enumeration prefix ("12. ") from a produced statement.
fn strip_leading_number(text: &str) -> String {
    static NUMBER_PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = NUMBER_PREFIX.get_or_init(|| Regex::new(r"^\d+\.\s*").expect("valid literal regex"));
    re.replace(text, "").into_owned()
}

/// Runs the escalation loop for seed problems.
pub struct EscalationEngine {
    client: Arc<dyn JudgeClient>,
    estimator: Arc<dyn TokenEstimator>,
    oracle: SolvabilityOracle,
    comparator: DifficultyComparator,
    config: EscalationConfig,
}

impl EscalationEngine {
    pub fn new(
        client: Arc<dyn JudgeClient>,
        estimator: Arc<dyn TokenEstimator>,
        config: EscalationConfig,
    ) -> Self {
        let oracle = SolvabilityOracle::new(
            Arc::clone(&client),
            Arc::clone(&estimator),
            config.solvability.clone(),
        );
        let comparator = DifficultyComparator::new(
            Arc::clone(&client),
            Arc::clone(&estimator),
            config.comparator.clone(),
        );
        Self {
            client,
            estimator,
            oracle,
            comparator,
            config,
        }
    }

    fn message_tokens(&self, messages: &[ChatMessage]) -> u64 {
        messages
            .iter()
            .map(|msg| self.estimator.count(&msg.content) as u64)
            .sum()
    }

    /// Run one full escalation over `seed_statement`.
    ///
    /// Every round runs both the solvability check and the full-history
    /// difficulty comparison, in that order, unconditionally. A failed or
    /// degenerate ranking counts as "not in hardest group".
    #[instrument(skip(self, seed_statement))]
    pub async fn escalate(&self, seed_statement: &str) -> EscalationResult {
        let mut rounds: Vec<RoundRecord> = Vec::new();
        let mut best: Option<BestVariant> = None;
        let mut failure: Option<FailureRecord> = None;

        // Index 0 is the seed; index k is round k's variant.
        let mut variants: Vec<String> = vec![seed_statement.to_string()];
        let mut transcript: Vec<ChatMessage> =
            vec![ChatMessage::user(prompts::upgrade_request(seed_statement))];
        let mut token_cost = self.message_tokens(&transcript);

        let nudge = ChatMessage::user(prompts::NUDGE);
        let nudge_tokens = self.estimator.count(prompts::NUDGE) as u64;

        for round_idx in 0..self.config.max_round {
            let round = round_idx + 1;

            let policy = RetryPolicy::new(self.config.max_generation_retries)
                .with_delay(self.config.generation_retry_delay);
            let generation = retry_with(&policy, "variant generation", |_| {
                let request = CompletionRequest::new()
                    .with_messages(distill(&transcript))
                    .with_completions(1);
                async move {
                    let responses = self.client.complete(request).await?;
                    responses
                        .into_iter()
                        .next()
                        .ok_or_else(|| Error::transport("empty response from judge"))
                }
            })
            .await;

            let raw = match generation {
                Ok(raw) => raw,
                Err(e) => {
                    error!(
                        "failed to generate variant at round {} after {} retries: {}",
                        round, self.config.max_generation_retries, e
                    );
                    failure = Some(FailureRecord {
                        round,
                        reason: FailureReason::GenerationFailed,
                        detail: json!({
                            "message": format!(
                                "Failed to generate variant after {} retries",
                                self.config.max_generation_retries
                            ),
                            "last_error": e.to_string(),
                            "retry_count": self.config.max_generation_retries,
                        }),
                    });
                    break;
                }
            };

            let (reasoning, statement) = split_reasoning(&raw);
            let statement = strip_leading_number(&statement);

            transcript.push(ChatMessage::assistant(raw.clone()));
            token_cost += self.estimator.count(&raw) as u64;
            variants.push(statement.clone());
            let current_idx = variants.len() - 1;

            let solvability = self.oracle.check(&statement).await;
            let is_solvable = solvability.solvable.is_solvable();

            let ranking = self.comparator.rank(&variants).await;
            let in_hardest_group = ranking.is_in_hardest(current_idx);

            if is_solvable && in_hardest_group {
                best = Some(BestVariant {
                    round,
                    statement: statement.clone(),
                    reasoning: reasoning.clone(),
                    token_cost,
                    ranking: ranking.clone(),
                    solvability: solvability.clone(),
                });
            }

            rounds.push(RoundRecord {
                round,
                reasoning,
                statement,
                raw_output: raw,
                token_cost,
                ranking: ranking.clone(),
                solvability: solvability.clone(),
                in_hardest_group,
                variant_count: variants.len(),
            });

            if !is_solvable {
                info!("stopping at round {}: variant is not solvable", round);
                failure = Some(FailureRecord {
                    round,
                    reason: FailureReason::Unsolvable,
                    detail: json!({
                        "solvable": solvability.solvable,
                        "confidence": solvability.confidence,
                        "reason": solvability.reason,
                        "missing_info": solvability.missing_info,
                    }),
                });
                break;
            }

            if !in_hardest_group {
                info!("stopping at round {}: variant not in hardest group", round);
                let hardest: Vec<usize> = ranking
                    .hardest_group()
                    .map(|group| group.to_vec())
                    .unwrap_or_default();
                failure = Some(FailureRecord {
                    round,
                    reason: FailureReason::DifficultyDecreased,
                    detail: json!({
                        "variant_index": current_idx,
                        "hardest_group": hardest,
                        "groups": ranking.groups,
                        "ranking_success": ranking.success,
                    }),
                });
                break;
            }

            if round_idx + 1 < self.config.max_round {
                transcript.push(nudge.clone());
                token_cost += nudge_tokens;
            }
        }

        EscalationResult {
            rounds,
            best,
            failure,
        }
    }
}

/// Adapts the engine to the record processor: reads the seed statement from
/// a configurable field and stores the serialized [`EscalationResult`].
pub struct EscalationTransform {
    engine: Arc<EscalationEngine>,
    question_key: String,
}

impl EscalationTransform {
    pub fn new(engine: Arc<EscalationEngine>) -> Self {
        Self {
            engine,
            question_key: "question".to_string(),
        }
    }

    pub fn with_question_key(mut self, key: impl Into<String>) -> Self {
        self.question_key = key.into();
        self
    }
}

#[async_trait]
impl RecordTransform for EscalationTransform {
    async fn transform(&self, record: &Value) -> Result<Value> {
        let seed = record
            .get(self.question_key.as_str())
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::validation(format!(
                    "record missing string field '{}'",
                    self.question_key
                ))
            })?;
        let result = self.engine.escalate(seed).await;
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::CharRatioEstimator;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_split_reasoning_without_markers() {
        let (reasoning, statement) = split_reasoning("  Just a problem.  ");
        assert_eq!(reasoning, "");
        assert_eq!(statement, "Just a problem.");
    }

    #[test]
    fn test_split_reasoning_with_markers() {
        let (reasoning, statement) =
            split_reasoning("<think>step one\nstep two</think>\nThe problem.");
        assert_eq!(reasoning, "step one\nstep two");
        assert_eq!(statement, "The problem.");
    }

    #[test]
    fn test_split_reasoning_unpaired_marker() {
        let (reasoning, statement) = split_reasoning("<think>dangling reasoning");
        assert_eq!(reasoning, "");
        assert_eq!(statement, "<think>dangling reasoning");
    }

    #[test]
    fn test_strip_leading_number() {
        assert_eq!(strip_leading_number("12. Find the sum."), "Find the sum.");
        assert_eq!(strip_leading_number("No prefix here."), "No prefix here.");
        assert_eq!(strip_leading_number("3.5 is not a prefix"), "5 is not a prefix");
    }

    #[test]
    fn test_distill_strips_assistant_reasoning_only() {
        let messages = vec![
            ChatMessage::user("make it harder"),
            ChatMessage::assistant("<think>hm</think>Harder problem"),
        ];
        let distilled = distill(&messages);
        assert_eq!(distilled[0].content, "make it harder");
        assert_eq!(distilled[1].content, "Harder problem");
        // The raw view is untouched.
        assert!(messages[1].content.contains("<think>"));
    }

    /// Scripted judge: dispatches on the request's system prompt.
    ///
    /// Generation requests carry no system turn; the oracles are recognized
    /// by their system-prompt wording.
    struct ScriptedJudge {
        generation_calls: AtomicUsize,
        /// Rounds >= this produce a variant judged unsolvable.
        unsolvable_from_round: Option<usize>,
        /// Rounds >= this produce a variant ranked easiest.
        demoted_from_round: Option<usize>,
        fail_generation: bool,
        fail_ranking: bool,
    }

    impl ScriptedJudge {
        fn cooperative() -> Self {
            Self {
                generation_calls: AtomicUsize::new(0),
                unsolvable_from_round: None,
                demoted_from_round: None,
                fail_generation: false,
                fail_ranking: false,
            }
        }
    }

    #[async_trait]
    impl JudgeClient for ScriptedJudge {
        async fn complete(&self, request: CompletionRequest) -> Result<Vec<String>> {
            let system = request
                .messages
                .iter()
                .find(|msg| msg.role == ChatRole::System)
                .map(|msg| msg.content.as_str())
                .unwrap_or("");

            if system.contains("assessing question difficulty") {
                if self.fail_ranking {
                    return Ok(vec!["nonsense".to_string()]);
                }
                let user = &request.messages.last().unwrap().content;
                let n = user.matches("[Question ").count();
                let round = n - 1;
                let groups: Vec<Vec<usize>> =
                    if self.demoted_from_round.map_or(false, |from| round >= from) {
                        // Current variant easiest, everything else above it.
                        std::iter::once(vec![n - 1])
                            .chain((0..n - 1).map(|i| vec![i]))
                            .collect()
                    } else {
                        (0..n).map(|i| vec![i]).collect()
                    };
                return Ok(vec![json!({ "result": groups }).to_string()]);
            }

            if system.contains("analyzing mathematical and logical problems") {
                let round = self.generation_calls.load(Ordering::SeqCst);
                let solvable = self
                    .unsolvable_from_round
                    .map_or(true, |from| round < from);
                return Ok(vec![json!({
                    "solvable": solvable,
                    "confidence": 0.9,
                    "reason": "scripted",
                    "missing_info": [],
                })
                .to_string()]);
            }

            if self.fail_generation {
                return Err(Error::transport("judge down"));
            }
            let call = self.generation_calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(vec![format!(
                "<think>round {} plan</think>Upgraded problem v{}",
                call, call
            )])
        }
    }

    fn engine(judge: ScriptedJudge, max_round: usize) -> EscalationEngine {
        let config = EscalationConfig::default()
            .with_max_round(max_round)
            .with_generation_retries(2, Duration::ZERO)
            .with_solvability(SolvabilityConfig {
                max_retries: 1,
                ..SolvabilityConfig::default()
            })
            .with_comparator(ComparatorConfig {
                max_retries: 1,
                // The scripted judge addresses presentation positions, so
                // ranking runs unshuffled here; inversion is covered by the
                // comparator's own tests.
                shuffle: false,
                ..ComparatorConfig::default()
            });
        EscalationEngine::new(
            Arc::new(judge),
            Arc::new(CharRatioEstimator::default()),
            config,
        )
    }

    #[tokio::test]
    async fn test_cooperative_judge_runs_all_rounds() {
        let result = engine(ScriptedJudge::cooperative(), 4)
            .escalate("What is 2 + 2?")
            .await;

        assert_eq!(result.rounds.len(), 4);
        assert!(result.failure.is_none());

        let best = result.best.expect("every round was solvable and hardest");
        assert_eq!(best.round, 4);
        assert_eq!(best.statement, "Upgraded problem v4");

        // Cumulative token cost never regresses.
        let costs: Vec<u64> = result.rounds.iter().map(|r| r.token_cost).collect();
        assert!(costs.windows(2).all(|pair| pair[0] <= pair[1]));

        // Each round compares the full history, seed included.
        let counts: Vec<usize> = result.rounds.iter().map(|r| r.variant_count).collect();
        assert_eq!(counts, vec![2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_unsolvable_on_round_two_stops() {
        let judge = ScriptedJudge {
            unsolvable_from_round: Some(2),
            ..ScriptedJudge::cooperative()
        };
        let result = engine(judge, 8).escalate("Seed problem").await;

        assert_eq!(result.rounds.len(), 2);
        let failure = result.failure.expect("run must fail");
        assert_eq!(failure.round, 2);
        assert_eq!(failure.reason, FailureReason::Unsolvable);

        // Round 1 was solvable and hardest, so it stays the best snapshot.
        let best = result.best.expect("round 1 qualified");
        assert_eq!(best.round, 1);
    }

    #[tokio::test]
    async fn test_demotion_stops_with_difficulty_decreased() {
        let judge = ScriptedJudge {
            demoted_from_round: Some(3),
            ..ScriptedJudge::cooperative()
        };
        let result = engine(judge, 8).escalate("Seed problem").await;

        assert_eq!(result.rounds.len(), 3);
        assert!(!result.rounds[2].in_hardest_group);
        let failure = result.failure.expect("run must fail");
        assert_eq!(failure.reason, FailureReason::DifficultyDecreased);
        assert_eq!(failure.round, 3);
        assert_eq!(result.best.expect("round 2 qualified").round, 2);
    }

    #[tokio::test]
    async fn test_generation_failure_records_no_round() {
        let judge = ScriptedJudge {
            fail_generation: true,
            ..ScriptedJudge::cooperative()
        };
        let result = engine(judge, 8).escalate("Seed problem").await;

        assert!(result.rounds.is_empty());
        assert!(result.best.is_none());
        let failure = result.failure.expect("run must fail");
        assert_eq!(failure.round, 1);
        assert_eq!(failure.reason, FailureReason::GenerationFailed);
        assert_eq!(failure.detail["retry_count"], json!(2));
    }

    #[tokio::test]
    async fn test_ranking_failure_folds_into_difficulty_decreased() {
        let judge = ScriptedJudge {
            fail_ranking: true,
            ..ScriptedJudge::cooperative()
        };
        let result = engine(judge, 8).escalate("Seed problem").await;

        assert_eq!(result.rounds.len(), 1);
        assert!(!result.rounds[0].in_hardest_group);
        assert!(!result.rounds[0].ranking.success);
        let failure = result.failure.expect("run must fail");
        assert_eq!(failure.reason, FailureReason::DifficultyDecreased);
        assert!(result.best.is_none());
    }

    #[test]
    fn test_failure_reason_wire_format() {
        assert_eq!(
            serde_json::to_string(&FailureReason::DifficultyDecreased).unwrap(),
            "\"difficulty_decreased\""
        );
        assert_eq!(FailureReason::Unsolvable.to_string(), "unsolvable");
    }

    #[test]
    fn test_result_omits_absent_failure() {
        let result = EscalationResult {
            rounds: Vec::new(),
            best: None,
            failure: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("failure"));
    }
}
