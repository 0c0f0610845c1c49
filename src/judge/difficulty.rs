//! Difficulty comparator.
//!
//! Partitions a set of statements into ordered difficulty tiers by asking
//! the judge for a grouping. Presentation order is randomized before the
//! call to blunt the judge's position bias, and the returned indices are
//! mapped back through the inverse permutation. Retry exhaustion degrades
//! to singleton groups in original order.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{thread_rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::llm::{ChatMessage, CompletionRequest, JudgeClient};
use crate::prompts;
use crate::retry::{retry_with, RetryPolicy};
use crate::tokens::{truncate_to_budget, TokenEstimator, RANKING_TRUNCATION_MARKER};

/// Outcome of one difficulty ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyRanking {
    /// Difficulty tiers, easiest to hardest, indexing the input statements.
    /// On success the groups partition `{0..N-1}` exactly.
    pub groups: Vec<Vec<usize>>,
    /// Whether the judge produced a valid grouping. When false, `groups`
    /// holds the singleton fallback in original order.
    pub success: bool,
    /// Whether presentation order was randomized.
    pub shuffled: bool,
    /// How many statements were truncated before judging.
    pub truncated_count: usize,
}

impl DifficultyRanking {
    /// The hardest tier, if any.
    pub fn hardest_group(&self) -> Option<&[usize]> {
        self.groups.last().map(Vec::as_slice)
    }

    /// Whether `index` sits in the hardest tier of a successful ranking.
    /// A failed or degenerate ranking never places anything in the hardest
    /// tier.
    pub fn is_in_hardest(&self, index: usize) -> bool {
        self.success
            && self
                .hardest_group()
                .map_or(false, |group| group.contains(&index))
    }
}

/// Configuration for the difficulty comparator.
#[derive(Debug, Clone)]
pub struct ComparatorConfig {
    /// Retry budget over transport and validation failures.
    pub max_retries: u32,
    /// Per-statement token budget.
    pub token_budget: usize,
    /// Randomize presentation order before judging.
    pub shuffle: bool,
    /// Fixed shuffle seed for reproducible runs.
    pub shuffle_seed: Option<u64>,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            token_budget: 2048,
            shuffle: true,
            shuffle_seed: None,
        }
    }
}

/// Ranks statements into ordered difficulty tiers.
pub struct DifficultyComparator {
    client: Arc<dyn JudgeClient>,
    estimator: Arc<dyn TokenEstimator>,
    config: ComparatorConfig,
}

impl DifficultyComparator {
    pub fn new(
        client: Arc<dyn JudgeClient>,
        estimator: Arc<dyn TokenEstimator>,
        config: ComparatorConfig,
    ) -> Self {
        Self {
            client,
            estimator,
            config,
        }
    }

    /// Rank `statements` from easiest to hardest. Never errors: retry
    /// exhaustion yields N singleton groups in original order with
    /// `success = false`.
    #[instrument(skip(self, statements), fields(count = statements.len()))]
    pub async fn rank(&self, statements: &[String]) -> DifficultyRanking {
        let n = statements.len();
        if n == 0 {
            return DifficultyRanking {
                groups: Vec::new(),
                success: true,
                shuffled: false,
                truncated_count: 0,
            };
        }

        let mut truncated_count = 0;
        let processed: Vec<String> = statements
            .iter()
            .map(|statement| {
                let (text, truncated) = truncate_to_budget(
                    self.estimator.as_ref(),
                    statement,
                    self.config.token_budget,
                    RANKING_TRUNCATION_MARKER,
                );
                if truncated {
                    truncated_count += 1;
                }
                text
            })
            .collect();
        if truncated_count > 0 {
            debug!(
                "{} statement(s) truncated to {} tokens for ranking",
                truncated_count, self.config.token_budget
            );
        }

        if n == 1 {
            return DifficultyRanking {
                groups: vec![vec![0]],
                success: true,
                shuffled: false,
                truncated_count,
            };
        }

        // perm[i] = original index of the statement shown at position i.
        let (presented, perm) = if self.config.shuffle {
            let perm = shuffle_indices(n, self.config.shuffle_seed);
            let presented = perm.iter().map(|&i| processed[i].clone()).collect();
            (presented, perm)
        } else {
            (processed, (0..n).collect())
        };

        let messages = vec![
            ChatMessage::system(prompts::DIFFICULTY_SYSTEM_PROMPT),
            ChatMessage::user(prompts::difficulty_request(&prompts::format_statements(
                &presented,
            ))),
        ];

        let policy = RetryPolicy::new(self.config.max_retries);
        let outcome = retry_with(&policy, "difficulty ranking", |_| {
            let request = CompletionRequest::new()
                .with_messages(messages.clone())
                .with_completions(1)
                .with_json_mode(true);
            let perm = &perm;
            async move {
                let responses = self.client.complete(request).await?;
                let raw = responses
                    .first()
                    .ok_or_else(|| Error::validation("empty response from judge"))?;
                let shuffled_groups = parse_groups(raw, n)?;
                Ok(map_back(&shuffled_groups, perm))
            }
        })
        .await;

        match outcome {
            Ok(groups) => DifficultyRanking {
                groups,
                success: true,
                shuffled: self.config.shuffle,
                truncated_count,
            },
            Err(e) => {
                warn!("no valid ranking obtained, falling back to singleton groups: {}", e);
                DifficultyRanking {
                    groups: (0..n).map(|i| vec![i]).collect(),
                    success: false,
                    shuffled: self.config.shuffle,
                    truncated_count,
                }
            }
        }
    }
}

/// Draw a uniform random permutation of `[0..n)`.
fn shuffle_indices(n: usize, seed: Option<u64>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    match seed {
        Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => indices.shuffle(&mut thread_rng()),
    }
    indices
}

/// Map groups over shuffled positions back to original indices, preserving
/// group order. A bijective relabeling: position `i` in the presented order
/// held the statement originally at `perm[i]`.
fn map_back(shuffled_groups: &[Vec<usize>], perm: &[usize]) -> Vec<Vec<usize>> {
    shuffled_groups
        .iter()
        .map(|group| group.iter().map(|&idx| perm[idx]).collect())
        .collect()
}

/// Parse and validate one structured grouping.
///
/// Requires `{"result": [[..], ..]}` where the inner lists are non-empty and
/// their union is exactly `{0..n-1}` with no duplicates.
fn parse_groups(raw: &str, n: usize) -> Result<Vec<Vec<usize>>> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| Error::validation(format!("invalid JSON: {}", e)))?;

    let groups_value = value
        .get("result")
        .ok_or_else(|| Error::validation("response missing 'result' field"))?
        .as_array()
        .ok_or_else(|| Error::validation("'result' field must be a list"))?;

    if groups_value.is_empty() {
        return Err(Error::validation("groups cannot be empty"));
    }

    let mut groups = Vec::with_capacity(groups_value.len());
    for group_value in groups_value {
        let group_items = group_value
            .as_array()
            .ok_or_else(|| Error::validation("each group must be a list"))?;
        if group_items.is_empty() {
            return Err(Error::validation("groups cannot be empty"));
        }
        let group = group_items
            .iter()
            .map(|item| {
                item.as_u64()
                    .map(|idx| idx as usize)
                    .ok_or_else(|| Error::validation("group indices must be non-negative integers"))
            })
            .collect::<Result<Vec<usize>>>()?;
        groups.push(group);
    }

    let all_indices: Vec<usize> = groups.iter().flatten().copied().collect();
    if all_indices.len() != n {
        return Err(Error::validation(format!(
            "expected {} total indices, got {}",
            n,
            all_indices.len()
        )));
    }
    let mut seen = vec![false; n];
    for &idx in &all_indices {
        if idx >= n || seen[idx] {
            return Err(Error::validation("invalid or duplicate indices in result"));
        }
        seen[idx] = true;
    }

    Ok(groups)
}
