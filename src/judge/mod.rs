//! Decision oracles driving the escalation loop.
//!
//! Two independent judgments gate every round: is the new variant still
//! solvable, and is it strictly harder than everything produced before it.
//! Both oracles validate the judge's structured output, retry transient and
//! malformed responses alike, and degrade to a typed fallback instead of
//! erroring when the budget runs out.

mod difficulty;
mod solvability;

pub use difficulty::{ComparatorConfig, DifficultyComparator, DifficultyRanking};
pub use solvability::{Solvability, SolvabilityConfig, SolvabilityOracle, SolvabilityReport};
