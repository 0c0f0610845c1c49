//! # escalate-core
//!
//! A difficulty escalation engine: repeatedly asks a judge model to upgrade
//! a problem statement, keeps only upgrades that stay solvable and are
//! judged strictly harder than every prior variant, and drives that loop
//! across a JSONL dataset with a resumable concurrent processor.
//!
//! ## Core Components
//!
//! - **Llm**: judge client trait, OpenAI-compatible implementation, and the
//!   round-robin endpoint pool
//! - **Judge**: the two decision oracles (solvability, difficulty ranking
//!   with order-bias mitigation)
//! - **Escalation**: the per-seed round loop and its records
//! - **Processor**: crash-safe, idempotent dataset processing
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use escalate_core::{
//!     ClientConfig, EndpointPool, EscalationConfig, EscalationEngine,
//!     EscalationTransform, OpenAiCompatClient, ProcessorConfig,
//!     RecordProcessor, CharRatioEstimator,
//! };
//!
//! let pool = EndpointPool::new(vec!["http://127.0.0.1:22020/v1".into()])?;
//! let client = Arc::new(OpenAiCompatClient::new(
//!     ClientConfig::new("api-key", "judge-8b"),
//!     pool,
//! )?);
//! let engine = Arc::new(EscalationEngine::new(
//!     client,
//!     Arc::new(CharRatioEstimator::default()),
//!     EscalationConfig::default(),
//! ));
//!
//! let processor = RecordProcessor::new(
//!     EscalationTransform::new(engine),
//!     ProcessorConfig::new("escalation").with_max_workers(2),
//! );
//! let stats = processor
//!     .process_file("seeds.jsonl".as_ref(), "out/seeds.jsonl".as_ref())
//!     .await?;
//! println!("written: {}", stats.written);
//! ```

pub mod error;
pub mod escalation;
pub mod judge;
pub mod llm;
pub mod processor;
mod prompts;
pub mod retry;
pub mod tokens;

// Re-exports for convenience
pub use error::{Error, Result};
pub use escalation::{
    BestVariant, EscalationConfig, EscalationEngine, EscalationResult, EscalationTransform,
    FailureReason, FailureRecord, RoundRecord,
};
pub use judge::{
    ComparatorConfig, DifficultyComparator, DifficultyRanking, Solvability, SolvabilityConfig,
    SolvabilityOracle, SolvabilityReport,
};
pub use llm::{
    ChatMessage, ChatRole, ClientConfig, CompletionRequest, EndpointPool, JudgeClient,
    OpenAiCompatClient, ServerSpec,
};
pub use processor::{
    read_jsonl, sort_by_id, ProcessStats, ProcessorConfig, RecordProcessor, RecordTransform,
};
pub use retry::{retry_with, RetryPolicy};
pub use tokens::{
    truncate_to_budget, CharRatioEstimator, TokenEstimator, RANKING_TRUNCATION_MARKER,
    SOLVABILITY_TRUNCATION_MARKER,
};
