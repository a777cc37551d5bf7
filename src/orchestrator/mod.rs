//! Orchestrator: batch processing over a discovered corpus
//!
//! Ties together document discovery, extraction, the canonicalization hook
//! chain, and graph upsert into a single-threaded cooperative loop over
//! documents.

mod hooks;
mod interactive;
mod run;
mod stats;

pub use hooks::{
    default_hook_registry, AfterBatchHook, BasicNormalizationHook, BeforeStoreHook,
    DictionaryNormalizationHook, GlobalFuzzyDedupHook, HookRegistry,
};
pub use interactive::{
    confirm_merge, review_entities, InteractiveIo, MergeCandidate, MergeDecision, ReviewCommand,
    TerminalIo,
};
pub use run::{cancellation_flag, run_pipeline, watch_ctrl_c, OrchestratorError};
pub use stats::{RunOutcome, StopReason, Statistics};
