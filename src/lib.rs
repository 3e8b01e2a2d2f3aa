// Ledger GL Code System - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod error;
pub mod config;
pub mod entities;
pub mod ranges;         // Range Table - 38 account groups, 6-digit blocks
pub mod rules;          // Fallback keyword classification
pub mod classifier;     // Cache + hosted classifier + fallback
pub mod openai;         // Hosted classification backend
pub mod allocator;      // Per-group GL code counters
pub mod store;          // LedgerStore trait + SQLite implementation
pub mod import;         // Ledger CSV import (sync side)
pub mod assignment;     // Initial assignment job
pub mod reconciliation; // Updated-ledger job

// Re-export commonly used types
pub use error::{ClassifyError, GlCodeError, Result};
pub use config::{JobConfig, OpenAiConfig};
pub use entities::{
    AccountGroupRange, CacheKey, ClassifiedLedger, CodeIssue, IssueReason,
    LedgerDescriptor, LedgerEntry, SourceLedger,
};
pub use ranges::{builtin_ranges, RangeTable};
pub use rules::{FallbackRule, FallbackRules};
pub use classifier::{
    classification_instructions, ClassificationBackend, LedgerClassifier, OfflineBackend,
};
pub use openai::OpenAiBackend;
pub use allocator::GlCodeAllocator;
pub use store::{LedgerStore, SqliteStore, UpsertOutcome};
pub use import::{import_ledgers, load_ledger_csv, ImportSummary};
pub use assignment::{AssignmentReport, GlCodeJob, JobOptions, RunReport};
pub use reconciliation::{changed_fields, ReconcileState, ReconciliationReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend for a configuration: the hosted classifier when an API key is
/// set, fallback rules only otherwise.
pub fn backend_for(config: &JobConfig) -> Result<Box<dyn ClassificationBackend + Send>> {
    match &config.openai {
        Some(openai) => Ok(Box::new(OpenAiBackend::new(openai.clone())?)),
        None => Ok(Box::new(OfflineBackend)),
    }
}
