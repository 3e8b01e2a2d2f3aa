// Entity Models
//
// Typed records for everything the GL code jobs read and write:
// - account groups and their 6-digit code blocks
// - ledgers as delivered by the sync and as classified by the jobs
// - the issued-code history

pub mod account_group;
pub mod issue;
pub mod ledger;

pub use account_group::AccountGroupRange;
pub use issue::{CodeIssue, IssueReason};
pub use ledger::{CacheKey, ClassifiedLedger, LedgerDescriptor, LedgerEntry, SourceLedger};
