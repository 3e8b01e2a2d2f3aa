// 🧾 Code Issue - append-only record of every GL code handed out
//
// Output rows get overwritten on reclassification; the history keeps the
// old code so it is never issued again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueReason {
    /// First assignment by the batch job
    Initial,

    /// Flagged ledger that had no output row yet
    New,

    /// Flagged ledger whose classification or tracked fields changed
    Reclassified,
}

impl IssueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueReason::Initial => "initial",
            IssueReason::New => "new",
            IssueReason::Reclassified => "reclassified",
        }
    }

    pub fn parse(value: &str) -> Option<IssueReason> {
        match value {
            "initial" => Some(IssueReason::Initial),
            "new" => Some(IssueReason::New),
            "reclassified" => Some(IssueReason::Reclassified),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeIssue {
    pub gl_code: String,
    pub ledger_id: i64,
    pub group_code: String,
    pub reason: IssueReason,
    /// Job run that issued the code
    pub run_id: String,
    pub issued_at: DateTime<Utc>,
}

impl CodeIssue {
    pub fn new(gl_code: &str, ledger_id: i64, group_code: &str, reason: IssueReason, run_id: &str) -> Self {
        CodeIssue {
            gl_code: gl_code.to_string(),
            ledger_id,
            group_code: group_code.to_string(),
            reason,
            run_id: run_id.to_string(),
            issued_at: Utc::now(),
        }
    }
}
