// Error types for the GL code jobs
//
// GlCodeError covers everything that can leave the library. ClassifyError is
// recovered inside the classifier (fallback rules) and never reaches a caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GlCodeError>;

#[derive(Debug, Error)]
pub enum GlCodeError {
    #[error("GL code range exhausted for account group {code} (last code {range_end:06})")]
    RangeExhausted { code: String, range_end: u32 },

    #[error("unknown account group code: {0}")]
    UnknownGroup(String),

    #[error("invalid range table: {0}")]
    InvalidRangeTable(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GlCodeError {
    /// Errors that only affect the entry being processed. The job logs them,
    /// skips the entry and carries on with the rest of the unit of work.
    pub fn is_entry_level(&self) -> bool {
        matches!(
            self,
            GlCodeError::RangeExhausted { .. } | GlCodeError::UnknownGroup(_)
        )
    }
}

/// Failures of the hosted classification call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ClassifyError {
    #[error("classification request failed: {0}")]
    Transport(String),

    #[error("malformed classification response: {0}")]
    MalformedResponse(String),

    #[error("no classification backend configured")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_level_errors() {
        let exhausted = GlCodeError::RangeExhausted {
            code: "CASH".to_string(),
            range_end: 584999,
        };
        assert!(exhausted.is_entry_level());
        assert!(GlCodeError::UnknownGroup("XXXX".to_string()).is_entry_level());
        assert!(!GlCodeError::Config("bad".to_string()).is_entry_level());
        assert!(!GlCodeError::Storage(rusqlite::Error::InvalidQuery).is_entry_level());
    }

    #[test]
    fn test_range_exhausted_message() {
        let err = GlCodeError::RangeExhausted {
            code: "DEFT".to_string(),
            range_end: 897999,
        };
        assert_eq!(
            err.to_string(),
            "GL code range exhausted for account group DEFT (last code 897999)"
        );
    }
}
