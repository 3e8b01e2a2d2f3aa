// 📚 Ledger records - input rows, output rows and the classifier's view of them
//
// LedgerEntry      = row of ledger_table (written by the external sync)
// ClassifiedLedger = row of ledger_table_gl_code (written by the GL code jobs)
// SourceLedger     = raw ledger as delivered by the sync, before it has an id

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::account_group::AccountGroupRange;

// ============================================================================
// CLASSIFIER VIEW
// ============================================================================

/// Classification cache key. Ledgers sharing the same group pair are
/// classified identically whatever their name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub primary_group: String,
    pub parent_group: String,
}

impl CacheKey {
    pub fn new(primary_group: &str, parent_group: &str) -> Self {
        CacheKey {
            primary_group: primary_group.to_string(),
            parent_group: parent_group.to_string(),
        }
    }
}

/// Descriptive fields sent to the classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDescriptor {
    pub primary_group: String,
    pub parent_group: String,
    pub ledger_name: String,
}

impl LedgerDescriptor {
    pub fn new(primary_group: &str, parent_group: &str, ledger_name: &str) -> Self {
        LedgerDescriptor {
            primary_group: primary_group.to_string(),
            parent_group: parent_group.to_string(),
            ledger_name: ledger_name.to_string(),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.primary_group, &self.parent_group)
    }

    /// One line of the classification request
    pub fn describe(&self) -> String {
        format!(
            "Entry: Primary Group: {}, Parent Group: {}, Name: {}",
            self.primary_group, self.parent_group, self.ledger_name
        )
    }
}

// ============================================================================
// LEDGER ENTRY (input)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ledger_id: i64,
    pub ledger_name: String,
    pub parent_group: Option<String>,
    pub primary_group: Option<String>,
    pub group_name: Option<String>,
    pub group_parent: Option<String>,
    pub is_revenue: Option<bool>,
    pub is_deemed_positive: Option<bool>,
    pub affects_gross_profit: Option<bool>,

    /// Set by the external sync when any field changed since the last run
    pub isupdate: bool,
}

impl LedgerEntry {
    pub fn descriptor(&self) -> LedgerDescriptor {
        LedgerDescriptor::new(
            self.primary_group.as_deref().unwrap_or_default(),
            self.parent_group.as_deref().unwrap_or_default(),
            &self.ledger_name,
        )
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(
            self.primary_group.as_deref().unwrap_or_default(),
            self.parent_group.as_deref().unwrap_or_default(),
        )
    }
}

// ============================================================================
// CLASSIFIED LEDGER (output)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedLedger {
    /// Zero-padded 6-digit code
    pub gl_code: String,
    pub ledger_id: i64,
    pub ledger_name: String,
    pub account_group_code: String,
    pub category_name: String,
    pub account_group_name: String,
    pub primary_group: Option<String>,
    pub parent_group: Option<String>,
    pub group_parent: Option<String>,
    pub group_name: Option<String>,
    pub is_revenue: Option<bool>,
    pub is_deemed_positive: Option<bool>,
    pub affects_gross_profit: Option<bool>,
}

impl ClassifiedLedger {
    /// Output row for `entry` filed under `range` with a freshly issued code
    pub fn assign(entry: &LedgerEntry, range: &AccountGroupRange, gl_code: String) -> Self {
        ClassifiedLedger {
            gl_code,
            ledger_id: entry.ledger_id,
            ledger_name: entry.ledger_name.clone(),
            account_group_code: range.code.clone(),
            category_name: range.category_name.clone(),
            account_group_name: range.group_name.clone(),
            primary_group: entry.primary_group.clone(),
            parent_group: entry.parent_group.clone(),
            group_parent: entry.group_parent.clone(),
            group_name: entry.group_name.clone(),
            is_revenue: entry.is_revenue,
            is_deemed_positive: entry.is_deemed_positive,
            affects_gross_profit: entry.affects_gross_profit,
        }
    }

    pub fn gl_code_value(&self) -> Option<u32> {
        self.gl_code.parse().ok()
    }
}

// ============================================================================
// SOURCE LEDGER (external sync input)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLedger {
    pub ledger_name: String,
    pub parent_group: Option<String>,
    pub primary_group: Option<String>,
    pub group_name: Option<String>,
    pub group_parent: Option<String>,
    pub is_revenue: Option<bool>,
    pub is_deemed_positive: Option<bool>,
    pub affects_gross_profit: Option<bool>,
}

impl SourceLedger {
    /// SHA-256 over every tracked field; a changed fingerprint flags the
    /// ledger for reconciliation.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}|{:?}",
            self.ledger_name,
            self.parent_group,
            self.primary_group,
            self.group_name,
            self.group_parent,
            self.is_revenue,
            self.is_deemed_positive,
            self.affects_gross_profit
        ));
        format!("{:x}", hasher.finalize())
    }
}
