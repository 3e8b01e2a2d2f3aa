// 📒 Account Group Range - one of the fixed account groups and its GL code block
//
// Reference data stores 4-digit bounds (e.g. REVO = 6000..6799).
// Posting ledgers use 6-digit codes, so the block is widened with a
// two-digit suffix: 6000 -> 600001, 6799 -> 679999.

use serde::{Deserialize, Serialize};

use crate::error::{GlCodeError, Result};

/// Largest 4-digit bound the reference data may hold
pub const MAX_BASE: u32 = 9999;

// ============================================================================
// ACCOUNT GROUP RANGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountGroupRange {
    /// Short group code (e.g. "SHCP", "CASH")
    pub code: String,

    /// Account group label copied onto output rows
    pub group_name: String,

    /// Parent category label copied onto output rows
    pub category_name: String,

    /// First usable 6-digit code (inclusive)
    pub range_start: u32,

    /// Last usable 6-digit code (inclusive)
    pub range_end: u32,

    /// Row id in the reference store, if loaded from one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
}

impl AccountGroupRange {
    /// Build a range from trusted 4-digit bounds. Out-of-range bounds
    /// saturate, so `RangeTable::from_ranges` rejects them.
    pub fn from_base(
        code: &str,
        group_name: &str,
        category_name: &str,
        base_start: u32,
        base_end: u32,
    ) -> Self {
        AccountGroupRange {
            code: code.to_string(),
            group_name: group_name.to_string(),
            category_name: category_name.to_string(),
            range_start: base_start.saturating_mul(100).saturating_add(1),
            range_end: base_end.saturating_mul(100).saturating_add(99),
            group_id: None,
        }
    }

    /// Build a range from bounds read out of the reference tables
    pub fn try_from_base(
        code: &str,
        group_name: &str,
        category_name: &str,
        base_start: u32,
        base_end: u32,
    ) -> Result<Self> {
        for bound in [base_start, base_end] {
            if bound > MAX_BASE {
                return Err(GlCodeError::InvalidRangeTable(format!(
                    "{} has bound {} outside 0..={}",
                    code, bound, MAX_BASE
                )));
            }
        }
        Ok(Self::from_base(code, group_name, category_name, base_start, base_end))
    }

    pub fn with_group_id(mut self, group_id: i64) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// 4-digit lower bound as stored in the reference data
    pub fn base_start(&self) -> u32 {
        self.range_start / 100
    }

    /// 4-digit upper bound as stored in the reference data
    pub fn base_end(&self) -> u32 {
        self.range_end / 100
    }

    pub fn contains(&self, value: u32) -> bool {
        self.range_start <= value && value <= self.range_end
    }

    pub fn overlaps(&self, other: &AccountGroupRange) -> bool {
        self.range_start <= other.range_end && other.range_start <= self.range_end
    }
}
