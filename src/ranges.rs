// 🗂️ Range Table - the fixed chart of account groups and their GL code blocks
//
// Loaded once per job run (from the reference tables, or the built-in copy)
// and never mutated afterwards. Construction rejects inverted or overlapping
// blocks and duplicate codes.

use std::collections::HashMap;

use crate::entities::AccountGroupRange;
use crate::error::{GlCodeError, Result};

/// Highest 6-digit GL code
pub const MAX_GL_CODE: u32 = 999_999;

// ============================================================================
// REFERENCE DATA
// ============================================================================

/// Category with its 4-digit bounds
#[derive(Debug, Clone, Copy)]
pub struct ReferenceCategory {
    pub name: &'static str,
    pub base_start: u32,
    pub base_end: u32,
}

/// Account group with its 4-digit sub-range
#[derive(Debug, Clone, Copy)]
pub struct ReferenceGroup {
    pub code: &'static str,
    pub name: &'static str,
    pub category: &'static str,
    pub base_start: u32,
    pub base_end: u32,
}

pub const CATEGORIES: [ReferenceCategory; 8] = [
    ReferenceCategory { name: "Owners Equity", base_start: 1000, base_end: 1999 },
    ReferenceCategory { name: "Non-current liabilities", base_start: 2000, base_end: 2999 },
    ReferenceCategory { name: "Current liabilities", base_start: 3000, base_end: 3999 },
    ReferenceCategory { name: "Non-current assets", base_start: 4000, base_end: 4999 },
    ReferenceCategory { name: "Current assets", base_start: 5000, base_end: 5999 },
    ReferenceCategory { name: "Income", base_start: 6000, base_end: 6999 },
    ReferenceCategory { name: "Expenses", base_start: 7000, base_end: 8999 },
    ReferenceCategory { name: "Appropriation", base_start: 8800, base_end: 8999 },
];

const fn group(
    code: &'static str,
    name: &'static str,
    category: &'static str,
    base_start: u32,
    base_end: u32,
) -> ReferenceGroup {
    ReferenceGroup { code, name, category, base_start, base_end }
}

pub const ACCOUNT_GROUPS: [ReferenceGroup; 38] = [
    group("SHCP", "Share capital", "Owners Equity", 1000, 1099),
    group("RESV", "Reserves and Surplus", "Owners Equity", 1100, 1999),
    group("LTBR", "Long-term borrowings", "Non-current liabilities", 2000, 2249),
    group("TRPY-N", "Trade payables (Non-current)", "Non-current liabilities", 2250, 2299),
    group("OLTL", "Other long-term liabilities", "Non-current liabilities", 2300, 2549),
    group("LTPR", "Long-term provisions", "Non-current liabilities", 2550, 2799),
    group("STBR", "Short-term borrowings", "Current liabilities", 3000, 3149),
    group("TRPY-C", "Trade payables (Current)", "Current liabilities", 3150, 3499),
    group("OCLI", "Other current liabilities", "Current liabilities", 3500, 3799),
    group("STPR", "Short-term provisions", "Current liabilities", 3800, 3899),
    group("PPEA", "Property, Plant and Equipment", "Non-current assets", 4000, 4299),
    group("INTG", "Intangible assets", "Non-current assets", 4300, 4349),
    group("CWIP", "Capital work-in-progress", "Non-current assets", 4350, 4399),
    group("NCIN", "Non-current investments", "Non-current assets", 4400, 4499),
    group("DTAX", "Deferred tax assets (net)", "Non-current assets", 4500, 4529),
    group("LTLA", "Long-term Loans and advances", "Non-current assets", 4530, 4599),
    group("TRDR-N", "Trade receivables (Non-current)", "Non-current assets", 4600, 4649),
    group("ONCA", "Other non-current assets", "Non-current assets", 4650, 4699),
    group("CUIN", "Current investments", "Current assets", 5000, 5299),
    group("INVT", "Inventories", "Current assets", 5300, 5549),
    group("TRDR-C", "Trade receivables (Current)", "Current assets", 5550, 5799),
    group("CASH", "Cash and bank balances", "Current assets", 5800, 5849),
    group("STLA", "Short-term Loans and advances", "Current assets", 5850, 5899),
    group("OCCA", "Other current assets", "Current assets", 5900, 5949),
    group("REVO", "Revenue from operations", "Income", 6000, 6799),
    group("OTHI", "Other income", "Income", 6800, 6999),
    group("COGS", "Cost of material & components consumed", "Expenses", 7000, 7399),
    group("PURC", "Purchases", "Expenses", 7400, 7799),
    group("CINV", "(Increase)/decrease in Inventories", "Expenses", 7800, 7999),
    group("EMPB", "Employee benefits expense", "Expenses", 8000, 8199),
    group("DEPR", "Depreciation and amortization expense", "Expenses", 8200, 8299),
    group("FNCE", "Finance costs", "Expenses", 8300, 8390),
    group("INPF", "Share of (profit)/ loss from investment in partnership firm", "Expenses", 8391, 8399),
    group("OTHE", "Other expenses", "Expenses", 8400, 8799),
    group("EXIT", "Exceptional items", "Appropriation", 8800, 8879),
    group("TAXE", "Tax expenses", "Appropriation", 8880, 8939),
    group("CURT", "Current tax", "Appropriation", 8940, 8969),
    group("DEFT", "Deferred tax", "Appropriation", 8970, 8979),
];

// ============================================================================
// RANGE TABLE
// ============================================================================

#[derive(Debug, Clone)]
pub struct RangeTable {
    /// Sorted by range_start
    ranges: Vec<AccountGroupRange>,
    by_code: HashMap<String, usize>,
}

impl RangeTable {
    /// Validate and index a set of ranges.
    pub fn from_ranges(mut ranges: Vec<AccountGroupRange>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(GlCodeError::InvalidRangeTable(
                "no account groups loaded".to_string(),
            ));
        }

        ranges.sort_by(|a, b| a.range_start.cmp(&b.range_start).then(a.code.cmp(&b.code)));

        for range in &ranges {
            if range.range_start > range.range_end {
                return Err(GlCodeError::InvalidRangeTable(format!(
                    "{} starts at {:06} after its end {:06}",
                    range.code, range.range_start, range.range_end
                )));
            }
            if range.range_end > MAX_GL_CODE {
                return Err(GlCodeError::InvalidRangeTable(format!(
                    "{} ends at {} beyond 6-digit codes",
                    range.code, range.range_end
                )));
            }
        }

        // Sorted by start, so an overlap always involves the range reaching
        // furthest so far.
        let mut widest = 0;
        for i in 1..ranges.len() {
            if ranges[widest].overlaps(&ranges[i]) {
                return Err(GlCodeError::InvalidRangeTable(format!(
                    "{} ({:06}-{:06}) overlaps {} ({:06}-{:06})",
                    ranges[widest].code,
                    ranges[widest].range_start,
                    ranges[widest].range_end,
                    ranges[i].code,
                    ranges[i].range_start,
                    ranges[i].range_end
                )));
            }
            if ranges[i].range_end > ranges[widest].range_end {
                widest = i;
            }
        }

        let mut by_code = HashMap::with_capacity(ranges.len());
        for (idx, range) in ranges.iter().enumerate() {
            if by_code.insert(range.code.clone(), idx).is_some() {
                return Err(GlCodeError::InvalidRangeTable(format!(
                    "duplicate account group code {}",
                    range.code
                )));
            }
        }

        Ok(RangeTable { ranges, by_code })
    }

    /// Table built from the compiled-in reference data
    pub fn builtin() -> Result<Self> {
        Self::from_ranges(builtin_ranges())
    }

    pub fn get(&self, code: &str) -> Option<&AccountGroupRange> {
        self.by_code.get(code).map(|&idx| &self.ranges[idx])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Codes in ascending range order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.ranges.iter().map(|r| r.code.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountGroupRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Built-in reference data widened to 6-digit ranges
pub fn builtin_ranges() -> Vec<AccountGroupRange> {
    ACCOUNT_GROUPS
        .iter()
        .map(|g| AccountGroupRange::from_base(g.code, g.name, g.category, g.base_start, g.base_end))
        .collect()
}
