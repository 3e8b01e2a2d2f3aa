// 🏷️ Fallback Rules - deterministic keyword classification
// Used whenever the hosted classifier is unreachable, unparseable, or
// returns a code outside the chart.

use serde::{Deserialize, Serialize};
use anyhow::{Context as AnyhowContext, Result};
use std::fs;
use std::path::Path;

use crate::entities::LedgerDescriptor;

/// Code used when no rule matches
pub const DEFAULT_FALLBACK_CODE: &str = "CASH";

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackRule {
    /// Rule ID for tracking
    pub id: String,

    /// Keywords looked for in the primary group (any one is enough)
    pub keywords: Vec<String>,

    /// Account group code to assign
    pub code: String,

    /// Description/notes about this rule
    #[serde(default)]
    pub description: Option<String>,

    /// Priority (higher = applied first)
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    0
}

impl FallbackRule {
    pub fn new(id: &str, keywords: &[&str], code: &str, priority: i32) -> Self {
        FallbackRule {
            id: id.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            code: code.to_string(),
            description: None,
            priority,
        }
    }

    /// Case-insensitive substring match on any keyword
    pub fn matches(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| text_lower.contains(&keyword.to_lowercase()))
    }
}

// ============================================================================
// RULE SET
// ============================================================================

#[derive(Debug, Clone)]
pub struct FallbackRules {
    rules: Vec<FallbackRule>,
    default_code: String,
}

impl FallbackRules {
    /// Empty rule set; everything falls through to `default_code`
    pub fn new(default_code: &str) -> Self {
        FallbackRules {
            rules: Vec::new(),
            default_code: default_code.to_string(),
        }
    }

    /// The standard keyword policy, in match order
    pub fn standard() -> Self {
        FallbackRules::from_rules(vec![
            FallbackRule::new("cash", &["sundry debtor", "cash", "bank"], "CASH", 60),
            FallbackRule::new("fixed-assets", &["fixed asset", "property", "plant"], "PPEA", 50),
            FallbackRule::new("capital", &["capital"], "SHCP", 40),
            FallbackRule::new("payroll", &["salary", "wage"], "EMPB", 30),
            FallbackRule::new("sales", &["sales"], "REVO", 20),
            FallbackRule::new("purchases", &["purchase"], "PURC", 10),
        ])
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read fallback rules file: {:?}", path.as_ref()))?;

        let rules: Vec<FallbackRule> = serde_json::from_str(&content)
            .context("Failed to parse fallback rules JSON")?;

        Ok(FallbackRules::from_rules(rules))
    }

    /// Create rule set from a list of rules (default code CASH)
    pub fn from_rules(mut rules: Vec<FallbackRule>) -> Self {
        // Stable sort: equal priorities keep their listed order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        FallbackRules {
            rules,
            default_code: DEFAULT_FALLBACK_CODE.to_string(),
        }
    }

    pub fn add_rule(&mut self, rule: FallbackRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Code for a ledger, looking only at its primary group
    pub fn classify(&self, descriptor: &LedgerDescriptor) -> &str {
        self.matching_rule(&descriptor.primary_group)
            .map(|rule| rule.code.as_str())
            .unwrap_or(&self.default_code)
    }

    /// First rule (by priority) matching the given primary group
    pub fn matching_rule(&self, primary_group: &str) -> Option<&FallbackRule> {
        self.rules.iter().find(|rule| rule.matches(primary_group))
    }

    pub fn default_code(&self) -> &str {
        &self.default_code
    }

    /// Get number of rules loaded
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Codes this rule set can produce, default included
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.rules.iter().map(|r| r.code.as_str()).collect();
        codes.push(&self.default_code);
        codes.sort_unstable();
        codes.dedup();
        codes
    }
}

impl Default for FallbackRules {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// TESTS
// ============================================================================
