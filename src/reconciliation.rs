// ⚖️ Reconciliation - re-evaluate ledgers the sync flagged as changed
//
// For every ledger with isupdate = 1:
//   no output row yet            → New           (fresh code, new row)
//   group or tracked field moved → Reclassified  (fresh code, row overwritten)
//   nothing moved                → Unchanged     (no code, no write)
// then the flag is cleared. The old code of a reclassified ledger stays in
// gl_code_history and is never handed out again.
//
// The whole pass is one unit of work: it commits at the end or rolls back on
// the first storage error.

use std::collections::HashMap;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::assignment::GlCodeJob;
use crate::classifier::ClassificationBackend;
use crate::entities::{AccountGroupRange, CacheKey, ClassifiedLedger, CodeIssue, IssueReason, LedgerEntry};
use crate::error::{GlCodeError, Result};
use crate::store::LedgerStore;

// ============================================================================
// RECONCILE STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileState {
    /// Stored row still matches; nothing written
    Unchanged,

    /// Stored row overwritten under a new code
    Reclassified {
        previous_code: String,
        gl_code: String,
        changed_fields: Vec<String>,
    },

    /// First output row for this ledger
    New { gl_code: String },
}

impl ReconcileState {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileState::Unchanged => "unchanged",
            ReconcileState::Reclassified { .. } => "reclassified",
            ReconcileState::New { .. } => "new",
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub run_id: String,
    pub total: usize,
    pub unchanged: usize,
    pub reclassified: usize,
    pub new: usize,
    /// Allocation failed; the ledger stays flagged
    pub skipped: usize,
}

impl ReconciliationReport {
    fn empty(run_id: &str, total: usize) -> Self {
        ReconciliationReport {
            run_id: run_id.to_string(),
            total,
            unchanged: 0,
            reclassified: 0,
            new: 0,
            skipped: 0,
        }
    }

    fn count(&mut self, state: &ReconcileState) {
        match state {
            ReconcileState::Unchanged => self.unchanged += 1,
            ReconcileState::Reclassified { .. } => self.reclassified += 1,
            ReconcileState::New { .. } => self.new += 1,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} flagged: {} unchanged, {} reclassified, {} new, {} skipped",
            self.total, self.unchanged, self.reclassified, self.new, self.skipped
        )
    }
}

// ============================================================================
// FIELD COMPARISON
// ============================================================================

fn text_differs(a: &Option<String>, b: &Option<String>) -> bool {
    a.as_deref().unwrap_or("") != b.as_deref().unwrap_or("")
}

/// Fields on which the stored row disagrees with the fresh classification
/// (`range`) or the current ledger, in a fixed order. Missing text and
/// empty text compare equal.
pub fn changed_fields(entry: &LedgerEntry, stored: &ClassifiedLedger, range: &AccountGroupRange) -> Vec<&'static str> {
    let mut changed = Vec::new();

    if range.group_name != stored.account_group_name {
        changed.push("account_group_name");
    }
    if range.category_name != stored.category_name {
        changed.push("category_name");
    }
    if entry.ledger_name != stored.ledger_name {
        changed.push("ledger_name");
    }
    if text_differs(&entry.parent_group, &stored.parent_group) {
        changed.push("parent_group");
    }
    if text_differs(&entry.primary_group, &stored.primary_group) {
        changed.push("primary_group");
    }
    if text_differs(&entry.group_name, &stored.group_name) {
        changed.push("group_name");
    }
    if text_differs(&entry.group_parent, &stored.group_parent) {
        changed.push("group_parent");
    }
    if entry.is_revenue != stored.is_revenue {
        changed.push("is_revenue");
    }
    if entry.is_deemed_positive != stored.is_deemed_positive {
        changed.push("is_deemed_positive");
    }
    if entry.affects_gross_profit != stored.affects_gross_profit {
        changed.push("affects_gross_profit");
    }

    changed
}

// ============================================================================
// RECONCILIATION PASS
// ============================================================================

impl<S: LedgerStore, B: ClassificationBackend> GlCodeJob<S, B> {
    /// Re-evaluate every flagged ledger
    pub fn run_reconciliation(&mut self) -> Result<ReconciliationReport> {
        let entries = self.store.fetch_flagged_for_update_entries()?;
        let mut report = ReconciliationReport::empty(&self.run_id, entries.len());

        if entries.is_empty() {
            info!("No ledgers flagged for update");
            return Ok(report);
        }

        info!("Reconciling {} flagged ledgers", entries.len());

        let mut codes: HashMap<CacheKey, String> = HashMap::new();
        for chunk in entries.chunks(self.batch_size) {
            codes.extend(self.classify(chunk));
        }

        self.store.begin_unit()?;
        for entry in &entries {
            match self.reconcile_entry(entry, &codes) {
                Ok(state) => {
                    info!("Ledger {} ({}): {}", entry.ledger_name, entry.ledger_id, state.label());
                    report.count(&state);
                }
                Err(e) if e.is_entry_level() => {
                    error!("Skipping ledger {} ({}): {}", entry.ledger_name, entry.ledger_id, e);
                    report.skipped += 1;
                }
                Err(e) => {
                    error!("Reconciliation failed, rolling back: {}", e);
                    if let Err(rollback) = self.store.rollback_unit() {
                        error!("Rollback failed: {}", rollback);
                    }
                    return Err(e);
                }
            }
        }
        self.store.commit_unit()?;

        info!("Reconciliation done: {}", report.summary());

        Ok(report)
    }

    /// Move one flagged ledger to its new state and clear its flag. Entry
    /// level errors leave the flag set.
    fn reconcile_entry(&mut self, entry: &LedgerEntry, codes: &HashMap<CacheKey, String>) -> Result<ReconcileState> {
        let group_code = self.group_code_for(entry, codes);

        let state = match self.store.fetch_existing_output(entry.ledger_id)? {
            None => {
                let row = self.allocate(entry, &group_code)?;
                self.store.persist_new(&row)?;
                self.record(&row, IssueReason::New)?;
                ReconcileState::New { gl_code: row.gl_code }
            }
            Some(stored) => {
                let range = self
                    .ranges
                    .get(&group_code)
                    .ok_or_else(|| GlCodeError::UnknownGroup(group_code.clone()))?;
                let changed = changed_fields(entry, &stored, range);

                if changed.is_empty() {
                    ReconcileState::Unchanged
                } else {
                    let row = self.allocate(entry, &group_code)?;
                    self.store.persist_update(&row)?;
                    self.record(&row, IssueReason::Reclassified)?;
                    ReconcileState::Reclassified {
                        previous_code: stored.gl_code,
                        gl_code: row.gl_code,
                        changed_fields: changed.into_iter().map(str::to_string).collect(),
                    }
                }
            }
        };

        self.store.clear_update_flag(entry.ledger_id)?;
        Ok(state)
    }

    fn record(&self, row: &ClassifiedLedger, reason: IssueReason) -> Result<()> {
        self.store.record_issue(&CodeIssue::new(
            &row.gl_code,
            row.ledger_id,
            &row.account_group_code,
            reason,
            &self.run_id,
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================
