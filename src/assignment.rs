// 🏁 GL Code Job - one run of the assignment pipeline
//
// A GlCodeJob owns everything a run mutates: the classification cache (inside
// the classifier) and the per-group counters (inside the allocator). It is
// built at run start and dropped at run end; two runs never share state.
//
// Initial assignment: ledgers without an output row, in batches. Each batch
// is one unit of work. Entries whose group is exhausted or unknown are
// skipped, everything else in the batch commits together.

use std::collections::HashMap;

use log::{error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::allocator::GlCodeAllocator;
use crate::classifier::{ClassificationBackend, LedgerClassifier};
use crate::config::DEFAULT_BATCH_SIZE;
use crate::entities::{CacheKey, ClassifiedLedger, CodeIssue, IssueReason, LedgerEntry};
use crate::error::{GlCodeError, Result};
use crate::ranges::RangeTable;
use crate::reconciliation::ReconciliationReport;
use crate::rules::FallbackRules;
use crate::store::LedgerStore;

/// Progress is logged every this many entries
const PROGRESS_EVERY: usize = 10;

#[derive(Debug, Clone)]
pub struct JobOptions {
    pub batch_size: usize,
    pub fallback: FallbackRules,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            fallback: FallbackRules::standard(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    pub run_id: String,
    pub total: usize,
    pub assigned: usize,
    pub skipped: usize,
    pub batches: usize,
}

/// Both passes of a full run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub assignment: AssignmentReport,
    pub reconciliation: ReconciliationReport,
}

pub struct GlCodeJob<S, B> {
    pub(crate) run_id: String,
    pub(crate) store: S,
    pub(crate) ranges: RangeTable,
    pub(crate) classifier: LedgerClassifier<B>,
    pub(crate) allocator: GlCodeAllocator,
    pub(crate) batch_size: usize,
}

impl<S: LedgerStore, B: ClassificationBackend> GlCodeJob<S, B> {
    /// Load the range table and seed the counters for a new run
    pub fn start(store: S, backend: B, options: JobOptions) -> Result<Self> {
        let ranges = RangeTable::from_ranges(store.load_ranges()?)?;
        let allocator = GlCodeAllocator::seed(&ranges, &store)?;
        let classifier = LedgerClassifier::new(backend, &ranges, options.fallback);
        let run_id = Uuid::new_v4().to_string();

        info!("GL code run {} started ({} account groups)", run_id, ranges.len());

        Ok(GlCodeJob {
            run_id,
            store,
            ranges,
            classifier,
            allocator,
            batch_size: options.batch_size.max(1),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ranges(&self) -> &RangeTable {
        &self.ranges
    }

    pub fn classifier(&self) -> &LedgerClassifier<B> {
        &self.classifier
    }

    /// Initial assignment followed by reconciliation
    pub fn run_all(&mut self) -> Result<RunReport> {
        let assignment = self.run_initial_assignment()?;
        let reconciliation = self.run_reconciliation()?;
        Ok(RunReport {
            assignment,
            reconciliation,
        })
    }

    /// Give every never-classified ledger a GL code
    pub fn run_initial_assignment(&mut self) -> Result<AssignmentReport> {
        let entries = self.store.fetch_unclassified_entries()?;
        let mut report = AssignmentReport {
            run_id: self.run_id.clone(),
            total: entries.len(),
            assigned: 0,
            skipped: 0,
            batches: 0,
        };

        if entries.is_empty() {
            info!("No unclassified ledgers");
            return Ok(report);
        }

        info!("Assigning GL codes to {} ledgers", entries.len());

        let mut processed = 0;
        for batch in entries.chunks(self.batch_size) {
            report.batches += 1;
            let codes = self.classify(batch);

            self.store.begin_unit()?;
            match self.assign_batch(batch, &codes, &mut processed, report.total) {
                Ok((assigned, skipped)) => {
                    self.store.commit_unit()?;
                    report.assigned += assigned;
                    report.skipped += skipped;
                }
                Err(e) => {
                    error!("Batch {} failed, rolling back: {}", report.batches, e);
                    if let Err(rollback) = self.store.rollback_unit() {
                        error!("Rollback failed: {}", rollback);
                    }
                    return Err(e);
                }
            }
        }

        info!(
            "Initial assignment done: {} assigned, {} skipped, {} batches, {} classifier calls",
            report.assigned,
            report.skipped,
            report.batches,
            self.classifier.remote_calls()
        );

        Ok(report)
    }

    fn assign_batch(
        &mut self,
        batch: &[LedgerEntry],
        codes: &HashMap<CacheKey, String>,
        processed: &mut usize,
        total: usize,
    ) -> Result<(usize, usize)> {
        let mut assigned = 0;
        let mut skipped = 0;

        for entry in batch {
            let group_code = self.group_code_for(entry, codes);

            match self.allocate(entry, &group_code) {
                Ok(row) => {
                    self.store.persist_new(&row)?;
                    self.store.record_issue(&CodeIssue::new(
                        &row.gl_code,
                        row.ledger_id,
                        &row.account_group_code,
                        IssueReason::Initial,
                        &self.run_id,
                    ))?;
                    assigned += 1;
                }
                Err(e) if e.is_entry_level() => {
                    error!("Skipping ledger {} ({}): {}", entry.ledger_name, entry.ledger_id, e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }

            *processed += 1;
            if *processed % PROGRESS_EVERY == 0 {
                info!("Processed {}/{} ledgers", processed, total);
            }
        }

        Ok((assigned, skipped))
    }

    /// Classify entries in one classifier call
    pub(crate) fn classify(&mut self, entries: &[LedgerEntry]) -> HashMap<CacheKey, String> {
        let descriptors: Vec<_> = entries.iter().map(LedgerEntry::descriptor).collect();
        self.classifier.classify_batch(&descriptors)
    }

    pub(crate) fn group_code_for(&self, entry: &LedgerEntry, codes: &HashMap<CacheKey, String>) -> String {
        match codes.get(&entry.cache_key()) {
            Some(code) => code.clone(),
            None => {
                warn!("No classification for ledger {}, using fallback", entry.ledger_name);
                self.classifier.fallback_code(&entry.descriptor())
            }
        }
    }

    /// Issue a code from `group_code` and build the output row for it
    pub(crate) fn allocate(&mut self, entry: &LedgerEntry, group_code: &str) -> Result<ClassifiedLedger> {
        let range = self
            .ranges
            .get(group_code)
            .ok_or_else(|| GlCodeError::UnknownGroup(group_code.to_string()))?;
        let gl_code = self.allocator.next_code(group_code)?;

        Ok(ClassifiedLedger::assign(entry, range, gl_code))
    }
}
