// 📥 Ledger Import - the sync side of ledger_table
//
// Reads a ledger export (CSV) and upserts it: new ledgers are inserted
// unflagged, known ledgers whose tracked fields changed get isupdate = 1 for
// the reconciliation job.

use log::{info, warn};
use serde::Deserialize;
use std::path::Path;

use crate::entities::SourceLedger;
use crate::error::{GlCodeError, Result};
use crate::store::{LedgerStore, SqliteStore, UpsertOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub flagged: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.flagged + self.unchanged + self.skipped
    }
}

/// One CSV line, before flag parsing
#[derive(Debug, Deserialize)]
struct LedgerRow {
    ledger_name: String,
    #[serde(default)]
    parent_group: Option<String>,
    #[serde(default)]
    primary_group: Option<String>,
    #[serde(default)]
    group_name: Option<String>,
    #[serde(default)]
    group_parent: Option<String>,
    #[serde(default)]
    is_revenue: Option<String>,
    #[serde(default)]
    is_deemed_positive: Option<String>,
    #[serde(default)]
    affects_gross_profit: Option<String>,
}

impl LedgerRow {
    fn into_source(self, line: usize) -> Result<SourceLedger> {
        Ok(SourceLedger {
            ledger_name: self.ledger_name.trim().to_string(),
            parent_group: text(self.parent_group),
            primary_group: text(self.primary_group),
            group_name: text(self.group_name),
            group_parent: text(self.group_parent),
            is_revenue: flag(self.is_revenue, "is_revenue", line)?,
            is_deemed_positive: flag(self.is_deemed_positive, "is_deemed_positive", line)?,
            affects_gross_profit: flag(self.affects_gross_profit, "affects_gross_profit", line)?,
        })
    }
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Ledger exports write flags as Yes/No; true/false and 1/0 are accepted too
fn flag(value: Option<String>, column: &str, line: usize) -> Result<Option<bool>> {
    let Some(raw) = text(value) else {
        return Ok(None);
    };

    match raw.to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(Some(true)),
        "no" | "false" | "0" => Ok(Some(false)),
        _ => Err(GlCodeError::Config(format!(
            "line {}: {} must be Yes/No, got {:?}",
            line, column, raw
        ))),
    }
}

/// Load a ledger export. Header:
/// `ledger_name,parent_group,primary_group,group_name,group_parent,is_revenue,is_deemed_positive,affects_gross_profit`
pub fn load_ledger_csv(csv_path: &Path) -> Result<Vec<SourceLedger>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_path(csv_path)?;

    let mut ledgers = Vec::new();

    for (idx, result) in rdr.deserialize::<LedgerRow>().enumerate() {
        // Header is line 1
        let row = result?;
        ledgers.push(row.into_source(idx + 2)?);
    }

    Ok(ledgers)
}

/// Upsert ledgers in one unit of work
pub fn import_ledgers(store: &SqliteStore, ledgers: &[SourceLedger]) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    store.begin_unit()?;

    for ledger in ledgers {
        if ledger.ledger_name.trim().is_empty() {
            warn!("Skipping ledger without a name: {:?}", ledger);
            summary.skipped += 1;
            continue;
        }

        match store.upsert_source_ledger(ledger) {
            Ok(UpsertOutcome::Inserted(_)) => summary.inserted += 1,
            Ok(UpsertOutcome::Flagged(ledger_id)) => {
                info!("Ledger {} ({}) changed, flagged for update", ledger.ledger_name, ledger_id);
                summary.flagged += 1;
            }
            Ok(UpsertOutcome::Unchanged(_)) => summary.unchanged += 1,
            Err(e) => {
                store.rollback_unit()?;
                return Err(e);
            }
        }
    }

    store.commit_unit()?;

    info!(
        "Imported {} ledgers: {} new, {} flagged, {} unchanged, {} skipped",
        summary.total(),
        summary.inserted,
        summary.flagged,
        summary.unchanged,
        summary.skipped
    );

    Ok(summary)
}
