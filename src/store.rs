// 🗄️ Ledger Store - everything the GL code jobs read and write
//
// LedgerStore is the seam between the jobs and persistence. SqliteStore is the
// rusqlite implementation: one database file per tenant, WAL journal.
//
// Tables:
//   categories, account_groups   reference data (seeded from the built-in chart)
//   ledger_table                 ledgers as delivered by the sync
//   ledger_table_gl_code         one classified row per ledger
//   gl_code_history              every code ever issued (append-only)

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::entities::{AccountGroupRange, ClassifiedLedger, CodeIssue, IssueReason, LedgerEntry, SourceLedger};
use crate::error::Result;
use crate::ranges::{ACCOUNT_GROUPS, CATEGORIES};

// ============================================================================
// STORE INTERFACE
// ============================================================================

pub trait LedgerStore {
    /// Account groups with their widened 6-digit ranges
    fn load_ranges(&self) -> Result<Vec<AccountGroupRange>>;

    /// Highest code ever issued inside `[range_start, range_end]`
    fn max_assigned_code(&self, group_code: &str, range_start: u32, range_end: u32) -> Result<Option<u32>>;

    /// Ledgers without any output row, in ledger_id order
    fn fetch_unclassified_entries(&self) -> Result<Vec<LedgerEntry>>;

    /// Ledgers with isupdate set, in ledger_id order
    fn fetch_flagged_for_update_entries(&self) -> Result<Vec<LedgerEntry>>;

    fn fetch_existing_output(&self, ledger_id: i64) -> Result<Option<ClassifiedLedger>>;

    fn persist_new(&self, row: &ClassifiedLedger) -> Result<()>;

    /// Overwrite the output row of `row.ledger_id`
    fn persist_update(&self, row: &ClassifiedLedger) -> Result<()>;

    fn clear_update_flag(&self, ledger_id: i64) -> Result<()>;

    fn record_issue(&self, issue: &CodeIssue) -> Result<()>;

    // Unit of work
    fn begin_unit(&self) -> Result<()>;
    fn commit_unit(&self) -> Result<()>;
    fn rollback_unit(&self) -> Result<()>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for &S {
    fn load_ranges(&self) -> Result<Vec<AccountGroupRange>> {
        (**self).load_ranges()
    }

    fn max_assigned_code(&self, group_code: &str, range_start: u32, range_end: u32) -> Result<Option<u32>> {
        (**self).max_assigned_code(group_code, range_start, range_end)
    }

    fn fetch_unclassified_entries(&self) -> Result<Vec<LedgerEntry>> {
        (**self).fetch_unclassified_entries()
    }

    fn fetch_flagged_for_update_entries(&self) -> Result<Vec<LedgerEntry>> {
        (**self).fetch_flagged_for_update_entries()
    }

    fn fetch_existing_output(&self, ledger_id: i64) -> Result<Option<ClassifiedLedger>> {
        (**self).fetch_existing_output(ledger_id)
    }

    fn persist_new(&self, row: &ClassifiedLedger) -> Result<()> {
        (**self).persist_new(row)
    }

    fn persist_update(&self, row: &ClassifiedLedger) -> Result<()> {
        (**self).persist_update(row)
    }

    fn clear_update_flag(&self, ledger_id: i64) -> Result<()> {
        (**self).clear_update_flag(ledger_id)
    }

    fn record_issue(&self, issue: &CodeIssue) -> Result<()> {
        (**self).record_issue(issue)
    }

    fn begin_unit(&self) -> Result<()> {
        (**self).begin_unit()
    }

    fn commit_unit(&self) -> Result<()> {
        (**self).commit_unit()
    }

    fn rollback_unit(&self) -> Result<()> {
        (**self).rollback_unit()
    }
}

/// What the sync-side upsert did with a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Flagged(i64),
    Unchanged(i64),
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

const LEDGER_COLUMNS: &str = "ledger_id, ledger_name, parent_group, primary_group, group_name, group_parent,
     is_revenue, is_deemed_positive, affects_gross_profit, isupdate";

const OUTPUT_COLUMNS: &str = "gl_code, ledger_id, ledger_name, account_group_code, category_name,
     account_group_name, primary_group, parent_group, group_parent, group_name,
     is_revenue, is_deemed_positive, affects_gross_profit";

impl SqliteStore {
    /// Open (or create) a database file, creating its directory if needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(SqliteStore {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(SqliteStore {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create tables and indexes, then seed the reference data. Idempotent.
    pub fn setup(&self) -> Result<()> {
        // Enable WAL mode for crash recovery
        self.conn.pragma_update(None, "journal_mode", "WAL")?;

        // ======================================================================
        // Reference data
        // ======================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                category_id INTEGER PRIMARY KEY AUTOINCREMENT,
                category_name TEXT UNIQUE NOT NULL,
                gl_code_start INTEGER NOT NULL,
                gl_code_end INTEGER NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS account_groups (
                group_id INTEGER PRIMARY KEY AUTOINCREMENT,
                main_groups_code TEXT UNIQUE NOT NULL,
                main_groups TEXT NOT NULL,
                category_id INTEGER NOT NULL REFERENCES categories(category_id),
                gl_code_start INTEGER NOT NULL,
                gl_code_end INTEGER NOT NULL
            )",
            [],
        )?;

        // ======================================================================
        // Ledgers (written by the sync)
        // ======================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_table (
                ledger_id INTEGER PRIMARY KEY AUTOINCREMENT,
                ledger_name TEXT UNIQUE NOT NULL,
                parent_group TEXT,
                primary_group TEXT,
                group_name TEXT,
                group_parent TEXT,
                is_revenue INTEGER,
                is_deemed_positive INTEGER,
                affects_gross_profit INTEGER,
                isupdate INTEGER NOT NULL DEFAULT 0,
                source_hash TEXT,
                updated_at TEXT
            )",
            [],
        )?;

        // ======================================================================
        // Classified ledgers (written by the GL code jobs)
        // ======================================================================
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_table_gl_code (
                gl_code TEXT UNIQUE NOT NULL,
                ledger_id INTEGER UNIQUE NOT NULL,
                ledger_name TEXT NOT NULL,
                account_group_code TEXT NOT NULL,
                category_name TEXT NOT NULL,
                account_group_name TEXT NOT NULL,
                primary_group TEXT,
                parent_group TEXT,
                group_parent TEXT,
                isupdate INTEGER NOT NULL DEFAULT 0,
                group_name TEXT,
                is_revenue INTEGER,
                is_deemed_positive INTEGER,
                affects_gross_profit INTEGER,
                assigned_at TEXT
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS gl_code_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                gl_code TEXT UNIQUE NOT NULL,
                ledger_id INTEGER NOT NULL,
                group_code TEXT NOT NULL,
                reason TEXT NOT NULL,
                run_id TEXT NOT NULL,
                issued_at TEXT NOT NULL
            )",
            [],
        )?;

        // ======================================================================
        // Indexes
        // ======================================================================
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ledger_isupdate ON ledger_table(isupdate)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_ledger ON gl_code_history(ledger_id)",
            [],
        )?;

        self.seed_reference_data()?;

        Ok(())
    }

    /// Insert the built-in categories and account groups that are missing
    pub fn seed_reference_data(&self) -> Result<usize> {
        let mut inserted = 0;

        for category in CATEGORIES.iter() {
            self.conn.execute(
                "INSERT OR IGNORE INTO categories (category_name, gl_code_start, gl_code_end)
                 VALUES (?1, ?2, ?3)",
                params![category.name, category.base_start, category.base_end],
            )?;
        }

        for group in ACCOUNT_GROUPS.iter() {
            inserted += self.conn.execute(
                "INSERT OR IGNORE INTO account_groups
                    (main_groups_code, main_groups, category_id, gl_code_start, gl_code_end)
                 SELECT ?1, ?2, category_id, ?3, ?4 FROM categories WHERE category_name = ?5",
                params![group.code, group.name, group.base_start, group.base_end, group.category],
            )?;
        }

        Ok(inserted)
    }

    // ========================================================================
    // Sync side
    // ========================================================================

    /// Insert a new ledger, or update a known one and flag it for
    /// reconciliation when any tracked field changed.
    pub fn upsert_source_ledger(&self, source: &SourceLedger) -> Result<UpsertOutcome> {
        let fingerprint = source.fingerprint();
        let now = Utc::now().to_rfc3339();

        let existing: Option<(i64, Option<String>)> = self
            .conn
            .query_row(
                "SELECT ledger_id, source_hash FROM ledger_table WHERE ledger_name = ?1",
                [&source.ledger_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO ledger_table (
                        ledger_name, parent_group, primary_group, group_name, group_parent,
                        is_revenue, is_deemed_positive, affects_gross_profit,
                        isupdate, source_hash, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)",
                    params![
                        source.ledger_name,
                        source.parent_group,
                        source.primary_group,
                        source.group_name,
                        source.group_parent,
                        source.is_revenue,
                        source.is_deemed_positive,
                        source.affects_gross_profit,
                        fingerprint,
                        now,
                    ],
                )?;
                Ok(UpsertOutcome::Inserted(self.conn.last_insert_rowid()))
            }
            Some((ledger_id, Some(hash))) if hash == fingerprint => Ok(UpsertOutcome::Unchanged(ledger_id)),
            Some((ledger_id, _)) => {
                self.conn.execute(
                    "UPDATE ledger_table
                     SET parent_group = ?1, primary_group = ?2, group_name = ?3, group_parent = ?4,
                         is_revenue = ?5, is_deemed_positive = ?6, affects_gross_profit = ?7,
                         isupdate = 1, source_hash = ?8, updated_at = ?9
                     WHERE ledger_id = ?10",
                    params![
                        source.parent_group,
                        source.primary_group,
                        source.group_name,
                        source.group_parent,
                        source.is_revenue,
                        source.is_deemed_positive,
                        source.affects_gross_profit,
                        fingerprint,
                        now,
                        ledger_id,
                    ],
                )?;
                Ok(UpsertOutcome::Flagged(ledger_id))
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn fetch_entry(&self, ledger_id: i64) -> Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {} FROM ledger_table WHERE ledger_id = ?1", LEDGER_COLUMNS);
        let entry = self
            .conn
            .query_row(&sql, [ledger_id], ledger_entry_from_row)
            .optional()?;
        Ok(entry)
    }

    /// All classified ledgers ordered by code
    pub fn list_classified(&self) -> Result<Vec<ClassifiedLedger>> {
        let sql = format!(
            "SELECT {} FROM ledger_table_gl_code ORDER BY gl_code",
            OUTPUT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], classified_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every code issued for a ledger, oldest first
    pub fn history_for(&self, ledger_id: i64) -> Result<Vec<CodeIssue>> {
        let mut stmt = self.conn.prepare(
            "SELECT gl_code, ledger_id, group_code, reason, run_id, issued_at
             FROM gl_code_history
             WHERE ledger_id = ?1
             ORDER BY id",
        )?;

        let issues = stmt
            .query_map([ledger_id], |row| {
                let reason: String = row.get(3)?;
                let issued_at: String = row.get(5)?;

                Ok(CodeIssue {
                    gl_code: row.get(0)?,
                    ledger_id: row.get(1)?,
                    group_code: row.get(2)?,
                    reason: IssueReason::parse(&reason).ok_or(rusqlite::Error::InvalidQuery)?,
                    run_id: row.get(4)?,
                    issued_at: DateTime::parse_from_rfc3339(&issued_at)
                        .map_err(|_| rusqlite::Error::InvalidQuery)?
                        .with_timezone(&Utc),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(issues)
    }

    pub fn count_entries(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger_table", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_classified(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM ledger_table_gl_code", [], |row| row.get(0))?;
        Ok(count)
    }

    fn fetch_entries_where(&self, clause: &str) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM ledger_table lt {} ORDER BY lt.ledger_id",
            LEDGER_COLUMNS
                .split(',')
                .map(|c| format!("lt.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", "),
            clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map([], ledger_entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn ledger_entry_from_row(row: &Row) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        ledger_id: row.get(0)?,
        ledger_name: row.get(1)?,
        parent_group: row.get(2)?,
        primary_group: row.get(3)?,
        group_name: row.get(4)?,
        group_parent: row.get(5)?,
        is_revenue: row.get(6)?,
        is_deemed_positive: row.get(7)?,
        affects_gross_profit: row.get(8)?,
        isupdate: row.get(9)?,
    })
}

fn classified_from_row(row: &Row) -> rusqlite::Result<ClassifiedLedger> {
    Ok(ClassifiedLedger {
        gl_code: row.get(0)?,
        ledger_id: row.get(1)?,
        ledger_name: row.get(2)?,
        account_group_code: row.get(3)?,
        category_name: row.get(4)?,
        account_group_name: row.get(5)?,
        primary_group: row.get(6)?,
        parent_group: row.get(7)?,
        group_parent: row.get(8)?,
        group_name: row.get(9)?,
        is_revenue: row.get(10)?,
        is_deemed_positive: row.get(11)?,
        affects_gross_profit: row.get(12)?,
    })
}

impl LedgerStore for SqliteStore {
    fn load_ranges(&self) -> Result<Vec<AccountGroupRange>> {
        let mut stmt = self.conn.prepare(
            "SELECT ag.main_groups_code, ag.gl_code_start, ag.gl_code_end,
                    c.category_name, ag.main_groups, ag.group_id
             FROM account_groups ag
             JOIN categories c ON ag.category_id = c.category_id
             ORDER BY ag.gl_code_start",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(code, start, end, category, group, group_id)| {
                Ok(AccountGroupRange::try_from_base(&code, &group, &category, start, end)?.with_group_id(group_id))
            })
            .collect()
    }

    fn max_assigned_code(&self, _group_code: &str, range_start: u32, range_end: u32) -> Result<Option<u32>> {
        // History included: a code overwritten by reclassification still counts
        let max: Option<u32> = self.conn.query_row(
            "SELECT MAX(code) FROM (
                SELECT CAST(gl_code AS INTEGER) AS code FROM ledger_table_gl_code
                UNION ALL
                SELECT CAST(gl_code AS INTEGER) AS code FROM gl_code_history
             ) WHERE code BETWEEN ?1 AND ?2",
            params![range_start, range_end],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn fetch_unclassified_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.fetch_entries_where(
            "LEFT JOIN ledger_table_gl_code gl ON lt.ledger_id = gl.ledger_id WHERE gl.ledger_id IS NULL",
        )
    }

    fn fetch_flagged_for_update_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.fetch_entries_where("WHERE lt.isupdate = 1")
    }

    fn fetch_existing_output(&self, ledger_id: i64) -> Result<Option<ClassifiedLedger>> {
        let sql = format!(
            "SELECT {} FROM ledger_table_gl_code WHERE ledger_id = ?1",
            OUTPUT_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, [ledger_id], classified_from_row)
            .optional()?;
        Ok(row)
    }

    fn persist_new(&self, row: &ClassifiedLedger) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ledger_table_gl_code (
                gl_code, ledger_id, ledger_name, account_group_code, category_name,
                account_group_name, primary_group, parent_group, group_parent, isupdate,
                group_name, is_revenue, is_deemed_positive, affects_gross_profit, assigned_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.gl_code,
                row.ledger_id,
                row.ledger_name,
                row.account_group_code,
                row.category_name,
                row.account_group_name,
                row.primary_group,
                row.parent_group,
                row.group_parent,
                row.group_name,
                row.is_revenue,
                row.is_deemed_positive,
                row.affects_gross_profit,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn persist_update(&self, row: &ClassifiedLedger) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE ledger_table_gl_code
             SET gl_code = ?1, ledger_name = ?2, account_group_code = ?3, category_name = ?4,
                 account_group_name = ?5, primary_group = ?6, parent_group = ?7, group_parent = ?8,
                 isupdate = 0, group_name = ?9, is_revenue = ?10, is_deemed_positive = ?11,
                 affects_gross_profit = ?12, assigned_at = ?13
             WHERE ledger_id = ?14",
            params![
                row.gl_code,
                row.ledger_name,
                row.account_group_code,
                row.category_name,
                row.account_group_name,
                row.primary_group,
                row.parent_group,
                row.group_parent,
                row.group_name,
                row.is_revenue,
                row.is_deemed_positive,
                row.affects_gross_profit,
                Utc::now().to_rfc3339(),
                row.ledger_id,
            ],
        )?;

        if updated == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows.into());
        }
        Ok(())
    }

    fn clear_update_flag(&self, ledger_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE ledger_table SET isupdate = 0 WHERE ledger_id = ?1",
            [ledger_id],
        )?;
        self.conn.execute(
            "UPDATE ledger_table_gl_code SET isupdate = 0 WHERE ledger_id = ?1",
            [ledger_id],
        )?;
        Ok(())
    }

    fn record_issue(&self, issue: &CodeIssue) -> Result<()> {
        self.conn.execute(
            "INSERT INTO gl_code_history (gl_code, ledger_id, group_code, reason, run_id, issued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                issue.gl_code,
                issue.ledger_id,
                issue.group_code,
                issue.reason.as_str(),
                issue.run_id,
                issue.issued_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn begin_unit(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_unit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_unit(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::builtin_ranges;
    use pretty_assertions::assert_eq;

    fn create_test_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.setup().unwrap();
        store
    }

    fn source(name: &str, primary: &str, parent: &str) -> SourceLedger {
        SourceLedger {
            ledger_name: name.to_string(),
            parent_group: Some(parent.to_string()),
            primary_group: Some(primary.to_string()),
            group_name: Some(primary.to_string()),
            group_parent: Some("Primary".to_string()),
            is_revenue: Some(false),
            is_deemed_positive: Some(true),
            affects_gross_profit: Some(false),
        }
    }

    fn classified(store: &SqliteStore, ledger_id: i64, gl_code: &str, group: &str) -> ClassifiedLedger {
        let entry = store.fetch_entry(ledger_id).unwrap().unwrap();
        let ranges = store.load_ranges().unwrap();
        let range = ranges.iter().find(|r| r.code == group).unwrap();
        ClassifiedLedger::assign(&entry, range, gl_code.to_string())
    }

    #[test]
    fn test_setup_is_idempotent() {
        let store = create_test_store();
        store.setup().unwrap();

        assert_eq!(store.seed_reference_data().unwrap(), 0);
        assert_eq!(store.load_ranges().unwrap().len(), 38);
    }

    #[test]
    fn test_load_ranges_matches_builtin_chart() {
        let store = create_test_store();

        let mut loaded: Vec<(String, u32, u32)> = store
            .load_ranges()
            .unwrap()
            .into_iter()
            .map(|r| (r.code, r.range_start, r.range_end))
            .collect();
        let mut builtin: Vec<(String, u32, u32)> = builtin_ranges()
            .into_iter()
            .map(|r| (r.code, r.range_start, r.range_end))
            .collect();
        loaded.sort();
        builtin.sort();

        assert_eq!(loaded, builtin);
        assert!(store.load_ranges().unwrap().iter().all(|r| r.group_id.is_some()));
    }

    #[test]
    fn test_load_ranges_rejects_oversized_bound() {
        let store = create_test_store();
        store
            .conn()
            .execute(
                "UPDATE account_groups SET gl_code_end = 50000000 WHERE main_groups_code = 'DEFT'",
                [],
            )
            .unwrap();

        match store.load_ranges() {
            Err(crate::error::GlCodeError::InvalidRangeTable(msg)) => assert!(msg.contains("DEFT"), "{}", msg),
            other => panic!("expected invalid range table, got {:?}", other),
        }
    }

    #[test]
    fn test_upsert_source_ledger() {
        let store = create_test_store();
        let ledger = source("HDFC Bank", "Bank Accounts", "Current Assets");

        let id = match store.upsert_source_ledger(&ledger).unwrap() {
            UpsertOutcome::Inserted(id) => id,
            other => panic!("expected insert, got {:?}", other),
        };
        assert_eq!(store.upsert_source_ledger(&ledger).unwrap(), UpsertOutcome::Unchanged(id));
        assert!(!store.fetch_entry(id).unwrap().unwrap().isupdate);

        let mut moved = ledger.clone();
        moved.primary_group = Some("Bank OD A/c".to_string());
        assert_eq!(store.upsert_source_ledger(&moved).unwrap(), UpsertOutcome::Flagged(id));

        let entry = store.fetch_entry(id).unwrap().unwrap();
        assert!(entry.isupdate);
        assert_eq!(entry.primary_group.as_deref(), Some("Bank OD A/c"));
        assert_eq!(store.count_entries().unwrap(), 1);
    }

    #[test]
    fn test_unclassified_and_flagged_queries() {
        let store = create_test_store();
        store.upsert_source_ledger(&source("Cash", "Cash-in-Hand", "Current Assets")).unwrap();
        store.upsert_source_ledger(&source("Sales", "Sales Accounts", "Direct Income")).unwrap();

        let pending = store.fetch_unclassified_entries().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].ledger_name, "Cash");

        store.persist_new(&classified(&store, pending[0].ledger_id, "580001", "CASH")).unwrap();
        let pending = store.fetch_unclassified_entries().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ledger_name, "Sales");

        assert!(store.fetch_flagged_for_update_entries().unwrap().is_empty());
        let mut moved = source("Cash", "Cash-in-Hand", "Current Assets");
        moved.is_deemed_positive = Some(false);
        store.upsert_source_ledger(&moved).unwrap();

        let flagged = store.fetch_flagged_for_update_entries().unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].ledger_name, "Cash");

        store.clear_update_flag(flagged[0].ledger_id).unwrap();
        assert!(store.fetch_flagged_for_update_entries().unwrap().is_empty());
    }

    #[test]
    fn test_persist_and_fetch_output() {
        let store = create_test_store();
        let id = match store.upsert_source_ledger(&source("Sales", "Sales Accounts", "Direct Income")).unwrap() {
            UpsertOutcome::Inserted(id) => id,
            other => panic!("expected insert, got {:?}", other),
        };

        let row = classified(&store, id, "600001", "REVO");
        store.persist_new(&row).unwrap();
        assert_eq!(store.fetch_existing_output(id).unwrap(), Some(row.clone()));

        let mut moved = row.clone();
        moved.gl_code = "680001".to_string();
        moved.account_group_code = "OTHI".to_string();
        moved.account_group_name = "Other income".to_string();
        store.persist_update(&moved).unwrap();

        assert_eq!(store.fetch_existing_output(id).unwrap(), Some(moved));
        assert_eq!(store.list_classified().unwrap().len(), 1);
        assert_eq!(store.fetch_existing_output(id + 100).unwrap(), None);
    }

    #[test]
    fn test_persist_update_without_row_fails() {
        let store = create_test_store();
        let id = match store.upsert_source_ledger(&source("Sales", "Sales Accounts", "Direct Income")).unwrap() {
            UpsertOutcome::Inserted(id) => id,
            other => panic!("expected insert, got {:?}", other),
        };

        assert!(store.persist_update(&classified(&store, id, "600001", "REVO")).is_err());
    }

    #[test]
    fn test_duplicate_gl_code_rejected() {
        let store = create_test_store();
        store.upsert_source_ledger(&source("A", "Sales Accounts", "Direct Income")).unwrap();
        store.upsert_source_ledger(&source("B", "Sales Accounts", "Direct Income")).unwrap();
        let entries = store.fetch_unclassified_entries().unwrap();

        store.persist_new(&classified(&store, entries[0].ledger_id, "600001", "REVO")).unwrap();
        let clash = store.persist_new(&classified(&store, entries[1].ledger_id, "600001", "REVO"));

        assert!(clash.is_err());
    }

    #[test]
    fn test_max_assigned_code_includes_history() {
        let store = create_test_store();
        assert_eq!(store.max_assigned_code("REVO", 600001, 679999).unwrap(), None);

        let id = match store.upsert_source_ledger(&source("Sales", "Sales Accounts", "Direct Income")).unwrap() {
            UpsertOutcome::Inserted(id) => id,
            other => panic!("expected insert, got {:?}", other),
        };
        store.persist_new(&classified(&store, id, "600004", "REVO")).unwrap();
        assert_eq!(store.max_assigned_code("REVO", 600001, 679999).unwrap(), Some(600004));

        // Code overwritten by a reclassification survives only in the history
        store
            .record_issue(&CodeIssue::new("600009", id, "REVO", IssueReason::Initial, "run-1"))
            .unwrap();
        assert_eq!(store.max_assigned_code("REVO", 600001, 679999).unwrap(), Some(600009));

        // Other groups are unaffected
        assert_eq!(store.max_assigned_code("CASH", 580001, 584999).unwrap(), None);
    }

    #[test]
    fn test_history_round_trip() {
        let store = create_test_store();
        store
            .record_issue(&CodeIssue::new("580001", 3, "CASH", IssueReason::Initial, "run-1"))
            .unwrap();
        store
            .record_issue(&CodeIssue::new("580002", 3, "CASH", IssueReason::Reclassified, "run-2"))
            .unwrap();

        let history = store.history_for(3).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].gl_code, "580001");
        assert_eq!(history[1].reason, IssueReason::Reclassified);
        assert_eq!(history[1].run_id, "run-2");
        assert!(store.history_for(4).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_discards_unit() {
        let store = create_test_store();

        store.begin_unit().unwrap();
        store.upsert_source_ledger(&source("Temp", "Cash-in-Hand", "Current Assets")).unwrap();
        store.rollback_unit().unwrap();
        assert_eq!(store.count_entries().unwrap(), 0);

        store.begin_unit().unwrap();
        store.upsert_source_ledger(&source("Kept", "Cash-in-Hand", "Current Assets")).unwrap();
        store.commit_unit().unwrap();
        assert_eq!(store.count_entries().unwrap(), 1);
    }
}
