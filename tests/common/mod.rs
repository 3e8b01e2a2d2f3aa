#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;

use ledger_glcode::{ClassificationBackend, ClassifyError, LedgerDescriptor, SourceLedger, SqliteStore};

/// Answers by primary group and records every call it receives
pub struct ScriptedBackend {
    answers: HashMap<String, String>,
    failure: Option<ClassifyError>,
    pub calls: RefCell<Vec<Vec<LedgerDescriptor>>>,
}

impl ScriptedBackend {
    pub fn new(answers: &[(&str, &str)]) -> Self {
        ScriptedBackend {
            answers: answers
                .iter()
                .map(|(group, code)| (group.to_string(), code.to_string()))
                .collect(),
            failure: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(error: ClassifyError) -> Self {
        ScriptedBackend {
            answers: HashMap::new(),
            failure: Some(error),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ClassificationBackend for ScriptedBackend {
    fn classify_remote(
        &self,
        batch: &[LedgerDescriptor],
        _instructions: &str,
    ) -> Result<Vec<String>, ClassifyError> {
        self.calls.borrow_mut().push(batch.to_vec());

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        Ok(batch
            .iter()
            .map(|d| {
                self.answers
                    .get(&d.primary_group)
                    .cloned()
                    .unwrap_or_else(|| "UNKNOWN".to_string())
            })
            .collect())
    }
}

pub fn create_test_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.setup().unwrap();
    store
}

pub fn ledger(name: &str, primary: &str, parent: &str) -> SourceLedger {
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

pub fn add_ledgers(store: &SqliteStore, ledgers: &[SourceLedger]) {
    for ledger in ledgers {
        store.upsert_source_ledger(ledger).unwrap();
    }
}

pub fn code_of(store: &SqliteStore, name: &str) -> Option<String> {
    store
        .list_classified()
        .unwrap()
        .into_iter()
        .find(|row| row.ledger_name == name)
        .map(|row| row.gl_code)
}
