// 🤖 Ledger Classifier - account group codes via a hosted model, with a cache
// and deterministic fallback rules
//
// One classifier lives for one job run. Ledgers are keyed by their
// (primary_group, parent_group) pair: a pair is sent to the backend at most
// once per run, and only valid answers are cached. Anything else (transport
// failure, unparseable answer, unknown code) is answered by the fallback
// rules, so classification itself never fails a job.

use std::collections::{HashMap, HashSet};

use log::{debug, error, info, warn};

use crate::entities::{CacheKey, LedgerDescriptor};
use crate::error::ClassifyError;
use crate::ranges::{RangeTable, CATEGORIES};
use crate::rules::FallbackRules;

// ============================================================================
// BACKEND
// ============================================================================

/// Remote classification call: descriptors in, one code per descriptor out,
/// in the order submitted.
pub trait ClassificationBackend {
    fn classify_remote(
        &self,
        batch: &[LedgerDescriptor],
        instructions: &str,
    ) -> Result<Vec<String>, ClassifyError>;
}

impl<B: ClassificationBackend + ?Sized> ClassificationBackend for Box<B> {
    fn classify_remote(
        &self,
        batch: &[LedgerDescriptor],
        instructions: &str,
    ) -> Result<Vec<String>, ClassifyError> {
        (**self).classify_remote(batch, instructions)
    }
}

impl<B: ClassificationBackend + ?Sized> ClassificationBackend for &B {
    fn classify_remote(
        &self,
        batch: &[LedgerDescriptor],
        instructions: &str,
    ) -> Result<Vec<String>, ClassifyError> {
        (**self).classify_remote(batch, instructions)
    }
}

/// Backend used when no hosted model is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

impl ClassificationBackend for OfflineBackend {
    fn classify_remote(
        &self,
        _batch: &[LedgerDescriptor],
        _instructions: &str,
    ) -> Result<Vec<String>, ClassifyError> {
        Err(ClassifyError::Unavailable)
    }
}

// ============================================================================
// INSTRUCTIONS
// ============================================================================

/// System instructions listing every category, account group, code and
/// 4-digit sub-range of the table.
pub fn classification_instructions(table: &RangeTable) -> String {
    let mut text = String::from(
        "You are a financial accounting expert. Given the following account groups and categories \
         with their GL code ranges, classify each ledger entry into one of the account group codes \
         listed below. Note that while the categories use 4-digit GL codes, the final posting ledger \
         must use a 6-digit GL code (the 4-digit base expanded with two digits as per the sub-range).\n\n",
    );

    text.push_str("Categories (fixed):\n");
    let mut listed: Vec<&str> = Vec::new();
    for category in CATEGORIES.iter() {
        if table.iter().any(|r| r.category_name == category.name) {
            text.push_str(&format!(
                " - {}: {} to {}\n",
                category.name, category.base_start, category.base_end
            ));
            listed.push(category.name);
        }
    }
    // Categories only known to the loaded reference data: bounds of their groups
    for range in table.iter() {
        if listed.contains(&range.category_name.as_str()) {
            continue;
        }
        let members = table.iter().filter(|r| r.category_name == range.category_name);
        let (low, high) = members.fold((u32::MAX, 0), |(lo, hi), r| {
            (lo.min(r.base_start()), hi.max(r.base_end()))
        });
        text.push_str(&format!(" - {}: {} to {}\n", range.category_name, low, high));
        listed.push(&range.category_name);
    }

    text.push_str("\nAccount Groups:\n");
    for (idx, range) in table.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} (Code: {}) - belongs to {}, Subrange: {} to {}.\n",
            idx + 1,
            range.group_name,
            range.code,
            range.category_name,
            range.base_start(),
            range.base_end()
        ));
    }

    text.push_str(
        "\nFor each ledger entry provided, analyze the fields 'primary_group', 'parent_group', and \
         'ledger_name' and assign it the appropriate account group code from the list above. Return \
         ONLY the account group code (e.g., SHCP, RESV, LTBR, etc.) in a JSON array corresponding to \
         the order of the ledger entries provided. Do not include any additional text or explanation.",
    );

    text
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct LedgerClassifier<B> {
    backend: B,
    instructions: String,
    valid_codes: HashSet<String>,
    fallback: FallbackRules,
    cache: HashMap<CacheKey, String>,
    remote_calls: usize,
}

impl<B: ClassificationBackend> LedgerClassifier<B> {
    pub fn new(backend: B, table: &RangeTable, fallback: FallbackRules) -> Self {
        LedgerClassifier {
            backend,
            instructions: classification_instructions(table),
            valid_codes: table.codes().map(str::to_string).collect(),
            fallback,
            cache: HashMap::new(),
            remote_calls: 0,
        }
    }

    /// Classify a batch of ledgers. The result holds one code per distinct
    /// cache key in `entries`.
    pub fn classify_batch(&mut self, entries: &[LedgerDescriptor]) -> HashMap<CacheKey, String> {
        let mut classifications = HashMap::new();
        let mut unseen: Vec<(CacheKey, &LedgerDescriptor)> = Vec::new();
        let mut pending: HashSet<CacheKey> = HashSet::new();

        for entry in entries {
            let key = entry.cache_key();
            if let Some(code) = self.cache.get(&key) {
                classifications.insert(key, code.clone());
            } else if pending.insert(key.clone()) {
                unseen.push((key, entry));
            }
        }

        if unseen.is_empty() {
            debug!("All {} entries answered from the classification cache", entries.len());
            return classifications;
        }

        let representatives: Vec<LedgerDescriptor> =
            unseen.iter().map(|(_, descriptor)| (*descriptor).clone()).collect();

        let outcome = self.backend.classify_remote(&representatives, &self.instructions);
        if !matches!(outcome, Err(ClassifyError::Unavailable)) {
            self.remote_calls += 1;
        }

        match outcome {
            Ok(codes) => {
                if codes.len() != unseen.len() {
                    warn!(
                        "Classifier returned {} codes for {} entries",
                        codes.len(),
                        unseen.len()
                    );
                }

                for (idx, (key, descriptor)) in unseen.into_iter().enumerate() {
                    let code = match codes.get(idx).map(|c| c.trim()) {
                        Some(code) if self.valid_codes.contains(code) => {
                            self.cache.insert(key.clone(), code.to_string());
                            code.to_string()
                        }
                        Some(code) => {
                            warn!("Invalid category received: {}", code);
                            self.fallback_code(descriptor)
                        }
                        None => {
                            warn!(
                                "No classification returned for {}::{}",
                                key.primary_group, key.parent_group
                            );
                            self.fallback_code(descriptor)
                        }
                    };
                    classifications.insert(key, code);
                }
            }
            Err(ClassifyError::Unavailable) => {
                info!("No classification backend configured, using fallback rules");
                for (key, descriptor) in unseen {
                    classifications.insert(key, self.fallback_code(descriptor));
                }
            }
            Err(err) => {
                error!("Batch classification failed: {}", err);
                for (key, descriptor) in unseen {
                    classifications.insert(key, self.fallback_code(descriptor));
                }
            }
        }

        classifications
    }

    /// Deterministic code for a ledger, ignoring backend and cache
    pub fn fallback_code(&self, descriptor: &LedgerDescriptor) -> String {
        self.fallback.classify(descriptor).to_string()
    }

    pub fn cached(&self, key: &CacheKey) -> Option<&str> {
        self.cache.get(key).map(String::as_str)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of backend calls attempted so far (offline calls excluded)
    pub fn remote_calls(&self) -> usize {
        self.remote_calls
    }

}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Answers every call from `answer` and records what was sent
    struct ScriptedBackend<F> {
        answer: F,
        calls: RefCell<Vec<Vec<LedgerDescriptor>>>,
    }

    impl<F> ScriptedBackend<F>
    where
        F: Fn(&[LedgerDescriptor]) -> Result<Vec<String>, ClassifyError>,
    {
        fn new(answer: F) -> Self {
            ScriptedBackend {
                answer,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl<F> ClassificationBackend for ScriptedBackend<F>
    where
        F: Fn(&[LedgerDescriptor]) -> Result<Vec<String>, ClassifyError>,
    {
        fn classify_remote(
            &self,
            batch: &[LedgerDescriptor],
            _instructions: &str,
        ) -> Result<Vec<String>, ClassifyError> {
            self.calls.borrow_mut().push(batch.to_vec());
            (self.answer)(batch)
        }
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    fn table() -> RangeTable {
        RangeTable::builtin().unwrap()
    }

    #[test]
    fn test_shared_group_pair_sent_once() {
        let backend = ScriptedBackend::new(|batch: &[LedgerDescriptor]| Ok(vec!["REVO".to_string(); batch.len()]));
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        let entries = vec![
            LedgerDescriptor::new("Sales Accounts", "Direct Income", "Sales-Domestic"),
            LedgerDescriptor::new("Sales Accounts", "Direct Income", "Sales-Export"),
        ];
        let result = classifier.classify_batch(&entries);

        assert_eq!(result.len(), 1);
        assert_eq!(result[&entries[0].cache_key()], "REVO");
        assert_eq!(result[&entries[1].cache_key()], "REVO");

        let calls = backend.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 1, "one representative per group pair");
        assert_eq!(calls[0][0].ledger_name, "Sales-Domestic");
    }

    #[test]
    fn test_cached_keys_skip_remote_call() {
        let backend = ScriptedBackend::new(|batch: &[LedgerDescriptor]| Ok(vec!["CASH".to_string(); batch.len()]));
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        let entries = vec![LedgerDescriptor::new("Bank Accounts", "Current Assets", "HDFC")];
        classifier.classify_batch(&entries);

        let again = vec![LedgerDescriptor::new("Bank Accounts", "Current Assets", "ICICI")];
        let result = classifier.classify_batch(&again);

        assert_eq!(result[&again[0].cache_key()], "CASH");
        assert_eq!(backend.calls.borrow().len(), 1);
        assert_eq!(classifier.remote_calls(), 1);
        assert_eq!(classifier.cached(&again[0].cache_key()), Some("CASH"));
    }

    #[test]
    fn test_only_unseen_keys_are_sent() {
        let backend = ScriptedBackend::new(|batch: &[LedgerDescriptor]| {
            Ok(batch
                .iter()
                .map(|d| (if d.primary_group.contains("Sales") { "REVO" } else { "PURC" }).to_string())
                .collect())
        });
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        classifier.classify_batch(&[LedgerDescriptor::new("Sales Accounts", "Direct Income", "A")]);
        let result = classifier.classify_batch(&[
            LedgerDescriptor::new("Sales Accounts", "Direct Income", "B"),
            LedgerDescriptor::new("Purchase Accounts", "Direct Expenses", "C"),
        ]);

        assert_eq!(result.len(), 2);
        let calls = backend.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].len(), 1);
        assert_eq!(calls[1][0].primary_group, "Purchase Accounts");
    }

    #[test]
    fn test_invalid_code_uses_fallback_per_entry() {
        let backend = ScriptedBackend::new(|_: &[LedgerDescriptor]| Ok(codes(&["REVO", "BOGUS"])));
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        let entries = vec![
            LedgerDescriptor::new("Sales Accounts", "Direct Income", "Sales"),
            LedgerDescriptor::new("Salary Payable", "Current Liabilities", "Salaries"),
        ];
        let result = classifier.classify_batch(&entries);

        assert_eq!(result[&entries[0].cache_key()], "REVO");
        assert_eq!(result[&entries[1].cache_key()], "EMPB");
        // Fallback answers are not cached, valid ones are
        assert_eq!(classifier.cache_len(), 1);
        assert_eq!(classifier.cached(&entries[1].cache_key()), None);
    }

    #[test]
    fn test_transport_failure_falls_back_for_whole_batch() {
        let backend = ScriptedBackend::new(|_: &[LedgerDescriptor]| Err(ClassifyError::Transport("connection refused".to_string())));
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        let entries = vec![
            LedgerDescriptor::new("Cash in hand", "Current Assets", "Petty Cash"),
            LedgerDescriptor::new("Fixed Assets - Plant", "Fixed Assets", "Lathe"),
            LedgerDescriptor::new("Duties & Taxes", "Current Liabilities", "GST"),
        ];
        let result = classifier.classify_batch(&entries);

        assert_eq!(result[&entries[0].cache_key()], "CASH");
        assert_eq!(result[&entries[1].cache_key()], "PPEA");
        assert_eq!(result[&entries[2].cache_key()], "CASH");
        assert_eq!(classifier.cache_len(), 0);
        // A failed call still counts as attempted
        assert_eq!(classifier.remote_calls(), 1);
    }

    #[test]
    fn test_malformed_response_falls_back() {
        let backend = ScriptedBackend::new(|_: &[LedgerDescriptor]| Err(ClassifyError::MalformedResponse("not json".to_string())));
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        let entries = vec![LedgerDescriptor::new("Capital Account", "Primary", "Partner A")];
        let result = classifier.classify_batch(&entries);

        assert_eq!(result[&entries[0].cache_key()], "SHCP");
    }

    #[test]
    fn test_short_response_falls_back_for_missing_entries() {
        let backend = ScriptedBackend::new(|_: &[LedgerDescriptor]| Ok(codes(&["OTHI"])));
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        let entries = vec![
            LedgerDescriptor::new("Indirect Incomes", "Primary", "Interest"),
            LedgerDescriptor::new("Purchase Accounts", "Primary", "Raw Material"),
        ];
        let result = classifier.classify_batch(&entries);

        assert_eq!(result[&entries[0].cache_key()], "OTHI");
        assert_eq!(result[&entries[1].cache_key()], "PURC");
    }

    #[test]
    fn test_offline_backend_uses_fallback() {
        let mut classifier = LedgerClassifier::new(OfflineBackend, &table(), FallbackRules::standard());

        let entries = vec![LedgerDescriptor::new("Sales Accounts", "Direct Income", "Sales-Domestic")];
        let result = classifier.classify_batch(&entries);

        assert_eq!(result[&entries[0].cache_key()], "REVO");
        assert_eq!(classifier.remote_calls(), 0);
    }

    #[test]
    fn test_codes_are_trimmed() {
        let backend = ScriptedBackend::new(|_: &[LedgerDescriptor]| Ok(codes(&[" TRPY-C "])));
        let mut classifier = LedgerClassifier::new(&backend, &table(), FallbackRules::standard());

        let entries = vec![LedgerDescriptor::new("Sundry Creditors", "Current Liabilities", "Vendor")];
        let result = classifier.classify_batch(&entries);

        assert_eq!(result[&entries[0].cache_key()], "TRPY-C");
    }

    #[test]
    fn test_instructions_list_every_group() {
        let table = table();
        let text = classification_instructions(&table);

        for range in table.iter() {
            assert!(text.contains(&format!("(Code: {})", range.code)), "missing {}", range.code);
        }
        assert!(text.contains(" - Owners Equity: 1000 to 1999"));
        assert!(text.contains("25. Revenue from operations (Code: REVO) - belongs to Income, Subrange: 6000 to 6799."));
        assert!(text.contains("JSON array"));
    }

    #[test]
    fn test_instructions_for_custom_category() {
        let table = RangeTable::from_ranges(vec![
            crate::entities::AccountGroupRange::from_base("SHCP", "Share capital", "Owners Equity", 1000, 1099),
            crate::entities::AccountGroupRange::from_base("MISC", "Misc A", "Suspense", 9100, 9199),
            crate::entities::AccountGroupRange::from_base("MISD", "Misc B", "Suspense", 9200, 9299),
        ])
        .unwrap();
        let text = classification_instructions(&table);

        assert!(text.contains(" - Owners Equity: 1000 to 1999"));
        assert!(text.contains(" - Suspense: 9100 to 9299"));
        assert_eq!(text.matches(" - Suspense:").count(), 1);
        assert!(!text.contains("Income:"));
    }
}
