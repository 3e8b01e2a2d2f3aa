// 🔢 GL Code Allocator - one monotonic counter per account group
//
// Seeded once per run from the highest code ever issued in each block, then
// handed out in strictly increasing, gap-free order. A counter that has run
// past its block's end refuses to issue and stays where it is.

use std::collections::HashMap;

use log::debug;

use crate::error::{GlCodeError, Result};
use crate::ranges::RangeTable;
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GroupCounter {
    next: u32,
    range_end: u32,
}

#[derive(Debug, Clone, Default)]
pub struct GlCodeAllocator {
    counters: HashMap<String, GroupCounter>,
}

impl GlCodeAllocator {
    /// Counters positioned right after the highest code already issued in each
    /// group, or at the group's first code when none has been.
    pub fn seed<S: LedgerStore + ?Sized>(table: &RangeTable, store: &S) -> Result<Self> {
        let mut counters = HashMap::with_capacity(table.len());

        for range in table.iter() {
            let next = match store.max_assigned_code(&range.code, range.range_start, range.range_end)? {
                Some(max) => max + 1,
                None => range.range_start,
            };
            debug!("Counter {} starts at {:06}", range.code, next);
            counters.insert(
                range.code.clone(),
                GroupCounter {
                    next,
                    range_end: range.range_end,
                },
            );
        }

        Ok(GlCodeAllocator { counters })
    }

    /// Counters at the start of every block, ignoring anything stored
    pub fn fresh(table: &RangeTable) -> Self {
        let counters = table
            .iter()
            .map(|range| {
                (
                    range.code.clone(),
                    GroupCounter {
                        next: range.range_start,
                        range_end: range.range_end,
                    },
                )
            })
            .collect();

        GlCodeAllocator { counters }
    }

    /// Issue the next code of a group as a zero-padded 6-digit string
    pub fn next_code(&mut self, group_code: &str) -> Result<String> {
        let counter = self
            .counters
            .get_mut(group_code)
            .ok_or_else(|| GlCodeError::UnknownGroup(group_code.to_string()))?;

        if counter.next > counter.range_end {
            return Err(GlCodeError::RangeExhausted {
                code: group_code.to_string(),
                range_end: counter.range_end,
            });
        }

        let issued = counter.next;
        counter.next += 1;
        Ok(format!("{:06}", issued))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AccountGroupRange, CodeIssue, IssueReason};
    use crate::store::SqliteStore;

    fn tiny_table() -> RangeTable {
        let mut tiny = AccountGroupRange::from_base("TINY", "Tiny", "Test", 9000, 9000);
        tiny.range_end = tiny.range_start + 2;
        RangeTable::from_ranges(vec![
            tiny,
            AccountGroupRange::from_base("REVO", "Revenue from operations", "Income", 6000, 6799),
        ])
        .unwrap()
    }

    #[test]
    fn test_codes_are_sequential_and_padded() {
        let table = RangeTable::builtin().unwrap();
        let mut allocator = GlCodeAllocator::fresh(&table);

        assert_eq!(allocator.next_code("SHCP").unwrap(), "100001");
        assert_eq!(allocator.next_code("SHCP").unwrap(), "100002");
        assert_eq!(allocator.next_code("REVO").unwrap(), "600001");
        assert_eq!(allocator.next_code("SHCP").unwrap(), "100003");
    }

    #[test]
    fn test_exhausted_group_does_not_advance() {
        let mut allocator = GlCodeAllocator::fresh(&tiny_table());

        assert_eq!(allocator.next_code("TINY").unwrap(), "900001");
        assert_eq!(allocator.next_code("TINY").unwrap(), "900002");
        assert_eq!(allocator.next_code("TINY").unwrap(), "900003");

        for _ in 0..2 {
            match allocator.next_code("TINY") {
                Err(GlCodeError::RangeExhausted { code, range_end }) => {
                    assert_eq!(code, "TINY");
                    assert_eq!(range_end, 900003);
                }
                other => panic!("expected exhaustion, got {:?}", other),
            }
        }

        // Other groups keep working
        assert_eq!(allocator.next_code("REVO").unwrap(), "600001");
    }

    #[test]
    fn test_unknown_group() {
        let mut allocator = GlCodeAllocator::fresh(&tiny_table());

        assert!(matches!(
            allocator.next_code("NOPE"),
            Err(GlCodeError::UnknownGroup(code)) if code == "NOPE"
        ));
    }

    #[test]
    fn test_seed_continues_after_stored_codes() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.setup().unwrap();
        store
            .record_issue(&CodeIssue::new("600041", 1, "REVO", IssueReason::Initial, "earlier-run"))
            .unwrap();

        let table = RangeTable::builtin().unwrap();
        let mut allocator = GlCodeAllocator::seed(&table, &store).unwrap();

        assert_eq!(allocator.next_code("REVO").unwrap(), "600042");
        assert_eq!(allocator.next_code("OTHI").unwrap(), "680001");
    }

    #[test]
    fn test_seed_on_full_block_is_exhausted() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.setup().unwrap();
        store
            .record_issue(&CodeIssue::new("900003", 1, "TINY", IssueReason::Initial, "earlier-run"))
            .unwrap();

        let mut allocator = GlCodeAllocator::seed(&tiny_table(), &store).unwrap();

        assert!(matches!(
            allocator.next_code("TINY"),
            Err(GlCodeError::RangeExhausted { .. })
        ));
    }
}
