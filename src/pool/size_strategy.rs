//! The pool's size-indexed lookup strategy (spec §4.6's `SizeStrategy`).
//!
//! Retrieval is exact-key match; eviction is least-recently-inserted across
//! all keys. A per-type sorted ledger of `size -> count` is maintained
//! alongside the grouped map so that a future best-fit lookup could be added
//! without changing the put/get/remove contract — today nothing reads it
//! except [`SizeStrategy::sizes`], kept for testability (spec §9's resolved
//! Open Question on the ledger's purpose).

use std::collections::BTreeMap;

use super::grouped_linked_map::GroupedLinkedMap;
use super::TypeTag;

/// The pool's lookup key: a type tag plus a requested size. Two values are
/// interchangeable from the pool's perspective iff both fields are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SizeKey {
    pub(crate) type_tag: TypeTag,
    pub(crate) size: u64,
}

pub(crate) struct SizeStrategy<V> {
    map: GroupedLinkedMap<SizeKey, V>,
    ledgers: std::collections::HashMap<TypeTag, BTreeMap<u64, usize>>,
}

impl<V> SizeStrategy<V> {
    pub(crate) fn new() -> Self {
        Self {
            map: GroupedLinkedMap::new(),
            ledgers: std::collections::HashMap::new(),
        }
    }

    pub(crate) fn put(&mut self, key: SizeKey, value: V) {
        self.map.put(key, value);
        *self
            .ledgers
            .entry(key.type_tag)
            .or_default()
            .entry(key.size)
            .or_insert(0) += 1;
    }

    pub(crate) fn get(&mut self, key: SizeKey) -> Option<V> {
        let value = self.map.get(&key)?;
        self.decrement_ledger(key);
        Some(value)
    }

    pub(crate) fn remove_last(&mut self) -> Option<V> {
        let (key, value) = self.map.remove_last()?;
        self.decrement_ledger(key);
        Some(value)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Read-only view of the sizes currently pooled for `type_tag`, smallest
    /// first. Exposed so the ledger invariant (kept consistent on every
    /// put/get/remove) is externally testable.
    pub(crate) fn sizes(&self, type_tag: TypeTag) -> impl Iterator<Item = u64> + '_ {
        self.ledgers
            .get(&type_tag)
            .into_iter()
            .flat_map(|ledger| ledger.keys().copied())
    }

    fn decrement_ledger(&mut self, key: SizeKey) {
        let ledger = self
            .ledgers
            .get_mut(&key.type_tag)
            .expect("ledger entry must exist for a key we just retrieved a value for");
        let count = ledger
            .get_mut(&key.size)
            .expect("ledger count must exist for a key we just retrieved a value for");
        assert!(*count > 0, "decrementing a zero ledger count is a programming error");
        *count -= 1;
        if *count == 0 {
            ledger.remove(&key.size);
        }
    }
}
