//! Shared, copy-on-write weight table.

use dispatch_core::WeightTable;
use parking_lot::RwLock;
use std::sync::Arc;

/// Holds the current [`WeightTable`].
///
/// Readers take a cheap `Arc` snapshot that stays consistent for the whole
/// request; writers clone, mutate and swap.
#[derive(Debug, Default)]
pub struct WeightStore {
    current: RwLock<Arc<WeightTable>>,
}

impl WeightStore {
    /// Creates a store seeded with `table`.
    pub fn new(table: WeightTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// Current table.
    pub fn snapshot(&self) -> Arc<WeightTable> {
        Arc::clone(&self.current.read())
    }

    /// Applies `update` to a copy of the table and publishes it.
    pub fn update<R>(&self, update: impl FnOnce(&mut WeightTable) -> R) -> R {
        let mut guard = self.current.write();
        let mut table = WeightTable::clone(&guard);
        let result = update(&mut table);
        *guard = Arc::new(table);
        result
    }

    /// Replaces the table wholesale.
    pub fn replace(&self, table: WeightTable) {
        *self.current.write() = Arc::new(table);
    }

    /// Revision of the current table.
    pub fn revision(&self) -> u64 {
        self.current.read().revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshots_are_stable_across_updates() {
        let store = WeightStore::default();
        let before = store.snapshot();
        let updated = store.update(|table| table.nudge("handler:a", 0.5));

        assert!((updated - 1.5).abs() < f64::EPSILON);
        assert!((before.multiplier("handler:a") - 1.0).abs() < f64::EPSILON);
        assert!((store.snapshot().multiplier("handler:a") - 1.5).abs() < f64::EPSILON);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_replace() {
        let store = WeightStore::default();
        let mut table = WeightTable::default();
        table.nudge("complexity:refactor", -0.2);
        store.replace(table.clone());
        assert_eq!(*store.snapshot(), table);
    }
}
