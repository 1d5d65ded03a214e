use crate::storage::encoded_key::EncodedKey;
use parking_lot::Mutex;
use std::collections::HashSet;

pub(crate) type ItemLockKey = (String, EncodedKey);

/// Write locks on individual items. Acquisition never waits: a writer that finds
/// an item held by another writer is told which items conflicted and must abort.
#[derive(Default)]
pub(crate) struct ItemLockManager {
    held: Mutex<HashSet<ItemLockKey>>,
}

impl ItemLockManager {
    /// Takes every lock in `keys` or none of them. On failure returns the keys
    /// that are currently held elsewhere.
    pub(crate) fn try_acquire_all(
        &self,
        keys: Vec<ItemLockKey>,
    ) -> Result<ItemLockGuard<'_>, HashSet<ItemLockKey>> {
        let mut held = self.held.lock();
        let conflicts: HashSet<ItemLockKey> =
            keys.iter().filter(|k| held.contains(*k)).cloned().collect();
        if !conflicts.is_empty() {
            return Err(conflicts);
        }
        for key in &keys {
            held.insert(key.clone());
        }
        Ok(ItemLockGuard {
            manager: self,
            keys,
        })
    }

    #[cfg(test)]
    fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// Releases its item locks on drop.
pub struct ItemLockGuard<'a> {
    manager: &'a ItemLockManager,
    keys: Vec<ItemLockKey>,
}

impl Drop for ItemLockGuard<'_> {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let mut held = self.manager.held.lock();
        for key in &self.keys {
            held.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ItemLockManager;
    use crate::storage::encoded_key::EncodedKey;
    use crate::storage::types::AttributeValue;

    fn key(table: &str, k: &str) -> (String, EncodedKey) {
        (
            table.to_string(),
            EncodedKey::from_value(&AttributeValue::from(k)),
        )
    }

    #[test]
    fn overlapping_acquire_reports_only_contended_keys() {
        let manager = ItemLockManager::default();
        let guard = manager
            .try_acquire_all(vec![key("t", "a"), key("t", "b")])
            .expect("first writer");

        let conflicts = match manager.try_acquire_all(vec![key("t", "b"), key("t", "c")]) {
            Ok(_) => panic!("second writer should conflict"),
            Err(conflicts) => conflicts,
        };
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts.contains(&key("t", "b")));
        // all-or-nothing: "c" was not taken by the failed attempt
        assert_eq!(manager.held_count(), 2);

        drop(guard);
        assert_eq!(manager.held_count(), 0);
        let _again = manager
            .try_acquire_all(vec![key("t", "b"), key("t", "c")])
            .expect("released");
    }

    #[test]
    fn same_key_in_other_table_does_not_conflict() {
        let manager = ItemLockManager::default();
        let _a = manager.try_acquire_all(vec![key("t1", "a")]).expect("t1");
        assert!(manager.try_acquire_all(vec![key("t2", "a")]).is_ok());
    }
}
