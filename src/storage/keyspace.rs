use crate::storage::encoded_key::EncodedKey;
use crate::storage::types::{AttributeValue, Item};
use im::{HashMap, OrdMap};
use std::ops::Bound;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableData {
    pub key_attribute: String,
    pub rows: OrdMap<EncodedKey, Item>,
}

impl TableData {
    pub fn new(key_attribute: impl Into<String>) -> Self {
        Self {
            key_attribute: key_attribute.into(),
            rows: OrdMap::new(),
        }
    }
}

/// All tables of a store. Cloning is O(1) thanks to structural sharing, so a
/// clone doubles as a point-in-time snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyspace {
    tables: HashMap<String, TableData>,
    commit_seq: u64,
}

impl Keyspace {
    pub fn create_table(&mut self, name: impl Into<String>, key_attribute: impl Into<String>) {
        self.tables
            .entry(name.into())
            .or_insert_with(|| TableData::new(key_attribute));
    }

    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn key_attribute(&self, name: &str) -> Option<&str> {
        self.tables.get(name).map(|t| t.key_attribute.as_str())
    }

    pub fn commit_seq(&self) -> u64 {
        self.commit_seq
    }

    pub fn advance_seq(&mut self) -> u64 {
        self.commit_seq += 1;
        self.commit_seq
    }

    pub fn get_item(&self, table: &str, key: &AttributeValue) -> Option<&Item> {
        self.tables
            .get(table)
            .and_then(|t| t.rows.get(&EncodedKey::from_value(key)))
    }

    pub fn put_item(&mut self, table: &str, key: &AttributeValue, item: Item) {
        if let Some(t) = self.tables.get_mut(table) {
            t.rows.insert(EncodedKey::from_value(key), item);
        }
    }

    pub fn delete_item(&mut self, table: &str, key: &AttributeValue) -> Option<Item> {
        self.tables
            .get_mut(table)
            .and_then(|t| t.rows.remove(&EncodedKey::from_value(key)))
    }

    /// Returns up to `limit` items strictly after `exclusive_start` in key order,
    /// plus whether any rows remain past the returned ones.
    pub fn scan(
        &self,
        table: &str,
        exclusive_start: Option<&AttributeValue>,
        limit: usize,
    ) -> (Vec<Item>, bool) {
        let Some(t) = self.tables.get(table) else {
            return (Vec::new(), false);
        };
        let lower = match exclusive_start {
            Some(key) => Bound::Excluded(EncodedKey::from_value(key)),
            None => Bound::Unbounded,
        };
        let mut range = t.rows.range((lower, Bound::Unbounded));
        let items: Vec<Item> = range.by_ref().take(limit).map(|(_, v)| v.clone()).collect();
        let more = range.next().is_some();
        (items, more)
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::Keyspace;
    use crate::storage::types::{AttributeValue, Item};

    fn keyspace_with_rows(n: i64) -> Keyspace {
        let mut ks = Keyspace::default();
        ks.create_table("t", "k");
        for i in 0..n {
            let key = AttributeValue::N(i);
            ks.put_item("t", &key, Item::new().with("k", i));
        }
        ks
    }

    #[test]
    fn scan_is_exclusive_of_start_key() {
        let ks = keyspace_with_rows(5);
        let (items, more) = ks.scan("t", Some(&AttributeValue::N(1)), 2);
        let keys: Vec<i64> = items.iter().filter_map(|i| i.get_i64("k")).collect();
        assert_eq!(keys, vec![2, 3]);
        assert!(more);

        let (items, more) = ks.scan("t", Some(&AttributeValue::N(3)), 10);
        assert_eq!(items.len(), 1);
        assert!(!more);
    }

    #[test]
    fn clones_are_isolated_snapshots() {
        let mut ks = keyspace_with_rows(2);
        let snapshot = ks.clone();
        ks.delete_item("t", &AttributeValue::N(0));
        assert_eq!(ks.len("t"), 1);
        assert_eq!(snapshot.len("t"), 2);
    }

    #[test]
    fn writes_to_unknown_tables_are_ignored() {
        let mut ks = Keyspace::default();
        ks.put_item("missing", &AttributeValue::N(1), Item::new());
        assert!(!ks.has_table("missing"));
        assert_eq!(ks.len("missing"), 0);
    }
}
