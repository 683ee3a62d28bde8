use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Ordered interner over `(payload, type tag)` pairs. The first insertion
/// of a pair assigns the next dense id; later insertions return the same
/// id. Lookup is O(log n), iteration yields first-seen order. Payloads are
/// either strings (property keys) or 64-bit integers.
pub struct Pool<K> {
    ids: BTreeMap<(K, i32), usize>,
    order: Vec<(K, i32)>,
}

impl<K: Ord + Clone> Pool<K> {
    pub fn new() -> Self {
        Self {
            ids: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    pub fn intern(&mut self, payload: K, tag: i32) -> usize {
        match self.ids.entry((payload, tag)) {
            Entry::Occupied(e) => *e.get(),
            Entry::Vacant(e) => {
                let n = self.order.len();
                self.order.push(e.key().clone());
                e.insert(n);
                n
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, i32)> {
        self.order.iter().map(|(payload, tag)| (payload, *tag))
    }
}

impl<K: Ord + Clone> Default for Pool<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut pool = Pool::new();
        assert_eq!(pool.intern("name".to_string(), 1), 0);
        assert_eq!(pool.intern("rank".to_string(), 2), 1);
        assert_eq!(pool.intern("name".to_string(), 1), 0);
        assert_eq!(pool.intern("ok".to_string(), 7), 2);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn same_payload_different_tag_is_distinct() {
        let mut pool = Pool::new();
        let a = pool.intern("5".to_string(), 1);
        let b = pool.intern("5".to_string(), 2);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn iteration_is_insertion_order() {
        let mut pool = Pool::new();
        for payload in ["zebra", "apple", "mango"] {
            pool.intern(payload.to_string(), 1);
        }
        let seen: Vec<&str> = pool.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(seen, ["zebra", "apple", "mango"]);
    }

    #[test]
    fn integer_payloads() {
        let mut pool = Pool::new();
        assert_eq!(pool.intern(-40i64, 2), 0);
        assert_eq!(pool.intern(i64::MAX, 2), 1);
        assert_eq!(pool.intern(-40i64, 2), 0);
        let seen: Vec<i64> = pool.iter().map(|(p, _)| *p).collect();
        assert_eq!(seen, [-40, i64::MAX]);
    }
}
