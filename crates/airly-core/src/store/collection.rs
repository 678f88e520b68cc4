// ── Reactive keyed collection ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

/// A concurrent, reactive collection keyed by string id.
///
/// Every mutation rebuilds the snapshot that subscribers receive. The
/// snapshot is ordered by key so consumers see a stable listing.
pub(crate) struct Collection<T: Clone + Send + Sync + 'static> {
    by_key: DashMap<String, Arc<T>>,
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Collection<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.rebuild_snapshot();
        is_new
    }

    /// Clone-modify-replace one entry. Returns the new value, or `None`
    /// when the key is absent.
    pub(crate) fn modify(&self, key: &str, f: impl FnOnce(&mut T)) -> Option<Arc<T>> {
        let updated = {
            let mut entry = self.by_key.get_mut(key)?;
            let mut value = T::clone(entry.value());
            f(&mut value);
            let value = Arc::new(value);
            *entry.value_mut() = Arc::clone(&value);
            value
        };
        self.rebuild_snapshot();
        Some(updated)
    }

    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// All current keys, sorted.
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.by_key.iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys
    }

    fn rebuild_snapshot(&self) {
        let mut entries: Vec<(String, Arc<T>)> = self
            .by_key
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let values = entries.into_iter().map(|(_, v)| v).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_reports_new_keys() {
        let col: Collection<String> = Collection::new();
        assert!(col.upsert("a".into(), "x".into()));
        assert!(!col.upsert("a".into(), "y".into()));
        assert_eq!(*col.get("a").unwrap(), "y");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn modify_missing_key_is_none() {
        let col: Collection<String> = Collection::new();
        assert!(col.modify("nope", |s| s.push('!')).is_none());
    }

    #[test]
    fn modify_replaces_and_publishes() {
        let col: Collection<String> = Collection::new();
        col.upsert("a".into(), "x".into());
        let rx = col.subscribe();

        let updated = col.modify("a", |s| s.push('!')).unwrap();
        assert_eq!(*updated, "x!");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow()[0], "x!");
    }

    #[test]
    fn snapshot_is_ordered_by_key() {
        let col: Collection<u32> = Collection::new();
        col.upsert("c".into(), 3);
        col.upsert("a".into(), 1);
        col.upsert("b".into(), 2);

        let values: Vec<u32> = col.snapshot().iter().map(|v| **v).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(col.keys(), vec!["a", "b", "c"]);
    }
}
