use std::sync::Arc;

/// Callbacks in registration order, each keyed by the id handed back to its subscriber.
pub(crate) struct SubscriberList<T: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Arc<T>)>,
}

impl<T: ?Sized> SubscriberList<T> {
    pub(crate) fn new() -> Self {
        Self { next_id: 0, entries: Vec::new() }
    }

    pub(crate) fn insert(&mut self, callback: Arc<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Cloned handles, so callbacks run without the list locked.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_only_drops_the_matching_entry() {
        let mut list: SubscriberList<dyn Fn() -> u8 + Send + Sync> = SubscriberList::new();
        let a = list.insert(Arc::new(|| 1u8));
        let b = list.insert(Arc::new(|| 2u8));
        let _c = list.insert(Arc::new(|| 3u8));

        assert!(list.remove(b));
        assert!(!list.remove(b));
        let order: Vec<u8> = list.snapshot().iter().map(|cb| cb()).collect();
        assert_eq!(order, vec![1, 3]);

        assert!(list.remove(a));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn identical_callbacks_register_twice() {
        let mut list: SubscriberList<dyn Fn() -> u8 + Send + Sync> = SubscriberList::new();
        let cb: Arc<dyn Fn() -> u8 + Send + Sync> = Arc::new(|| 9u8);
        let first = list.insert(Arc::clone(&cb));
        let second = list.insert(cb);
        assert_ne!(first, second);
        assert_eq!(list.len(), 2);
    }
}
