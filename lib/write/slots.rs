//! Per-path exclusive state for the write strategies.
//!
//! A concurrent registry maps each path to an async mutex over that path's state. Holding the
//! mutex makes one merge/split/commit cycle atomic for the path, while other paths proceed in
//! parallel.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-path state guarded by async mutexes.
pub(crate) struct PathSlots<T> {
    slots: scc::HashMap<Arc<str>, Arc<Mutex<T>>>,
}

impl<T: Default + Send + 'static> PathSlots<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: scc::HashMap::new(),
        }
    }

    /// Locks the state for `path`, creating an empty one if needed.
    pub(crate) async fn lock(&self, path: &str) -> (Arc<str>, OwnedMutexGuard<T>) {
        let (key, slot) = match self.slots.entry_sync(Arc::from(path)) {
            scc::hash_map::Entry::Occupied(occ) => (Arc::clone(occ.key()), Arc::clone(occ.get())),
            scc::hash_map::Entry::Vacant(vac) => {
                let key = Arc::clone(vac.key());
                let slot = Arc::new(Mutex::new(T::default()));
                vac.insert_entry(Arc::clone(&slot));
                (key, slot)
            }
        };
        (key, slot.lock_owned().await)
    }

    /// Locks the state for `path` only if it already exists.
    pub(crate) async fn lock_existing(&self, path: &str) -> Option<OwnedMutexGuard<T>> {
        let slot = self.slots.read_sync(path, |_, slot| Arc::clone(slot))?;
        Some(slot.lock_owned().await)
    }

    /// Every path that currently has a slot.
    pub(crate) fn paths(&self) -> Vec<Arc<str>> {
        let mut paths = Vec::new();
        self.slots.iter_sync(|path, _| {
            paths.push(Arc::clone(path));
            true
        });
        paths
    }

    /// Drops the slot for `path` if nobody else references it and `is_idle` holds.
    ///
    /// Callers must release their own guard first.
    pub(crate) fn release(&self, path: &str, is_idle: impl FnOnce(&T) -> bool) {
        drop(self.slots.remove_if_sync(path, |slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|state| is_idle(&state))
        }));
    }

    /// Whether any slot exists for `path`.
    #[cfg(test)]
    pub(crate) fn contains(&self, path: &str) -> bool {
        self.slots.contains_sync(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_slot_is_released() {
        let slots: PathSlots<Vec<u8>> = PathSlots::new();
        {
            let (_, mut state) = slots.lock("/a").await;
            state.push(1);
        }
        slots.release("/a", Vec::is_empty);
        assert!(slots.contains("/a"));

        {
            let (_, mut state) = slots.lock("/a").await;
            state.clear();
        }
        slots.release("/a", Vec::is_empty);
        assert!(!slots.contains("/a"));
    }

    #[tokio::test]
    async fn held_slot_is_kept() {
        let slots: PathSlots<Vec<u8>> = PathSlots::new();
        let (_, guard) = slots.lock("/a").await;
        slots.release("/a", Vec::is_empty);
        assert!(slots.contains("/a"));
        drop(guard);
    }
}
