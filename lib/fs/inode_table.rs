//! Bidirectional inode number to path mapping.
//!
//! The kernel addresses objects by inode number while the handlers take paths. [`InodeTable`]
//! keeps both directions in two [`scc::HashMap`]s. Mutations touching both maps are serialized by
//! a coordination lock, which also guards the kernel lookup counts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;

use super::{InodeAddr, ROOT, is_within};

/// Inode number of the mount root.
pub const ROOT_INO: InodeAddr = 1;

/// Concurrent inode number to path table.
pub struct InodeTable {
    /// ino -> path
    paths: scc::HashMap<InodeAddr, Arc<str>>,
    /// path -> ino
    inos: scc::HashMap<Arc<str>, InodeAddr>,
    /// Kernel lookup counts. Also serializes mutations that touch both maps.
    lookups: Mutex<FxHashMap<InodeAddr, u64>>,
    next: AtomicU64,
}

impl InodeTable {
    /// Creates a table holding only the root.
    #[must_use]
    pub fn new() -> Self {
        let root: Arc<str> = Arc::from(ROOT);
        let paths = scc::HashMap::new();
        let inos = scc::HashMap::new();
        let _ = paths.insert_sync(ROOT_INO, Arc::clone(&root));
        let _ = inos.insert_sync(root, ROOT_INO);
        Self {
            paths,
            inos,
            lookups: Mutex::new(FxHashMap::default()),
            next: AtomicU64::new(ROOT_INO + 1),
        }
    }

    fn guard(&self) -> MutexGuard<'_, FxHashMap<InodeAddr, u64>> {
        self.lookups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves an inode number.
    #[must_use]
    pub fn path(&self, ino: InodeAddr) -> Option<Arc<str>> {
        self.paths.read_sync(&ino, |_, path| Arc::clone(path))
    }

    /// Resolves a path.
    #[must_use]
    pub fn ino(&self, path: &str) -> Option<InodeAddr> {
        self.inos.read_sync(path, |_, &ino| ino)
    }

    /// Returns the inode number of `path`, allocating one if needed, without counting a lookup.
    pub fn ino_or_insert(&self, path: &str) -> InodeAddr {
        let _guard = self.guard();
        self.ino_or_insert_locked(path)
    }

    fn ino_or_insert_locked(&self, path: &str) -> InodeAddr {
        match self.inos.entry_sync(Arc::from(path)) {
            scc::hash_map::Entry::Occupied(occ) => *occ.get(),
            scc::hash_map::Entry::Vacant(vac) => {
                let ino = self.next.fetch_add(1, Ordering::Relaxed);
                let path = Arc::clone(vac.key());
                vac.insert_entry(ino);
                let _ = self.paths.insert_sync(ino, path);
                ino
            }
        }
    }

    /// Records one kernel lookup of `path` and returns its inode number.
    pub fn lookup(&self, path: &str) -> InodeAddr {
        let mut lookups = self.guard();
        let ino = self.ino_or_insert_locked(path);
        *lookups.entry(ino).or_insert(0) += 1;
        ino
    }

    /// Drops `count` kernel lookups of `ino`. The mapping goes away when none remain.
    ///
    /// The root is never forgotten.
    pub fn forget(&self, ino: InodeAddr, count: u64) {
        if ino == ROOT_INO {
            return;
        }
        let mut lookups = self.guard();
        let Some(remaining) = lookups.get_mut(&ino) else {
            return;
        };
        *remaining = remaining.saturating_sub(count);
        if *remaining == 0 {
            lookups.remove(&ino);
            if let Some((_, path)) = self.paths.remove_sync(&ino) {
                self.inos.remove_sync(&path);
            }
        }
    }

    /// Re-keys `from` and everything below it to live under `to`.
    ///
    /// Whatever was mapped at `to` before is unmapped.
    pub fn rename(&self, from: &str, to: &str) {
        let _guard = self.guard();
        self.unmap_tree_locked(to);

        let mut moved = Vec::new();
        self.inos.retain_sync(|path, &mut ino| {
            if is_within(path, from) {
                moved.push((ino, format!("{to}{}", &path[from.len()..])));
                false
            } else {
                true
            }
        });
        for (ino, path) in moved {
            let path: Arc<str> = Arc::from(path);
            let _ = self.paths.upsert_sync(ino, Arc::clone(&path));
            let _ = self.inos.insert_sync(path, ino);
        }
    }

    /// Unmaps `path` and everything below it.
    pub fn remove(&self, path: &str) {
        let _guard = self.guard();
        self.unmap_tree_locked(path);
    }

    fn unmap_tree_locked(&self, root: &str) {
        if root == ROOT {
            return;
        }
        let mut gone = Vec::new();
        self.inos.retain_sync(|path, &mut ino| {
            let keep = !is_within(path, root);
            if !keep {
                gone.push(ino);
            }
            keep
        });
        for ino in gone {
            self.paths.remove_sync(&ino);
        }
    }

    /// Number of mapped inodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Never true: the root is always mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
