//! First-access timestamps.
//!
//! The store does not keep creation or modification times the way a local filesystem does, so
//! the first moment a path is observed stands in for both.

use std::time::SystemTime;

use moka::sync::Cache;
use tracing::trace;

use crate::fs::is_within;

/// Remembers when each path was first seen.
///
/// Unbounded by default. With a capacity, rarely used paths are evicted and get a fresh
/// timestamp when seen again.
#[derive(Clone)]
pub struct AttributeCache {
    seen: Cache<String, SystemTime>,
}

impl AttributeCache {
    /// Creates a cache holding at most `max_entries` paths, or unbounded for `None`.
    #[must_use]
    pub fn new(max_entries: Option<u64>) -> Self {
        let builder = Cache::builder();
        let seen = match max_entries {
            Some(max) => builder.max_capacity(max).build(),
            None => builder.build(),
        };
        Self { seen }
    }

    /// When `path` was first seen. Records "now" on the first call for a path.
    pub fn first_access(&self, path: &str) -> SystemTime {
        self.seen.get_with_by_ref(path, || {
            trace!(path, "first access");
            SystemTime::now()
        })
    }

    /// The recorded time for `path`, without recording one.
    #[must_use]
    pub fn peek(&self, path: &str) -> Option<SystemTime> {
        self.seen.get(path)
    }

    /// Moves the records of `from` and everything below it under `to`.
    ///
    /// Records already under `to` are replaced, as the move replaces those objects.
    pub fn rename(&self, from: &str, to: &str) {
        let (moved, replaced): (Vec<_>, Vec<_>) = self
            .seen
            .iter()
            .filter(|(path, _)| is_within(path, from) || is_within(path, to))
            .partition(|(path, _)| is_within(path, from));
        for (path, _) in replaced {
            self.seen.invalidate(path.as_str());
        }
        for (path, at) in moved {
            self.seen.invalidate(path.as_str());
            if let Some(rest) = path.strip_prefix(from) {
                let renamed = format!("{to}{rest}");
                trace!(from = %path, to = %renamed, "moving first access");
                self.seen.insert(renamed, at);
            }
        }
    }

    /// Drops the record for `path`.
    pub fn forget(&self, path: &str) {
        self.seen.invalidate(path);
    }

    /// Number of recorded paths.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.seen.run_pending_tasks();
        self.seen.entry_count()
    }

    /// Whether no path has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AttributeCache {
    fn default() -> Self {
        Self::new(None)
    }
}
