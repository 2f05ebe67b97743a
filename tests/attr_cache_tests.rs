#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use ipfs_mount::attr::AttributeCache;

#[test]
fn first_access_is_idempotent() {
    let cache = AttributeCache::default();
    let first = cache.first_access("/a");
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(cache.first_access("/a"), first);
    assert_eq!(cache.peek("/a"), Some(first));
    assert_eq!(cache.len(), 1);
}

#[test]
fn peek_does_not_record() {
    let cache = AttributeCache::default();
    assert_eq!(cache.peek("/unseen"), None);
    assert!(cache.is_empty());
}

#[test]
fn rename_carries_the_timestamp() {
    let cache = AttributeCache::default();
    let at = cache.first_access("/old");
    cache.rename("/old", "/new");
    assert_eq!(cache.peek("/old"), None);
    assert_eq!(cache.first_access("/new"), at);
}

#[test]
fn rename_carries_descendants() {
    let cache = AttributeCache::default();
    let dir = cache.first_access("/d");
    let file = cache.first_access("/d/f");
    let sibling = cache.first_access("/dx");
    cache.rename("/d", "/e");

    assert_eq!(cache.peek("/d/f"), None);
    assert_eq!(cache.peek("/e"), Some(dir));
    assert_eq!(cache.peek("/e/f"), Some(file));
    assert_eq!(cache.peek("/dx"), Some(sibling));
}

#[test]
fn rename_replaces_the_target_records() {
    let cache = AttributeCache::default();
    let moved = cache.first_access("/a");
    cache.first_access("/b");
    cache.first_access("/b/stale");
    cache.rename("/a", "/b");

    assert_eq!(cache.peek("/b"), Some(moved));
    assert_eq!(cache.peek("/b/stale"), None);
}

#[test]
fn forget_starts_over() {
    let cache = AttributeCache::default();
    let at = cache.first_access("/x");
    cache.forget("/x");
    std::thread::sleep(Duration::from_millis(5));
    assert!(cache.first_access("/x") > at);
}

#[test]
fn capacity_bounds_the_cache() {
    let cache = AttributeCache::new(Some(10));
    for i in 0..1000 {
        cache.first_access(&format!("/f{i}"));
    }
    // Eviction is applied during maintenance, which `len` runs.
    let _ = cache.len();
    let held = cache.len();
    assert!(held <= 10, "holds {held} entries");
}

#[test]
fn concurrent_first_access_agrees() {
    let cache = Arc::new(AttributeCache::default());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.first_access("/shared"))
        })
        .collect();
    let times: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(times.windows(2).all(|w| w[0] == w[1]));
}
