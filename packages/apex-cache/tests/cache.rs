use std::{thread, time::Duration};

use apex_cache::{CachePolicy, SemanticCache};

fn policy() -> CachePolicy {
	CachePolicy { similarity_threshold: 0.95, max_entries: 0 }
}

#[test]
fn lookup_hits_above_the_similarity_threshold_only() {
	let cache = SemanticCache::new(policy());

	cache.insert(vec![1.0, 0.0, 0.0], "cached".to_string(), "tenant-a", Duration::from_secs(60));

	// Cosine ~0.97.
	assert_eq!(
		cache.lookup(&[1.0, 0.25, 0.0], "tenant-a"),
		Some("cached".to_string())
	);
	// Cosine ~0.4.
	assert_eq!(cache.lookup(&[0.4, 0.9, 0.0], "tenant-a"), None);

	let stats = cache.stats();

	assert_eq!(stats.hits, 1);
	assert_eq!(stats.misses, 1);
}

#[test]
fn nearest_entry_wins_when_several_clear_the_threshold() {
	let cache = SemanticCache::new(policy());

	cache.insert(vec![1.0, 0.1], "close".to_string(), "s", Duration::from_secs(60));
	cache.insert(vec![1.0, 0.0], "exact".to_string(), "s", Duration::from_secs(60));

	assert_eq!(cache.lookup(&[1.0, 0.0], "s"), Some("exact".to_string()));
}

#[test]
fn expired_entries_are_never_returned() {
	let cache = SemanticCache::new(policy());

	cache.insert(vec![1.0, 0.0], "stale".to_string(), "s", Duration::from_millis(10));
	thread::sleep(Duration::from_millis(30));

	assert_eq!(cache.lookup(&[1.0, 0.0], "s"), None);

	// The sweep reclaims it.
	assert_eq!(cache.sweep_expired(), 1);
	assert_eq!(cache.stats().size, 0);
	assert_eq!(cache.stats().expired_evictions, 1);
}

#[test]
fn scopes_are_isolated() {
	let cache = SemanticCache::new(policy());

	cache.insert(vec![1.0, 0.0], "a-only".to_string(), "tenant-a", Duration::from_secs(60));

	assert_eq!(cache.lookup(&[1.0, 0.0], "tenant-b"), None);
	assert_eq!(cache.lookup(&[1.0, 0.0], "tenant-a"), Some("a-only".to_string()));
}

#[test]
fn size_bound_evicts_the_least_recently_used_entry() {
	let cache = SemanticCache::new(CachePolicy { similarity_threshold: 0.95, max_entries: 2 });

	cache.insert(vec![1.0, 0.0, 0.0], "first".to_string(), "s", Duration::from_secs(60));
	cache.insert(vec![0.0, 1.0, 0.0], "second".to_string(), "s", Duration::from_secs(60));

	// Touch "first" so "second" becomes the LRU victim.
	assert_eq!(cache.lookup(&[1.0, 0.0, 0.0], "s"), Some("first".to_string()));

	cache.insert(vec![0.0, 0.0, 1.0], "third".to_string(), "s", Duration::from_secs(60));

	assert_eq!(cache.stats().size, 2);
	assert_eq!(cache.stats().lru_evictions, 1);
	assert_eq!(cache.lookup(&[0.0, 1.0, 0.0], "s"), None);
	assert_eq!(cache.lookup(&[1.0, 0.0, 0.0], "s"), Some("first".to_string()));
	assert_eq!(cache.lookup(&[0.0, 0.0, 1.0], "s"), Some("third".to_string()));
}

#[test]
fn zero_max_entries_disables_the_size_bound() {
	let cache = SemanticCache::new(policy());

	for i in 0..100 {
		cache.insert(vec![i as f32, 1.0], format!("v{i}"), "s", Duration::from_secs(60));
	}

	assert_eq!(cache.stats().size, 100);
	assert_eq!(cache.stats().lru_evictions, 0);
}
