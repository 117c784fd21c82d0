//! Embedding-indexed result cache with similarity lookup.
//!
//! Entries are partitioned by scope so inserts and evictions in one scope never
//! contend with lookups in another. Lookups take only read locks; hit counters
//! and recency are atomics so a hit does not upgrade to a write lock. The
//! similarity threshold is fixed per cache instance for the whole deployment.

use std::{
	collections::HashMap,
	sync::{
		Arc, RwLock,
		atomic::{AtomicU64, AtomicUsize, Ordering},
	},
	time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
	/// Cosine similarity a lookup must reach to count as a hit.
	pub similarity_threshold: f32,
	/// Zero disables the size bound.
	pub max_entries: usize,
}
impl Default for CachePolicy {
	fn default() -> Self {
		Self { similarity_threshold: 0.95, max_entries: 10_000 }
	}
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
	pub size: usize,
	pub hits: u64,
	pub misses: u64,
	pub inserts: u64,
	pub expired_evictions: u64,
	pub lru_evictions: u64,
}
impl CacheStats {
	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;

		if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
	}
}

struct Entry<V> {
	embedding: Vec<f32>,
	value: V,
	created_at: Instant,
	ttl: Duration,
	hit_count: AtomicU64,
	last_used: AtomicU64,
}
impl<V> Entry<V> {
	fn is_expired(&self, now: Instant) -> bool {
		now.duration_since(self.created_at) >= self.ttl
	}
}

struct Partition<V> {
	entries: RwLock<Vec<Entry<V>>>,
}
impl<V> Partition<V> {
	fn new() -> Self {
		Self { entries: RwLock::new(Vec::new()) }
	}
}

pub struct SemanticCache<V> {
	policy: CachePolicy,
	partitions: RwLock<HashMap<String, Arc<Partition<V>>>>,
	clock: AtomicU64,
	size: AtomicUsize,
	hits: AtomicU64,
	misses: AtomicU64,
	inserts: AtomicU64,
	expired_evictions: AtomicU64,
	lru_evictions: AtomicU64,
}

impl<V> SemanticCache<V>
where
	V: Clone,
{
	pub fn new(policy: CachePolicy) -> Self {
		Self {
			policy,
			partitions: RwLock::new(HashMap::new()),
			clock: AtomicU64::new(0),
			size: AtomicUsize::new(0),
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
			inserts: AtomicU64::new(0),
			expired_evictions: AtomicU64::new(0),
			lru_evictions: AtomicU64::new(0),
		}
	}

	/// Nearest non-expired entry in the scope partition, hit only at or above the
	/// similarity threshold.
	pub fn lookup(&self, embedding: &[f32], scope: &str) -> Option<V> {
		let partition = {
			let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());

			partitions.get(scope).cloned()
		};
		let Some(partition) = partition else {
			self.misses.fetch_add(1, Ordering::Relaxed);

			return None;
		};
		let now = Instant::now();
		let entries = partition.entries.read().unwrap_or_else(|err| err.into_inner());
		let mut best: Option<(&Entry<V>, f32)> = None;

		for entry in entries.iter() {
			if entry.is_expired(now) {
				continue;
			}

			let Some(similarity) = cosine_similarity(embedding, &entry.embedding) else {
				continue;
			};

			if similarity < self.policy.similarity_threshold {
				continue;
			}
			if best.map(|(_, current)| similarity > current).unwrap_or(true) {
				best = Some((entry, similarity));
			}
		}

		match best {
			Some((entry, similarity)) => {
				entry.hit_count.fetch_add(1, Ordering::Relaxed);
				entry.last_used.store(self.tick(), Ordering::Relaxed);
				self.hits.fetch_add(1, Ordering::Relaxed);
				tracing::debug!(scope = scope, similarity = similarity, "Semantic cache hit.");

				Some(entry.value.clone())
			},
			None => {
				self.misses.fetch_add(1, Ordering::Relaxed);

				None
			},
		}
	}

	pub fn insert(&self, embedding: Vec<f32>, value: V, scope: &str, ttl: Duration) {
		if self.policy.max_entries > 0 && self.size.load(Ordering::Relaxed) >= self.policy.max_entries
		{
			self.evict_lru();
		}

		let partition = self.partition_for(scope);
		let entry = Entry {
			embedding,
			value,
			created_at: Instant::now(),
			ttl,
			hit_count: AtomicU64::new(0),
			last_used: AtomicU64::new(self.tick()),
		};
		let mut entries = partition.entries.write().unwrap_or_else(|err| err.into_inner());

		entries.push(entry);
		self.size.fetch_add(1, Ordering::Relaxed);
		self.inserts.fetch_add(1, Ordering::Relaxed);
	}

	/// Remove every TTL-expired entry. Meant to run from a periodic sweep task.
	pub fn sweep_expired(&self) -> usize {
		let partitions: Vec<Arc<Partition<V>>> = {
			let map = self.partitions.read().unwrap_or_else(|err| err.into_inner());

			map.values().cloned().collect()
		};
		let now = Instant::now();
		let mut removed = 0;

		for partition in partitions {
			let mut entries = partition.entries.write().unwrap_or_else(|err| err.into_inner());
			let before = entries.len();

			entries.retain(|entry| !entry.is_expired(now));
			removed += before - entries.len();
		}

		if removed > 0 {
			self.size.fetch_sub(removed, Ordering::Relaxed);
			self.expired_evictions.fetch_add(removed as u64, Ordering::Relaxed);
			tracing::debug!(count = removed, "Swept expired cache entries.");
		}

		removed
	}

	pub fn stats(&self) -> CacheStats {
		CacheStats {
			size: self.size.load(Ordering::Relaxed),
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			inserts: self.inserts.load(Ordering::Relaxed),
			expired_evictions: self.expired_evictions.load(Ordering::Relaxed),
			lru_evictions: self.lru_evictions.load(Ordering::Relaxed),
		}
	}

	fn tick(&self) -> u64 {
		self.clock.fetch_add(1, Ordering::Relaxed) + 1
	}

	fn partition_for(&self, scope: &str) -> Arc<Partition<V>> {
		{
			let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());

			if let Some(partition) = partitions.get(scope) {
				return partition.clone();
			}
		}

		let mut partitions = self.partitions.write().unwrap_or_else(|err| err.into_inner());

		partitions.entry(scope.to_string()).or_insert_with(|| Arc::new(Partition::new())).clone()
	}

	fn evict_lru(&self) {
		let partitions: Vec<Arc<Partition<V>>> = {
			let map = self.partitions.read().unwrap_or_else(|err| err.into_inner());

			map.values().cloned().collect()
		};
		let mut victim: Option<(Arc<Partition<V>>, u64)> = None;

		for partition in partitions {
			let entries = partition.entries.read().unwrap_or_else(|err| err.into_inner());
			let oldest = entries.iter().map(|entry| entry.last_used.load(Ordering::Relaxed)).min();
			drop(entries);

			if let Some(oldest) = oldest
				&& victim.as_ref().map(|(_, current)| oldest < *current).unwrap_or(true)
			{
				victim = Some((partition, oldest));
			}
		}

		let Some((partition, _)) = victim else {
			return;
		};
		let mut entries = partition.entries.write().unwrap_or_else(|err| err.into_inner());
		let oldest_pos = entries
			.iter()
			.enumerate()
			.min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
			.map(|(pos, _)| pos);

		if let Some(pos) = oldest_pos {
			entries.swap_remove(pos);
			self.size.fetch_sub(1, Ordering::Relaxed);
			self.lru_evictions.fetch_add(1, Ordering::Relaxed);
		}
	}
}

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}
