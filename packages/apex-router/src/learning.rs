//! Online learning plumbing: the bounded feedback queue and the single
//! background worker that folds drained batches into the bandit, persists
//! dirty arm state, and runs the periodic sweeps.

use std::{
	collections::{BTreeMap, BTreeSet, VecDeque},
	sync::{
		Arc, Mutex, RwLock,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use apex_bandit::{ArmSnapshot, ArmStats, ContextualBandit};
use apex_cache::{CacheStats, SemanticCache};
use apex_fusion::FusedItem;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::{ArmStore, correlation::CorrelationTable};

#[derive(Debug, Clone)]
pub(crate) struct FeedbackSample {
	pub(crate) arms: Vec<String>,
	pub(crate) embedding: Vec<f32>,
	pub(crate) reward: f64,
}

/// Bounded queue between the feedback path and the learning worker. `push`
/// never blocks: past the high-water mark the oldest sample is dropped.
pub(crate) struct FeedbackQueue {
	high_water: usize,
	inner: Mutex<VecDeque<FeedbackSample>>,
	notify: Notify,
	dropped: AtomicU64,
}

impl FeedbackQueue {
	pub(crate) fn new(high_water: usize) -> Self {
		Self {
			high_water: high_water.max(1),
			inner: Mutex::new(VecDeque::new()),
			notify: Notify::new(),
			dropped: AtomicU64::new(0),
		}
	}

	pub(crate) fn push(&self, sample: FeedbackSample) {
		{
			let mut queue = self.inner.lock().unwrap_or_else(|err| err.into_inner());

			if queue.len() >= self.high_water {
				queue.pop_front();
				self.dropped.fetch_add(1, Ordering::Relaxed);
				warn!("Feedback queue past high-water mark, dropping the oldest sample.");
			}

			queue.push_back(sample);
		}

		self.notify.notify_one();
	}

	pub(crate) fn drain(&self, max: usize) -> Vec<FeedbackSample> {
		let mut queue = self.inner.lock().unwrap_or_else(|err| err.into_inner());
		let count = queue.len().min(max);

		queue.drain(..count).collect()
	}

	pub(crate) async fn notified(&self) {
		self.notify.notified().await;
	}

	pub(crate) fn len(&self) -> usize {
		self.inner.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub(crate) fn dropped(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}
}

#[derive(Default)]
pub(crate) struct LearningStats {
	pub(crate) feedback_count: AtomicU64,
	pub(crate) batch_update_count: AtomicU64,
	pub(crate) correlation_misses: AtomicU64,
	reward_sum: Mutex<f64>,
}

impl LearningStats {
	pub(crate) fn note_feedback(&self, reward: f64) {
		self.feedback_count.fetch_add(1, Ordering::Relaxed);

		*self.reward_sum.lock().unwrap_or_else(|err| err.into_inner()) += reward;
	}

	pub(crate) fn avg_reward(&self) -> f64 {
		let count = self.feedback_count.load(Ordering::Relaxed);

		if count == 0 {
			return 0.0;
		}

		*self.reward_sum.lock().unwrap_or_else(|err| err.into_inner()) / count as f64
	}
}

#[derive(Debug, Clone)]
pub struct RouterStats {
	pub feedback_count: u64,
	pub batch_update_count: u64,
	pub dropped_count: u64,
	pub correlation_misses: u64,
	pub avg_reward: f64,
	pub queue_size: usize,
	pub correlation_size: usize,
	pub cache: CacheStats,
	pub arms: BTreeMap<String, ArmStats>,
}

pub(crate) struct Worker {
	pub(crate) queue: Arc<FeedbackQueue>,
	pub(crate) bandit: Arc<RwLock<ContextualBandit>>,
	pub(crate) correlation: Arc<CorrelationTable>,
	pub(crate) cache: Arc<SemanticCache<Vec<FusedItem>>>,
	pub(crate) arm_store: Arc<dyn ArmStore>,
	pub(crate) stats: Arc<LearningStats>,
	pub(crate) batch_size: usize,
	pub(crate) flush_interval: Duration,
	pub(crate) sweep_interval: Duration,
}

impl Worker {
	pub(crate) async fn run(self) {
		let batch_size = self.batch_size.max(1);
		let mut last_sweep = Instant::now();

		loop {
			// Drain on a full batch or on the flush interval, whichever first.
			let deadline = Instant::now() + self.flush_interval;

			while self.queue.len() < batch_size {
				let now = Instant::now();

				if now >= deadline {
					break;
				}
				if tokio::time::timeout(deadline - now, self.queue.notified()).await.is_err() {
					break;
				}
			}

			let batch = self.queue.drain(batch_size);

			if !batch.is_empty() {
				self.apply(batch).await;
			}

			if last_sweep.elapsed() >= self.sweep_interval {
				last_sweep = Instant::now();

				let expired = self.cache.sweep_expired();
				let stale = self.correlation.sweep();

				if expired > 0 || stale > 0 {
					debug!(
						cache_expired = expired,
						correlation_expired = stale,
						"Maintenance sweep complete."
					);
				}
			}
		}
	}

	async fn apply(&self, batch: Vec<FeedbackSample>) {
		let mut dirty = BTreeSet::new();

		{
			let mut bandit = self.bandit.write().unwrap_or_else(|err| err.into_inner());

			for sample in &batch {
				for arm in &sample.arms {
					bandit.update(arm, &sample.embedding, sample.reward);
					dirty.insert(arm.clone());
				}
			}
		}

		self.stats.batch_update_count.fetch_add(1, Ordering::Relaxed);
		debug!(samples = batch.len(), arms = dirty.len(), "Applied a feedback batch.");

		let snapshot = {
			let bandit = self.bandit.read().unwrap_or_else(|err| err.into_inner());

			bandit.snapshot()
		};
		let arms: BTreeMap<String, ArmSnapshot> =
			snapshot.arms.into_iter().filter(|(name, _)| dirty.contains(name)).collect();

		if let Err(err) = self.arm_store.persist(snapshot.dim, &arms).await {
			warn!(error = %err, "Failed to persist bandit arm state, keeping it in memory.");
		}
	}
}
