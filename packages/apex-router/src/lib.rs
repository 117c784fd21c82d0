//! Routing facade over heterogeneous data backends: semantic caching, bandit
//! or static backend selection, parallel dispatch with per-backend timeouts,
//! rank fusion, and an online feedback loop that improves selection over time.

pub mod feedback;
pub mod route;
pub mod store;

mod correlation;
mod error;
mod learning;

use std::{
	collections::BTreeMap,
	future::Future,
	pin::Pin,
	sync::{Arc, RwLock},
	time::Duration,
};

use apex_bandit::{ArmSnapshot, BanditSnapshot, ContextualBandit, LinUcbConfig};
use apex_cache::{CachePolicy, SemanticCache};
use apex_config::Config;
use apex_flags::{FeatureFlagManager, FlagStore, PgFlagStore};
use apex_fusion::FusedItem;
use apex_storage::db::Db;
use tokio::task::JoinHandle;
use tracing::info;

use crate::{correlation::CorrelationTable, learning::FeedbackQueue};

pub use apex_fusion::RankedItem;
pub use error::{Error, Result};
pub use feedback::{FeedbackAck, FeedbackRecord};
pub use learning::RouterStats;
pub use route::{RouteQuery, RouteResult, RoutingDecision};
pub use store::PgArmStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One configured data backend. Implementations run the actual query engine
/// (graph, relational, vector, ...) and return a ranked list.
pub trait BackendExecutor
where
	Self: Send + Sync,
{
	/// Must match a configured backend name.
	fn name(&self) -> &str;
	fn execute<'a>(&'a self, query: &'a RouteQuery) -> BoxFuture<'a, Result<Vec<RankedItem>>>;
}

/// Durable home of the bandit's per-arm sufficient statistics.
pub trait ArmStore
where
	Self: Send + Sync,
{
	fn load<'a>(&'a self) -> BoxFuture<'a, Result<BanditSnapshot>>;
	fn persist<'a>(
		&'a self,
		dim: usize,
		arms: &'a BTreeMap<String, ArmSnapshot>,
	) -> BoxFuture<'a, Result<()>>;
}

pub struct Router {
	cfg: Config,
	executors: BTreeMap<String, Arc<dyn BackendExecutor>>,
	flags: FeatureFlagManager,
	bandit: Arc<RwLock<ContextualBandit>>,
	cache: Arc<SemanticCache<Vec<FusedItem>>>,
	correlation: Arc<CorrelationTable>,
	queue: Arc<FeedbackQueue>,
	stats: Arc<learning::LearningStats>,
	worker: JoinHandle<()>,
}

impl Router {
	/// Fails fast: zero backends, a backend without an executor, or an
	/// unreachable arm store all abort construction.
	pub async fn new(
		cfg: Config,
		executors: Vec<Arc<dyn BackendExecutor>>,
		flag_store: Arc<dyn FlagStore>,
		arm_store: Arc<dyn ArmStore>,
	) -> Result<Self> {
		if cfg.backends.is_empty() {
			return Err(Error::Startup { message: "no backends configured".to_string() });
		}

		let mut by_name = BTreeMap::new();

		for executor in executors {
			by_name.insert(executor.name().to_string(), executor);
		}
		for backend in &cfg.backends {
			if !by_name.contains_key(&backend.name) {
				return Err(Error::Startup {
					message: format!("no executor registered for backend {}", backend.name),
				});
			}
		}

		let mut bandit = ContextualBandit::new(
			LinUcbConfig {
				dim: cfg.routing.embedding_dim.max(1) as usize,
				lambda: cfg.routing.lambda,
				alpha: cfg.routing.alpha,
				selection_margin: cfg.routing.selection_margin,
				max_fanout: cfg.routing.max_fanout.max(1) as usize,
			},
			cfg.backends.iter().map(|backend| backend.name.clone()),
		);
		// Warm start; an unreachable store is fatal here, not later.
		let snapshot = arm_store.load().await?;
		let restored = snapshot.arms.len();

		bandit.restore(snapshot);
		info!(backends = cfg.backends.len(), restored_arms = restored, "Router initialized.");

		let bandit = Arc::new(RwLock::new(bandit));
		let cache = Arc::new(SemanticCache::new(CachePolicy {
			similarity_threshold: cfg.cache.similarity_threshold,
			max_entries: cfg.cache.max_entries as usize,
		}));
		let correlation = Arc::new(CorrelationTable::new(
			Duration::from_secs(cfg.learning.correlation_ttl_seconds),
			cfg.learning.correlation_max_entries as usize,
		));
		let queue = Arc::new(FeedbackQueue::new(cfg.learning.queue_high_water as usize));
		let stats = Arc::new(learning::LearningStats::default());
		let worker = tokio::spawn(
			learning::Worker {
				queue: queue.clone(),
				bandit: bandit.clone(),
				correlation: correlation.clone(),
				cache: cache.clone(),
				arm_store,
				stats: stats.clone(),
				batch_size: cfg.learning.batch_size as usize,
				flush_interval: Duration::from_millis(cfg.learning.flush_interval_ms.max(1)),
				sweep_interval: Duration::from_millis(cfg.cache.sweep_interval_ms.max(1)),
			}
			.run(),
		);
		let flags = FeatureFlagManager::new(flag_store, &cfg.flags);

		Ok(Self {
			cfg,
			executors: by_name,
			flags,
			bandit,
			cache,
			correlation,
			queue,
			stats,
			worker,
		})
	}

	/// Connects to Postgres, bootstraps the schema, and builds the router over
	/// the Postgres-backed flag and arm stores.
	pub async fn connect(cfg: Config, executors: Vec<Arc<dyn BackendExecutor>>) -> Result<Self> {
		let db = Db::connect(&cfg.storage.postgres).await?;

		db.ensure_schema().await?;

		let flag_store = Arc::new(PgFlagStore::new(db.clone()));
		let arm_store = Arc::new(PgArmStore::new(db));

		Self::new(cfg, executors, flag_store, arm_store).await
	}

	/// Flag administration surface (create, rollout, lists, delete).
	pub fn flags(&self) -> &FeatureFlagManager {
		&self.flags
	}

	pub fn stats(&self) -> RouterStats {
		let arms = {
			let bandit = self.bandit.read().unwrap_or_else(|err| err.into_inner());

			bandit.stats()
		};

		RouterStats {
			feedback_count: self.stats.feedback_count.load(std::sync::atomic::Ordering::Relaxed),
			batch_update_count: self
				.stats
				.batch_update_count
				.load(std::sync::atomic::Ordering::Relaxed),
			dropped_count: self.queue.dropped(),
			correlation_misses: self
				.stats
				.correlation_misses
				.load(std::sync::atomic::Ordering::Relaxed),
			avg_reward: self.stats.avg_reward(),
			queue_size: self.queue.len(),
			correlation_size: self.correlation.len(),
			cache: self.cache.stats(),
			arms,
		}
	}

	/// Stops the learning worker. Queued samples that have not been drained are
	/// discarded.
	pub fn shutdown(&self) {
		self.worker.abort();
	}
}

impl Drop for Router {
	fn drop(&mut self) {
		self.worker.abort();
	}
}
