use std::{
	collections::BTreeMap,
	sync::Arc,
	time::{Duration, Instant},
};

use apex_bandit::ArmScore;
use apex_fusion::{BackendList, FusedItem, FusionPolicy, RankedItem, fuse};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result, Router};

#[derive(Debug, Clone)]
pub struct RouteQuery {
	/// Context vector, must match the configured embedding dimension.
	pub embedding: Vec<f32>,
	/// Declared intent; backends forcing this intent always join the dispatch.
	pub intent: Option<String>,
	pub user_id: String,
	pub group_id: Option<String>,
	/// Caps every per-backend timeout when tighter than the configured one.
	pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RoutingDecision {
	pub backends: Vec<String>,
	/// Per-arm UCB scores; empty on the static path.
	pub scores: BTreeMap<String, ArmScore>,
	pub explored: bool,
	pub forced: Vec<String>,
	pub adaptive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResult {
	pub query_id: Uuid,
	pub items: Vec<FusedItem>,
	/// Backends that answered in time, in selection order. Empty on a cache hit.
	pub backends_used: Vec<String>,
	pub cache_hit: bool,
	pub latency_ms: u64,
}

impl Router {
	pub async fn route(&self, query: RouteQuery) -> Result<RouteResult> {
		let dim = self.cfg.routing.embedding_dim as usize;

		if query.embedding.len() != dim {
			return Err(Error::InvalidRequest {
				message: format!(
					"embedding dimension mismatch: expected {dim}, got {}",
					query.embedding.len()
				),
			});
		}
		if query.user_id.is_empty() {
			return Err(Error::InvalidRequest { message: "user_id must not be empty".to_string() });
		}

		let query_id = Uuid::new_v4();
		let started = Instant::now();
		let scope = query.group_id.clone().unwrap_or_else(|| "global".to_string());

		if self.cfg.cache.enabled
			&& let Some(items) = self.cache.lookup(&query.embedding, &scope)
		{
			debug!(query_id = %query_id, "Semantic cache hit, skipping dispatch.");

			return Ok(RouteResult {
				query_id,
				items,
				backends_used: Vec::new(),
				cache_hit: true,
				latency_ms: started.elapsed().as_millis() as u64,
			});
		}

		let decision = self.decide(&query).await;

		debug!(
			query_id = %query_id,
			backends = ?decision.backends,
			adaptive = decision.adaptive,
			explored = decision.explored,
			"Routing decision."
		);

		let lists = self.dispatch(&query, &decision.backends).await;

		if lists.is_empty() {
			return Err(Error::AllBackendsFailed { query_id });
		}

		let backends_used: Vec<String> = lists.iter().map(|list| list.backend.clone()).collect();
		let policy = FusionPolicy {
			rrf_k: self.cfg.fusion.rrf_k,
			diversity_weight: self.cfg.fusion.diversity_weight,
			diversity_sim_threshold: self.cfg.fusion.diversity_sim_threshold,
			max_results: self.cfg.fusion.max_results.max(1) as usize,
		};
		let items = fuse(&lists, &policy);

		if self.cfg.cache.enabled {
			self.cache.insert(
				query.embedding.clone(),
				items.clone(),
				&scope,
				Duration::from_secs(self.cfg.cache.ttl_seconds),
			);
		}

		self.correlation.insert(query_id, query.embedding, decision.backends);

		Ok(RouteResult {
			query_id,
			items,
			backends_used,
			cache_hit: false,
			latency_ms: started.elapsed().as_millis() as u64,
		})
	}

	/// Adaptive selection is gated per user by the rollout flag; the static path
	/// takes the intent-forced backends, else every configured backend up to the
	/// fan-out cap.
	async fn decide(&self, query: &RouteQuery) -> RoutingDecision {
		let forced: Vec<String> = self
			.cfg
			.backends
			.iter()
			.filter(|backend| {
				query
					.intent
					.as_deref()
					.map(|intent| backend.force_intents.iter().any(|fi| fi == intent))
					.unwrap_or(false)
			})
			.map(|backend| backend.name.clone())
			.collect();
		let adaptive =
			self.flags.is_enabled(&self.cfg.routing.policy_flag, &query.user_id).await.enabled;

		if adaptive {
			let selection = {
				let bandit = self.bandit.read().unwrap_or_else(|err| err.into_inner());

				bandit.select(&query.embedding, &forced)
			};

			return RoutingDecision {
				backends: selection.arms,
				scores: selection.scores,
				explored: selection.explored,
				forced: selection.forced,
				adaptive: true,
			};
		}

		let backends = if forced.is_empty() {
			self.cfg
				.backends
				.iter()
				.map(|backend| backend.name.clone())
				.take(self.cfg.routing.max_fanout.max(1) as usize)
				.collect()
		} else {
			forced.clone()
		};

		RoutingDecision { backends, scores: BTreeMap::new(), explored: false, forced, adaptive: false }
	}

	/// Parallel fan-out, one timeout per backend. Failures and timeouts are
	/// excluded; the query succeeds from whatever answered.
	async fn dispatch(&self, query: &RouteQuery, backends: &[String]) -> Vec<BackendList> {
		let configured = Duration::from_millis(self.cfg.routing.backend_timeout_ms.max(1));
		let budget = match query.deadline_ms {
			Some(deadline) => configured.min(Duration::from_millis(deadline)),
			None => configured,
		};
		let query = Arc::new(query.clone());
		let mut set = tokio::task::JoinSet::new();

		for name in backends {
			let Some(executor) = self.executors.get(name).cloned() else {
				continue;
			};
			let query = query.clone();
			let name = name.clone();

			set.spawn(async move {
				let outcome = tokio::time::timeout(budget, executor.execute(&query)).await;

				(name, outcome)
			});
		}

		let mut answered: BTreeMap<String, Vec<RankedItem>> = BTreeMap::new();

		while let Some(joined) = set.join_next().await {
			match joined {
				Ok((name, Ok(Ok(items)))) => {
					answered.insert(name, items);
				},
				Ok((name, Ok(Err(err)))) => {
					warn!(backend = %name, error = %err, "Backend failed, excluding it from fusion.");
				},
				Ok((name, Err(_))) => {
					warn!(backend = %name, "Backend timed out, excluding it from fusion.");
				},
				Err(err) => {
					warn!(error = %err, "Backend task failed to complete.");
				},
			}
		}

		backends
			.iter()
			.filter_map(|name| {
				answered.remove(name).map(|items| BackendList { backend: name.clone(), items })
			})
			.collect()
	}
}
