use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub backends: Vec<Backend>,
	#[serde(default)]
	pub routing: Routing,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub fusion: Fusion,
	#[serde(default)]
	pub learning: Learning,
	#[serde(default)]
	pub flags: Flags,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Backend {
	pub name: String,
	/// Declared intents that force this backend into the dispatch set regardless of its
	/// bandit score.
	#[serde(default)]
	pub force_intents: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct Routing {
	#[serde(default = "default_embedding_dim")]
	pub embedding_dim: u32,
	#[serde(default = "default_alpha")]
	pub alpha: f64,
	#[serde(default = "default_lambda")]
	pub lambda: f64,
	#[serde(default = "default_selection_margin")]
	pub selection_margin: f64,
	#[serde(default = "default_max_fanout")]
	pub max_fanout: u32,
	#[serde(default = "default_backend_timeout_ms")]
	pub backend_timeout_ms: u64,
	#[serde(default = "default_policy_flag")]
	pub policy_flag: String,
}
impl Default for Routing {
	fn default() -> Self {
		Self {
			embedding_dim: default_embedding_dim(),
			alpha: default_alpha(),
			lambda: default_lambda(),
			selection_margin: default_selection_margin(),
			max_fanout: default_max_fanout(),
			backend_timeout_ms: default_backend_timeout_ms(),
			policy_flag: default_policy_flag(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Cache {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_similarity_threshold")]
	pub similarity_threshold: f32,
	#[serde(default = "default_cache_ttl_seconds")]
	pub ttl_seconds: u64,
	#[serde(default = "default_cache_max_entries")]
	pub max_entries: u32,
	#[serde(default = "default_cache_sweep_interval_ms")]
	pub sweep_interval_ms: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self {
			enabled: true,
			similarity_threshold: default_similarity_threshold(),
			ttl_seconds: default_cache_ttl_seconds(),
			max_entries: default_cache_max_entries(),
			sweep_interval_ms: default_cache_sweep_interval_ms(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Fusion {
	#[serde(default = "default_rrf_k")]
	pub rrf_k: f64,
	#[serde(default = "default_diversity_weight")]
	pub diversity_weight: f64,
	#[serde(default = "default_diversity_sim_threshold")]
	pub diversity_sim_threshold: f32,
	#[serde(default = "default_max_results")]
	pub max_results: u32,
}
impl Default for Fusion {
	fn default() -> Self {
		Self {
			rrf_k: default_rrf_k(),
			diversity_weight: default_diversity_weight(),
			diversity_sim_threshold: default_diversity_sim_threshold(),
			max_results: default_max_results(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Learning {
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_flush_interval_ms")]
	pub flush_interval_ms: u64,
	#[serde(default = "default_queue_high_water")]
	pub queue_high_water: u32,
	#[serde(default = "default_correlation_ttl_seconds")]
	pub correlation_ttl_seconds: u64,
	#[serde(default = "default_correlation_max_entries")]
	pub correlation_max_entries: u32,
	#[serde(default)]
	pub reward: Reward,
}
impl Default for Learning {
	fn default() -> Self {
		Self {
			batch_size: default_batch_size(),
			flush_interval_ms: default_flush_interval_ms(),
			queue_high_water: default_queue_high_water(),
			correlation_ttl_seconds: default_correlation_ttl_seconds(),
			correlation_max_entries: default_correlation_max_entries(),
			reward: Reward::default(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Reward {
	#[serde(default = "default_clicked_weight")]
	pub clicked_weight: f64,
	#[serde(default = "default_dwell_weight")]
	pub dwell_weight: f64,
	#[serde(default = "default_rating_weight")]
	pub rating_weight: f64,
	#[serde(default = "default_latency_weight")]
	pub latency_weight: f64,
	/// Dwell times above this are treated as full engagement.
	#[serde(default = "default_dwell_clamp_seconds")]
	pub dwell_clamp_seconds: f64,
	/// Explicit ratings are clamped to [0, rating_clamp].
	#[serde(default = "default_rating_clamp")]
	pub rating_clamp: f64,
	/// Latency at or above the budget contributes zero to the reward.
	#[serde(default = "default_latency_budget_ms")]
	pub latency_budget_ms: u64,
}
impl Default for Reward {
	fn default() -> Self {
		Self {
			clicked_weight: default_clicked_weight(),
			dwell_weight: default_dwell_weight(),
			rating_weight: default_rating_weight(),
			latency_weight: default_latency_weight(),
			dwell_clamp_seconds: default_dwell_clamp_seconds(),
			rating_clamp: default_rating_clamp(),
			latency_budget_ms: default_latency_budget_ms(),
		}
	}
}

#[derive(Debug, Deserialize)]
pub struct Flags {
	#[serde(default = "default_snapshot_ttl_seconds")]
	pub snapshot_ttl_seconds: u64,
	#[serde(default = "default_refresh_timeout_ms")]
	pub refresh_timeout_ms: u64,
}
impl Default for Flags {
	fn default() -> Self {
		Self {
			snapshot_ttl_seconds: default_snapshot_ttl_seconds(),
			refresh_timeout_ms: default_refresh_timeout_ms(),
		}
	}
}

fn default_true() -> bool {
	true
}

fn default_embedding_dim() -> u32 {
	1_536
}

fn default_alpha() -> f64 {
	0.5
}

fn default_lambda() -> f64 {
	1.0
}

fn default_selection_margin() -> f64 {
	0.1
}

fn default_max_fanout() -> u32 {
	3
}

fn default_backend_timeout_ms() -> u64 {
	1_000
}

fn default_policy_flag() -> String {
	"adaptive_routing".to_string()
}

fn default_similarity_threshold() -> f32 {
	0.95
}

fn default_cache_ttl_seconds() -> u64 {
	300
}

fn default_cache_max_entries() -> u32 {
	10_000
}

fn default_cache_sweep_interval_ms() -> u64 {
	30_000
}

fn default_rrf_k() -> f64 {
	60.0
}

fn default_diversity_weight() -> f64 {
	0.3
}

fn default_diversity_sim_threshold() -> f32 {
	0.85
}

fn default_max_results() -> u32 {
	20
}

fn default_batch_size() -> u32 {
	100
}

fn default_flush_interval_ms() -> u64 {
	1_000
}

fn default_queue_high_water() -> u32 {
	1_000
}

fn default_correlation_ttl_seconds() -> u64 {
	600
}

fn default_correlation_max_entries() -> u32 {
	10_000
}

fn default_clicked_weight() -> f64 {
	0.4
}

fn default_dwell_weight() -> f64 {
	0.3
}

fn default_rating_weight() -> f64 {
	0.2
}

fn default_latency_weight() -> f64 {
	0.1
}

fn default_dwell_clamp_seconds() -> f64 {
	60.0
}

fn default_rating_clamp() -> f64 {
	5.0
}

fn default_latency_budget_ms() -> u64 {
	2_000
}

fn default_snapshot_ttl_seconds() -> u64 {
	30
}

fn default_refresh_timeout_ms() -> u64 {
	500
}
