mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Backend, Cache, Config, Flags, Fusion, Learning, Postgres, Reward, Routing, Service, Storage,
};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn normalize(cfg: &mut Config) {
	for backend in &mut cfg.backends {
		backend.name = backend.name.trim().to_string();

		for intent in &mut backend.force_intents {
			*intent = intent.trim().to_string();
		}
	}
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.backends.is_empty() {
		return Err(Error::Validation {
			message: "backends must list at least one backend.".to_string(),
		});
	}

	let mut seen = HashSet::new();

	for backend in &cfg.backends {
		if backend.name.is_empty() {
			return Err(Error::Validation {
				message: "backends.name must be non-empty.".to_string(),
			});
		}
		if !seen.insert(backend.name.as_str()) {
			return Err(Error::Validation {
				message: format!("backends.name {} is duplicated.", backend.name),
			});
		}
	}

	if cfg.routing.embedding_dim == 0 {
		return Err(Error::Validation {
			message: "routing.embedding_dim must be greater than zero.".to_string(),
		});
	}
	if !cfg.routing.alpha.is_finite() || cfg.routing.alpha < 0.0 {
		return Err(Error::Validation {
			message: "routing.alpha must be a finite number of zero or greater.".to_string(),
		});
	}
	if !cfg.routing.lambda.is_finite() || cfg.routing.lambda <= 0.0 {
		return Err(Error::Validation {
			message: "routing.lambda must be a finite number greater than zero.".to_string(),
		});
	}
	if !cfg.routing.selection_margin.is_finite()
		|| !(0.0..=1.0).contains(&cfg.routing.selection_margin)
	{
		return Err(Error::Validation {
			message: "routing.selection_margin must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.routing.max_fanout == 0 {
		return Err(Error::Validation {
			message: "routing.max_fanout must be greater than zero.".to_string(),
		});
	}
	if cfg.routing.backend_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "routing.backend_timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.routing.policy_flag.trim().is_empty() {
		return Err(Error::Validation {
			message: "routing.policy_flag must be non-empty.".to_string(),
		});
	}
	if !cfg.cache.similarity_threshold.is_finite()
		|| !(0.0..=1.0).contains(&cfg.cache.similarity_threshold)
	{
		return Err(Error::Validation {
			message: "cache.similarity_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.cache.ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if !cfg.fusion.rrf_k.is_finite() || cfg.fusion.rrf_k <= 0.0 {
		return Err(Error::Validation {
			message: "fusion.rrf_k must be a finite number greater than zero.".to_string(),
		});
	}
	if !cfg.fusion.diversity_weight.is_finite()
		|| !(0.0..=1.0).contains(&cfg.fusion.diversity_weight)
	{
		return Err(Error::Validation {
			message: "fusion.diversity_weight must be in the range 0.0-1.0.".to_string(),
		});
	}
	if !cfg.fusion.diversity_sim_threshold.is_finite()
		|| !(0.0..=1.0).contains(&cfg.fusion.diversity_sim_threshold)
	{
		return Err(Error::Validation {
			message: "fusion.diversity_sim_threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.fusion.max_results == 0 {
		return Err(Error::Validation {
			message: "fusion.max_results must be greater than zero.".to_string(),
		});
	}
	if cfg.learning.batch_size == 0 {
		return Err(Error::Validation {
			message: "learning.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.learning.queue_high_water == 0 {
		return Err(Error::Validation {
			message: "learning.queue_high_water must be greater than zero.".to_string(),
		});
	}
	if cfg.learning.correlation_ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "learning.correlation_ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.learning.correlation_max_entries == 0 {
		return Err(Error::Validation {
			message: "learning.correlation_max_entries must be greater than zero.".to_string(),
		});
	}

	let reward = &cfg.learning.reward;
	let weights = [
		("clicked_weight", reward.clicked_weight),
		("dwell_weight", reward.dwell_weight),
		("rating_weight", reward.rating_weight),
		("latency_weight", reward.latency_weight),
	];

	for (name, weight) in weights {
		if !weight.is_finite() || weight < 0.0 {
			return Err(Error::Validation {
				message: format!(
					"learning.reward.{name} must be a finite number of zero or greater."
				),
			});
		}
	}

	let weight_sum: f64 = weights.iter().map(|(_, weight)| weight).sum();

	if weight_sum <= 0.0 {
		return Err(Error::Validation {
			message: "learning.reward weights must not all be zero.".to_string(),
		});
	}

	if !reward.dwell_clamp_seconds.is_finite() || reward.dwell_clamp_seconds <= 0.0 {
		return Err(Error::Validation {
			message: "learning.reward.dwell_clamp_seconds must be a finite number greater than \
			          zero."
				.to_string(),
		});
	}
	if !reward.rating_clamp.is_finite() || reward.rating_clamp <= 0.0 {
		return Err(Error::Validation {
			message: "learning.reward.rating_clamp must be a finite number greater than zero."
				.to_string(),
		});
	}
	if reward.latency_budget_ms == 0 {
		return Err(Error::Validation {
			message: "learning.reward.latency_budget_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.flags.snapshot_ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "flags.snapshot_ttl_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.flags.refresh_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "flags.refresh_timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}
