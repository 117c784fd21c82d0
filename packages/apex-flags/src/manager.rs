use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use tokio::sync::Notify;
use tracing::warn;

use crate::{
	Error, Evaluation, FailMode, FeatureFlag, FlagStore, ListKind, Reason, Result, evaluate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagStats {
	pub total: usize,
	/// Flags with a partial rollout, exclusive of 0 and 100.
	pub rolling_out: usize,
	pub fully_rolled_out: usize,
	pub cached: usize,
}

#[derive(Clone)]
struct CachedFlag {
	/// `None` is a negative entry for a flag the store does not have.
	flag: Option<FeatureFlag>,
	fetched_at: Instant,
}

enum Lookup {
	Found(FeatureFlag),
	Unknown,
	Unavailable { last_known: Option<FeatureFlag> },
}

pub struct FeatureFlagManager {
	store: Arc<dyn FlagStore>,
	snapshot_ttl: Duration,
	refresh_timeout: Duration,
	cache: Mutex<HashMap<String, CachedFlag>>,
	// At most one in-flight store read per flag; late arrivals wait on the Notify.
	in_flight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl FeatureFlagManager {
	pub fn new(store: Arc<dyn FlagStore>, cfg: &apex_config::Flags) -> Self {
		Self {
			store,
			snapshot_ttl: Duration::from_secs(cfg.snapshot_ttl_seconds),
			refresh_timeout: Duration::from_millis(cfg.refresh_timeout_ms),
			cache: Mutex::new(HashMap::new()),
			in_flight: Mutex::new(HashMap::new()),
		}
	}

	/// Never errors. Store failures fall back to the flag's fail mode: fail-open
	/// evaluates the last known-good snapshot, fail-closed disables.
	pub async fn is_enabled(&self, name: &str, user_id: &str) -> Evaluation {
		match self.lookup(name).await {
			Lookup::Found(flag) => evaluate(&flag, user_id),
			Lookup::Unknown => Evaluation { enabled: false, reason: Reason::UnknownFlag },
			Lookup::Unavailable { last_known } => match last_known {
				Some(flag) if flag.fail_mode == FailMode::Open => evaluate(&flag, user_id),
				_ => Evaluation { enabled: false, reason: Reason::StoreUnavailable },
			},
		}
	}

	pub async fn create_flag(&self, flag: FeatureFlag) -> Result<()> {
		if flag.name.is_empty() {
			return Err(Error::Validation { message: "flag name must not be empty".to_string() });
		}

		validate_percentage(flag.rollout_percentage)?;
		self.store.create(&flag).await?;
		self.invalidate(&flag.name);

		Ok(())
	}

	pub async fn set_rollout_percentage(&self, name: &str, percentage: u8) -> Result<()> {
		validate_percentage(percentage)?;
		self.store.set_rollout_percentage(name, percentage).await?;
		self.invalidate(name);

		Ok(())
	}

	pub async fn add_to_whitelist(&self, name: &str, user_id: &str) -> Result<()> {
		self.mutate_list(name, ListKind::Whitelist, user_id, true).await
	}

	pub async fn remove_from_whitelist(&self, name: &str, user_id: &str) -> Result<()> {
		self.mutate_list(name, ListKind::Whitelist, user_id, false).await
	}

	pub async fn add_to_blacklist(&self, name: &str, user_id: &str) -> Result<()> {
		self.mutate_list(name, ListKind::Blacklist, user_id, true).await
	}

	pub async fn remove_from_blacklist(&self, name: &str, user_id: &str) -> Result<()> {
		self.mutate_list(name, ListKind::Blacklist, user_id, false).await
	}

	/// Fresh read, bypassing the snapshot cache.
	pub async fn get_flag(&self, name: &str) -> Result<Option<FeatureFlag>> {
		self.store.fetch(name).await
	}

	pub async fn list_flags(&self) -> Result<Vec<FeatureFlag>> {
		self.store.list().await
	}

	pub async fn delete_flag(&self, name: &str) -> Result<()> {
		self.store.delete(name).await?;
		self.invalidate(name);

		Ok(())
	}

	pub async fn stats(&self) -> Result<FlagStats> {
		let flags = self.store.list().await?;
		let rolling_out =
			flags.iter().filter(|f| f.rollout_percentage > 0 && f.rollout_percentage < 100).count();
		let fully_rolled_out = flags.iter().filter(|f| f.rollout_percentage == 100).count();
		let cached = self.cache.lock().unwrap_or_else(|err| err.into_inner()).len();

		Ok(FlagStats { total: flags.len(), rolling_out, fully_rolled_out, cached })
	}

	async fn mutate_list(
		&self,
		name: &str,
		list: ListKind,
		user_id: &str,
		add: bool,
	) -> Result<()> {
		if user_id.is_empty() {
			return Err(Error::Validation { message: "user id must not be empty".to_string() });
		}

		if add {
			self.store.add_to_list(name, list, user_id).await?;
		} else {
			self.store.remove_from_list(name, list, user_id).await?;
		}

		self.invalidate(name);

		Ok(())
	}

	async fn lookup(&self, name: &str) -> Lookup {
		if let Some(cached) = self.cached(name, true) {
			return into_lookup(cached.flag);
		}

		let waiter = {
			let mut in_flight = self.in_flight.lock().unwrap_or_else(|err| err.into_inner());

			match in_flight.get(name) {
				Some(notify) => Some(notify.clone()),
				None => {
					in_flight.insert(name.to_string(), Arc::new(Notify::new()));

					None
				},
			}
		};

		if let Some(notify) = waiter {
			// A refresh is already running. Serve the stale snapshot when one
			// exists; otherwise wait for the refresh to land.
			if let Some(cached) = self.cached(name, false) {
				return into_lookup(cached.flag);
			}

			let _ = tokio::time::timeout(self.refresh_timeout, notify.notified()).await;

			return match self.cached(name, false) {
				Some(cached) => into_lookup(cached.flag),
				None => Lookup::Unavailable { last_known: None },
			};
		}

		let fetched = tokio::time::timeout(self.refresh_timeout, self.store.fetch(name)).await;
		let lookup = match fetched {
			Ok(Ok(flag)) => {
				let mut cache = self.cache.lock().unwrap_or_else(|err| err.into_inner());

				cache.insert(
					name.to_string(),
					CachedFlag { flag: flag.clone(), fetched_at: Instant::now() },
				);

				into_lookup(flag)
			},
			Ok(Err(err)) => {
				warn!(flag = name, error = %err, "Flag store read failed, applying fail mode.");

				Lookup::Unavailable { last_known: self.cached(name, false).and_then(|c| c.flag) }
			},
			Err(_) => {
				warn!(flag = name, "Flag store read timed out, applying fail mode.");

				Lookup::Unavailable { last_known: self.cached(name, false).and_then(|c| c.flag) }
			},
		};

		{
			let mut in_flight = self.in_flight.lock().unwrap_or_else(|err| err.into_inner());

			if let Some(notify) = in_flight.remove(name) {
				notify.notify_waiters();
			}
		}

		lookup
	}

	fn cached(&self, name: &str, require_fresh: bool) -> Option<CachedFlag> {
		let cache = self.cache.lock().unwrap_or_else(|err| err.into_inner());
		let entry = cache.get(name)?;

		if require_fresh && entry.fetched_at.elapsed() >= self.snapshot_ttl {
			return None;
		}

		Some(entry.clone())
	}

	fn invalidate(&self, name: &str) {
		self.cache.lock().unwrap_or_else(|err| err.into_inner()).remove(name);
	}
}

fn into_lookup(flag: Option<FeatureFlag>) -> Lookup {
	match flag {
		Some(flag) => Lookup::Found(flag),
		None => Lookup::Unknown,
	}
}

fn validate_percentage(percentage: u8) -> Result<()> {
	if percentage > 100 {
		return Err(Error::Validation {
			message: format!("rollout percentage must be within 0..=100, got {percentage}"),
		});
	}

	Ok(())
}
