//! Percentage-based feature rollout with per-user whitelists and blacklists.
//!
//! Flags live in the durable store; evaluation reads go through a per-flag
//! in-memory snapshot with a TTL, so the hot path almost never touches the
//! store. Evaluation never returns an error: store failures are absorbed by
//! the flag's fail mode.

pub mod hash;
pub mod manager;
pub mod store;

mod error;

use std::{future::Future, pin::Pin};

use time::OffsetDateTime;

pub use error::{Error, Result};
pub use manager::{FeatureFlagManager, FlagStats};
pub use store::{FlagStore, ListKind, PgFlagStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
	/// Store outage keeps serving the last known-good snapshot.
	Open,
	/// Store outage disables the flag.
	Closed,
}
impl FailMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Open => "open",
			Self::Closed => "closed",
		}
	}

	/// Unrecognized modes read back as closed.
	pub fn parse(s: &str) -> Self {
		match s {
			"open" => Self::Open,
			_ => Self::Closed,
		}
	}
}

#[derive(Debug, Clone)]
pub struct FeatureFlag {
	pub name: String,
	pub description: String,
	/// `false` turns the flag off for everyone except the whitelist.
	pub default_enabled: bool,
	/// Percentage of users in the rollout bucket, 0 through 100.
	pub rollout_percentage: u8,
	pub whitelist: Vec<String>,
	pub blacklist: Vec<String>,
	pub fail_mode: FailMode,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl FeatureFlag {
	pub fn new(name: &str, description: &str, rollout_percentage: u8, fail_mode: FailMode) -> Self {
		let now = OffsetDateTime::now_utc();

		Self {
			name: name.to_string(),
			description: description.to_string(),
			default_enabled: true,
			rollout_percentage,
			whitelist: Vec::new(),
			blacklist: Vec::new(),
			fail_mode,
			created_at: now,
			updated_at: now,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
	pub enabled: bool,
	pub reason: Reason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
	Whitelist,
	Blacklist,
	GlobalDisabled,
	BucketRollout,
	UnknownFlag,
	StoreUnavailable,
}
impl Reason {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Whitelist => "whitelist",
			Self::Blacklist => "blacklist",
			Self::GlobalDisabled => "global_disabled",
			Self::BucketRollout => "bucket_rollout",
			Self::UnknownFlag => "unknown_flag",
			Self::StoreUnavailable => "store_unavailable",
		}
	}
}

/// Whitelist wins over everything, blacklist over everything but the
/// whitelist, then the global kill switch, then the rollout bucket.
pub fn evaluate(flag: &FeatureFlag, user_id: &str) -> Evaluation {
	if flag.whitelist.iter().any(|u| u == user_id) {
		return Evaluation { enabled: true, reason: Reason::Whitelist };
	}
	if flag.blacklist.iter().any(|u| u == user_id) {
		return Evaluation { enabled: false, reason: Reason::Blacklist };
	}
	if !flag.default_enabled {
		return Evaluation { enabled: false, reason: Reason::GlobalDisabled };
	}

	let bucket = hash::rollout_bucket(user_id, &flag.name);

	Evaluation { enabled: bucket < flag.rollout_percentage, reason: Reason::BucketRollout }
}
