use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Router, learning::FeedbackSample};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
	pub query_id: Uuid,
	pub clicked: bool,
	/// 1-based rank of the clicked item; discounts the click signal by position.
	#[serde(default)]
	pub click_position: Option<u32>,
	#[serde(default)]
	pub dwell_time_seconds: f64,
	#[serde(default)]
	pub explicit_rating: Option<f64>,
	#[serde(default)]
	pub result_count: u32,
	#[serde(default)]
	pub latency_ms: u64,
	pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAck {
	pub accepted: bool,
}

impl Router {
	/// Never errors and never blocks on the learning path. Feedback that cannot
	/// be correlated to a live query is dropped with a warning.
	pub fn record_feedback(&self, record: FeedbackRecord) -> FeedbackAck {
		let Some(entry) = self.correlation.take(&record.query_id) else {
			self.stats.correlation_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
			warn!(
				query_id = %record.query_id,
				"Feedback arrived without a live correlation entry, dropping it."
			);

			return FeedbackAck { accepted: false };
		};
		let reward = reward(&self.cfg.learning.reward, &record);

		debug!(query_id = %record.query_id, reward = reward, arms = ?entry.arms, "Feedback accepted.");
		self.queue.push(FeedbackSample { arms: entry.arms, embedding: entry.embedding, reward });
		self.stats.note_feedback(reward);

		FeedbackAck { accepted: true }
	}
}

/// Weighted blend of the usage signals, each normalized to [0,1]. A click is
/// discounted by its position; latency contributes what is left of the budget.
pub(crate) fn reward(cfg: &apex_config::Reward, record: &FeedbackRecord) -> f64 {
	let clicked = if record.clicked {
		let position = record.click_position.unwrap_or(1).max(1);

		1.0 / position as f64
	} else {
		0.0
	};
	let dwell_clamp = if cfg.dwell_clamp_seconds > 0.0 { cfg.dwell_clamp_seconds } else { 60.0 };
	let dwell = sanitize(record.dwell_time_seconds).clamp(0.0, dwell_clamp) / dwell_clamp;
	let rating_clamp = if cfg.rating_clamp > 0.0 { cfg.rating_clamp } else { 5.0 };
	let rating = record
		.explicit_rating
		.map(|r| sanitize(r).clamp(0.0, rating_clamp) / rating_clamp)
		.unwrap_or(0.0);
	let budget = cfg.latency_budget_ms.max(1) as f64;
	let latency = (1.0 - record.latency_ms as f64 / budget).clamp(0.0, 1.0);
	let total = cfg.clicked_weight * clicked
		+ cfg.dwell_weight * dwell
		+ cfg.rating_weight * rating
		+ cfg.latency_weight * latency;

	if total.is_finite() { total.clamp(0.0, 1.0) } else { 0.0 }
}

fn sanitize(value: f64) -> f64 {
	if value.is_finite() { value } else { 0.0 }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(clicked: bool) -> FeedbackRecord {
		FeedbackRecord {
			query_id: Uuid::new_v4(),
			clicked,
			click_position: None,
			dwell_time_seconds: 12.0,
			explicit_rating: Some(4.0),
			result_count: 10,
			latency_ms: 400,
			timestamp: OffsetDateTime::now_utc(),
		}
	}

	fn weights() -> apex_config::Reward {
		apex_config::Reward::default()
	}

	#[test]
	fn clicked_feedback_earns_more_than_unclicked() {
		assert!(reward(&weights(), &record(true)) > reward(&weights(), &record(false)));
	}

	#[test]
	fn deeper_clicks_earn_less() {
		let mut top = record(true);
		let mut deep = record(true);

		top.click_position = Some(1);
		deep.click_position = Some(5);

		assert!(reward(&weights(), &top) > reward(&weights(), &deep));
	}

	#[test]
	fn reward_components_are_clamped() {
		let mut extreme = record(true);

		extreme.dwell_time_seconds = 1e9;
		extreme.explicit_rating = Some(100.0);
		extreme.latency_ms = 0;

		let value = reward(&weights(), &extreme);

		assert!((0.0..=1.0).contains(&value));
		assert!((value - 1.0).abs() < 1e-12);
	}

	#[test]
	fn latency_past_the_budget_contributes_nothing() {
		let mut slow = record(false);

		slow.dwell_time_seconds = 0.0;
		slow.explicit_rating = None;
		slow.latency_ms = 10_000;

		assert!((reward(&weights(), &slow) - 0.0).abs() < 1e-12);
	}

	#[test]
	fn non_finite_signals_are_sanitized() {
		let mut bad = record(false);

		bad.dwell_time_seconds = f64::NAN;
		bad.explicit_rating = Some(f64::INFINITY);

		let value = reward(&weights(), &bad);

		assert!(value.is_finite());
		assert!((0.0..=1.0).contains(&value));
	}
}
