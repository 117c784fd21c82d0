//! Linear contextual bandit (LinUCB) over backend arms.
//!
//! Each arm keeps ridge-regression sufficient statistics `(A, b)` with `A`
//! initialized to `lambda * I`, so a never-pulled arm carries a dominant
//! exploration bonus and is sampled at least once. `A_inv` is maintained
//! incrementally with Sherman-Morrison rank-1 updates so scoring never
//! inverts a matrix. Updates to distinct arms commute; updates to the same
//! arm must be applied in arrival order by a single writer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinUcbConfig {
	/// Context vector dimension (must be >= 1).
	pub dim: usize,
	/// Ridge regularization, the diagonal of a fresh `A`.
	pub lambda: f64,
	/// Exploration strength.
	pub alpha: f64,
	/// Arms whose UCB is within this relative margin of the top score are co-selected.
	pub selection_margin: f64,
	/// Upper bound on the number of margin-selected arms.
	pub max_fanout: usize,
}
impl Default for LinUcbConfig {
	fn default() -> Self {
		Self { dim: 8, lambda: 1.0, alpha: 0.5, selection_margin: 0.1, max_fanout: 3 }
	}
}

#[derive(Debug, Clone)]
struct ArmState {
	a: Vec<f64>,
	a_inv: Vec<f64>,
	b: Vec<f64>,
	pull_count: u64,
	cumulative_reward: f64,
}
impl ArmState {
	fn new(dim: usize, lambda: f64) -> Self {
		let lambda = if lambda.is_finite() && lambda > 0.0 { lambda } else { 1.0 };
		let mut a = vec![0.0; dim * dim];
		let mut a_inv = vec![0.0; dim * dim];

		for i in 0..dim {
			a[i * dim + i] = lambda;
			a_inv[i * dim + i] = 1.0 / lambda;
		}

		Self { a, a_inv, b: vec![0.0; dim], pull_count: 0, cumulative_reward: 0.0 }
	}

	fn is_consistent(&self, dim: usize) -> bool {
		self.a.len() == dim * dim
			&& self.a_inv.len() == dim * dim
			&& self.b.len() == dim
			&& self.a.iter().all(|v| v.is_finite())
			&& self.a_inv.iter().all(|v| v.is_finite())
			&& self.b.iter().all(|v| v.is_finite())
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmScore {
	pub ucb: f64,
	pub mean: f64,
	pub bonus: f64,
	pub pull_count: u64,
}

#[derive(Debug, Clone)]
pub struct Selection {
	/// Chosen arms, margin-selected ones first in descending UCB order, then forced arms.
	pub arms: Vec<String>,
	pub scores: BTreeMap<String, ArmScore>,
	/// True when the selection includes a never-pulled arm.
	pub explored: bool,
	/// Arms included by intent override rather than score.
	pub forced: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmStats {
	pub pull_count: u64,
	pub cumulative_reward: f64,
	pub avg_reward: f64,
}

/// Serializable per-arm sufficient statistics for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmSnapshot {
	pub a: Vec<f64>,
	pub a_inv: Vec<f64>,
	pub b: Vec<f64>,
	pub pull_count: u64,
	pub cumulative_reward: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditSnapshot {
	pub dim: usize,
	pub arms: BTreeMap<String, ArmSnapshot>,
}

#[derive(Debug, Clone)]
pub struct ContextualBandit {
	cfg: LinUcbConfig,
	arms: BTreeMap<String, ArmState>,
}
impl ContextualBandit {
	pub fn new<I, S>(cfg: LinUcbConfig, arm_names: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut bandit = Self { cfg, arms: BTreeMap::new() };

		for name in arm_names {
			bandit.ensure_arm(&name.into());
		}

		bandit
	}

	pub fn dim(&self) -> usize {
		self.cfg.dim.max(1)
	}

	pub fn arm_names(&self) -> Vec<String> {
		self.arms.keys().cloned().collect()
	}

	fn ensure_arm(&mut self, name: &str) {
		let dim = self.dim();
		let lambda = self.cfg.lambda;

		self.arms.entry(name.to_string()).or_insert_with(|| ArmState::new(dim, lambda));
	}

	fn sanitize_context(&self, context: &[f32]) -> Vec<f64> {
		let dim = self.dim();
		let mut out = vec![0.0; dim];

		for (i, slot) in out.iter_mut().enumerate() {
			let raw = context.get(i).copied().unwrap_or(0.0) as f64;

			*slot = if raw.is_finite() { raw } else { 0.0 };
		}

		out
	}

	fn score_arm(&self, state: &ArmState, x: &[f64]) -> ArmScore {
		let dim = self.dim();
		let theta = mat_vec(&state.a_inv, dim, &state.b);
		let mean = dot(&theta, x);
		let ax = mat_vec(&state.a_inv, dim, x);
		let var = dot(x, &ax).max(0.0);
		let alpha = if self.cfg.alpha.is_finite() && self.cfg.alpha >= 0.0 { self.cfg.alpha } else { 0.0 };
		let bonus = alpha * var.sqrt();

		ArmScore { ucb: mean + bonus, mean, bonus, pull_count: state.pull_count }
	}

	pub fn scores(&self, context: &[f32]) -> BTreeMap<String, ArmScore> {
		let x = self.sanitize_context(context);

		self.arms.iter().map(|(name, state)| (name.clone(), self.score_arm(state, &x))).collect()
	}

	/// Select every arm within the relative margin of the top UCB, capped at the fan-out
	/// bound. Forced arms are always part of the dispatch set, beyond the cap if needed.
	pub fn select(&self, context: &[f32], forced: &[String]) -> Selection {
		let scores = self.scores(context);
		let mut ranked: Vec<(&String, &ArmScore)> = scores.iter().collect();

		ranked.sort_by(|(left_name, left), (right_name, right)| {
			right
				.ucb
				.partial_cmp(&left.ucb)
				.unwrap_or(std::cmp::Ordering::Equal)
				.then_with(|| left_name.cmp(right_name))
		});

		let mut arms = Vec::new();

		if let Some((_, top)) = ranked.first() {
			let margin = self.cfg.selection_margin.clamp(0.0, 1.0);
			let threshold = if top.ucb > 0.0 { top.ucb * (1.0 - margin) } else { top.ucb };

			for (name, score) in &ranked {
				if arms.len() >= self.cfg.max_fanout.max(1) {
					break;
				}
				if score.ucb >= threshold {
					arms.push((*name).clone());
				}
			}
		}

		let mut forced_out = Vec::new();

		for name in forced {
			if self.arms.contains_key(name) && !arms.contains(name) {
				arms.push(name.clone());
				forced_out.push(name.clone());
			}
		}

		let explored =
			arms.iter().any(|name| scores.get(name).map(|s| s.pull_count == 0).unwrap_or(false));

		Selection { arms, scores, explored, forced: forced_out }
	}

	/// Apply one reward observation to one arm. Single-writer: callers must serialize
	/// updates to the same arm in arrival order.
	pub fn update(&mut self, arm: &str, context: &[f32], reward: f64) {
		let dim = self.dim();
		let x = self.sanitize_context(context);
		let r = clamp01(reward);
		let Some(state) = self.arms.get_mut(arm) else {
			return;
		};

		// A += x * x^T keeps A symmetric positive-definite.
		for i in 0..dim {
			for j in 0..dim {
				state.a[i * dim + j] += x[i] * x[j];
			}
		}

		// Sherman-Morrison: A_inv -= (A_inv x)(A_inv x)^T / (1 + x^T A_inv x).
		let ax = mat_vec(&state.a_inv, dim, &x);
		let denom = 1.0 + dot(&x, &ax);

		if denom.is_finite() && denom > 1e-12 {
			for i in 0..dim {
				for j in 0..dim {
					state.a_inv[i * dim + j] -= (ax[i] * ax[j]) / denom;
				}
			}
		}

		for (i, xi) in x.iter().enumerate() {
			state.b[i] += r * xi;
		}

		state.pull_count = state.pull_count.saturating_add(1);
		state.cumulative_reward += r;
	}

	pub fn stats(&self) -> BTreeMap<String, ArmStats> {
		self.arms
			.iter()
			.map(|(name, state)| {
				let avg_reward = if state.pull_count == 0 {
					0.0
				} else {
					state.cumulative_reward / state.pull_count as f64
				};

				(
					name.clone(),
					ArmStats {
						pull_count: state.pull_count,
						cumulative_reward: state.cumulative_reward,
						avg_reward,
					},
				)
			})
			.collect()
	}

	pub fn snapshot(&self) -> BanditSnapshot {
		let arms = self
			.arms
			.iter()
			.map(|(name, state)| {
				(
					name.clone(),
					ArmSnapshot {
						a: state.a.clone(),
						a_inv: state.a_inv.clone(),
						b: state.b.clone(),
						pull_count: state.pull_count,
						cumulative_reward: state.cumulative_reward,
					},
				)
			})
			.collect();

		BanditSnapshot { dim: self.dim(), arms }
	}

	/// Restore persisted sufficient statistics. Arms absent from the snapshot keep their
	/// fresh state; snapshot arms with a dimension mismatch or non-finite values are
	/// ignored so the arm re-initializes instead of poisoning scoring.
	pub fn restore(&mut self, snapshot: BanditSnapshot) {
		let dim = self.dim();

		for (name, arm) in snapshot.arms {
			if !self.arms.contains_key(&name) {
				continue;
			}

			let state = ArmState {
				a: arm.a,
				a_inv: arm.a_inv,
				b: arm.b,
				pull_count: arm.pull_count,
				cumulative_reward: arm.cumulative_reward,
			};

			if !state.is_consistent(dim) {
				continue;
			}

			self.arms.insert(name, state);
		}
	}
}

fn dot(lhs: &[f64], rhs: &[f64]) -> f64 {
	lhs.iter().zip(rhs.iter()).map(|(l, r)| l * r).sum()
}

fn mat_vec(matrix: &[f64], dim: usize, x: &[f64]) -> Vec<f64> {
	let mut out = vec![0.0; dim];

	for (i, slot) in out.iter_mut().enumerate() {
		let row = &matrix[i * dim..(i + 1) * dim];

		*slot = dot(row, x);
	}

	out
}

fn clamp01(value: f64) -> f64 {
	if !value.is_finite() {
		return 0.0;
	}

	value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bandit(dim: usize, alpha: f64) -> ContextualBandit {
		ContextualBandit::new(
			LinUcbConfig { dim, lambda: 1.0, alpha, selection_margin: 0.1, max_fanout: 2 },
			["graph", "relational", "vector"],
		)
	}

	#[test]
	fn fresh_arms_carry_dominant_exploration_bonus() {
		let mut bandit = bandit(2, 1.0);
		let ctx = [1.0_f32, 0.0];

		for _ in 0..20 {
			bandit.update("graph", &ctx, 0.9);
		}

		let scores = bandit.scores(&ctx);

		assert!(scores["relational"].bonus > scores["graph"].bonus);
		assert_eq!(scores["relational"].pull_count, 0);

		let selection = bandit.select(&ctx, &[]);

		assert!(selection.explored);
	}

	#[test]
	fn updates_on_disjoint_arms_commute() {
		let ctx_a = [1.0_f32, 0.25];
		let ctx_b = [0.0_f32, 1.0];
		let mut forward = bandit(2, 0.5);
		let mut backward = bandit(2, 0.5);

		forward.update("graph", &ctx_a, 0.8);
		forward.update("vector", &ctx_b, 0.2);

		backward.update("vector", &ctx_b, 0.2);
		backward.update("graph", &ctx_a, 0.8);

		let probe = [0.5_f32, 0.5];
		let lhs = forward.scores(&probe);
		let rhs = backward.scores(&probe);

		for name in ["graph", "relational", "vector"] {
			assert!((lhs[name].ucb - rhs[name].ucb).abs() < 1e-12, "ucb mismatch for {name}");
			assert!((lhs[name].mean - rhs[name].mean).abs() < 1e-12, "mean mismatch for {name}");
		}
	}

	#[test]
	fn design_matrix_stays_symmetric_under_updates() {
		let mut bandit = bandit(3, 0.5);
		let contexts = [[1.0_f32, 0.2, -0.4], [0.1, 0.9, 0.3], [0.7, 0.7, 0.7]];

		for (i, ctx) in contexts.iter().cycle().take(30).enumerate() {
			bandit.update("graph", ctx, (i % 2) as f64);
		}

		let state = &bandit.arms["graph"];

		for i in 0..3 {
			for j in 0..3 {
				let aij = state.a[i * 3 + j];
				let aji = state.a[j * 3 + i];
				let inv_ij = state.a_inv[i * 3 + j];
				let inv_ji = state.a_inv[j * 3 + i];

				assert!((aij - aji).abs() < 1e-9);
				assert!((inv_ij - inv_ji).abs() < 1e-9);
			}
		}
	}

	#[test]
	fn learns_to_prefer_the_rewarding_arm() {
		let mut bandit = bandit(2, 0.1);
		let ctx = [1.0_f32, 0.5];

		for _ in 0..100 {
			bandit.update("graph", &ctx, 1.0);
			bandit.update("relational", &ctx, 0.0);
			bandit.update("vector", &ctx, 0.0);
		}

		let selection = bandit.select(&ctx, &[]);

		assert_eq!(selection.arms.first().map(String::as_str), Some("graph"));
	}

	#[test]
	fn forced_arms_join_the_selection_beyond_the_cap() {
		let mut bandit = bandit(2, 0.1);
		let ctx = [1.0_f32, 0.0];

		for _ in 0..50 {
			bandit.update("graph", &ctx, 1.0);
			bandit.update("relational", &ctx, 0.9);
			bandit.update("vector", &ctx, 0.0);
		}

		let selection = bandit.select(&ctx, &["vector".to_string()]);

		assert!(selection.arms.contains(&"vector".to_string()));
		assert_eq!(selection.forced, vec!["vector".to_string()]);
	}

	#[test]
	fn rewards_are_clamped_to_unit_interval() {
		let mut bandit = bandit(2, 0.5);
		let ctx = [1.0_f32, 0.0];

		bandit.update("graph", &ctx, 42.0);
		bandit.update("graph", &ctx, f64::NAN);
		bandit.update("graph", &ctx, -3.0);

		let stats = bandit.stats();

		assert_eq!(stats["graph"].pull_count, 3);
		assert!((stats["graph"].cumulative_reward - 1.0).abs() < 1e-12);
	}

	#[test]
	fn snapshot_restore_preserves_scores() {
		let mut trained = bandit(3, 0.5);
		let ctx = [0.3_f32, 0.6, 0.1];

		for i in 0..40 {
			let reward = if i % 3 == 0 { 0.9 } else { 0.2 };

			trained.update("graph", &ctx, reward);
			trained.update("vector", &ctx, 1.0 - reward);
		}

		let mut restored = bandit(3, 0.5);

		restored.restore(trained.snapshot());

		let lhs = trained.scores(&ctx);
		let rhs = restored.scores(&ctx);

		for name in ["graph", "relational", "vector"] {
			assert!((lhs[name].ucb - rhs[name].ucb).abs() < 1e-12);
		}
	}

	#[test]
	fn restore_skips_dimension_mismatched_arms() {
		let mut bandit = bandit(2, 0.5);
		let snapshot = BanditSnapshot {
			dim: 3,
			arms: BTreeMap::from([(
				"graph".to_string(),
				ArmSnapshot {
					a: vec![1.0; 9],
					a_inv: vec![1.0; 9],
					b: vec![0.5; 3],
					pull_count: 7,
					cumulative_reward: 3.0,
				},
			)]),
		};

		bandit.restore(snapshot);

		assert_eq!(bandit.stats()["graph"].pull_count, 0);
	}
}
