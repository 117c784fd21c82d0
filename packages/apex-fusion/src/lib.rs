//! Reciprocal Rank Fusion over per-backend ranked lists, followed by a greedy
//! diversity re-rank. Backend-local scores are not comparable across backends,
//! so fusion is rank-based; local scores only break ties.

use std::{
	cmp::Ordering,
	collections::{HashMap, HashSet},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct FusionPolicy {
	/// RRF damping constant, the `k` in `1 / (k + rank)`.
	pub rrf_k: f64,
	/// Penalty applied to a candidate's fused score per unit of similarity to an
	/// already-selected item.
	pub diversity_weight: f64,
	/// Candidates below this similarity to every selected item are not penalized.
	pub diversity_sim_threshold: f32,
	pub max_results: usize,
}
impl Default for FusionPolicy {
	fn default() -> Self {
		Self { rrf_k: 60.0, diversity_weight: 0.3, diversity_sim_threshold: 0.85, max_results: 20 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedItem {
	pub id: String,
	/// Backend-local confidence, meaningful only within one backend's list.
	pub score: f32,
	pub payload: Value,
	#[serde(default)]
	pub embedding: Option<Vec<f32>>,
	#[serde(default)]
	pub source: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackendList {
	pub backend: String,
	pub items: Vec<RankedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedItem {
	pub id: String,
	pub score: f64,
	pub payload: Value,
	pub contributing_backends: Vec<String>,
}

struct Candidate {
	id: String,
	rrf_score: f64,
	best_local_score: f32,
	payload: Value,
	embedding: Option<Vec<f32>>,
	source: Option<String>,
	contributing_backends: Vec<String>,
}

pub fn fuse(lists: &[BackendList], policy: &FusionPolicy) -> Vec<FusedItem> {
	let mut by_id: HashMap<String, Candidate> = HashMap::new();
	let k = if policy.rrf_k.is_finite() && policy.rrf_k > 0.0 { policy.rrf_k } else { 60.0 };

	for list in lists {
		let mut seen = HashSet::new();

		for (idx, item) in list.items.iter().enumerate() {
			// Only the best rank of a duplicate within one backend list counts.
			if !seen.insert(item.id.as_str()) {
				continue;
			}

			let rank = idx as f64 + 1.0;
			let contribution = 1.0 / (k + rank);

			match by_id.get_mut(&item.id) {
				Some(existing) => {
					existing.rrf_score += contribution;
					existing.best_local_score = existing.best_local_score.max(item.score);

					if existing.embedding.is_none() {
						existing.embedding = item.embedding.clone();
					}
					if existing.source.is_none() {
						existing.source = item.source.clone();
					}
					if !existing.contributing_backends.contains(&list.backend) {
						existing.contributing_backends.push(list.backend.clone());
					}
				},
				None => {
					by_id.insert(
						item.id.clone(),
						Candidate {
							id: item.id.clone(),
							rrf_score: contribution,
							best_local_score: item.score,
							payload: item.payload.clone(),
							embedding: item.embedding.clone(),
							source: item.source.clone(),
							contributing_backends: vec![list.backend.clone()],
						},
					);
				},
			}
		}
	}

	let mut candidates: Vec<Candidate> = by_id.into_values().collect();

	candidates.sort_by(|left, right| {
		cmp_f64_desc(left.rrf_score, right.rrf_score)
			.then_with(|| cmp_f32_desc(left.best_local_score, right.best_local_score))
			.then_with(|| left.id.cmp(&right.id))
	});

	let selected = select_diverse(candidates, policy);

	selected
		.into_iter()
		.map(|(candidate, score)| {
			let mut contributing_backends = candidate.contributing_backends;

			contributing_backends.sort();

			FusedItem { id: candidate.id, score, payload: candidate.payload, contributing_backends }
		})
		.collect()
}

/// Greedy re-rank: each round picks the remaining candidate with the best fused
/// score after the similarity penalty against everything already selected.
fn select_diverse(candidates: Vec<Candidate>, policy: &FusionPolicy) -> Vec<(Candidate, f64)> {
	let cap = policy.max_results.max(1);

	if candidates.is_empty() {
		return Vec::new();
	}

	let weight = policy.diversity_weight.clamp(0.0, 1.0);
	let mut remaining: Vec<Candidate> = candidates;
	let mut selected: Vec<(Candidate, f64)> = Vec::new();
	let first = remaining.remove(0);
	let first_score = first.rrf_score;

	selected.push((first, first_score));

	while selected.len() < cap && !remaining.is_empty() {
		let mut best_pos = 0;
		let mut best_score = f64::NEG_INFINITY;

		for (pos, candidate) in remaining.iter().enumerate() {
			let similarity = max_similarity_to_selected(candidate, &selected);
			let penalty = if similarity >= policy.diversity_sim_threshold as f64 {
				weight * similarity
			} else {
				0.0
			};
			let score = candidate.rrf_score - penalty;

			if score > best_score
				|| (score == best_score && candidate.id < remaining[best_pos].id)
			{
				best_pos = pos;
				best_score = score;
			}
		}

		let candidate = remaining.remove(best_pos);

		selected.push((candidate, best_score));
	}

	selected
}

fn max_similarity_to_selected(candidate: &Candidate, selected: &[(Candidate, f64)]) -> f64 {
	let mut max_similarity = 0.0_f64;

	for (picked, _) in selected {
		let similarity = pair_similarity(candidate, picked);

		if similarity > max_similarity {
			max_similarity = similarity;
		}
	}

	max_similarity
}

fn pair_similarity(lhs: &Candidate, rhs: &Candidate) -> f64 {
	if let (Some(left), Some(right)) = (lhs.source.as_deref(), rhs.source.as_deref())
		&& left == right
	{
		return 1.0;
	}

	match (lhs.embedding.as_deref(), rhs.embedding.as_deref()) {
		(Some(left), Some(right)) =>
			cosine_similarity(left, right).map(|sim| sim.max(0.0) as f64).unwrap_or(0.0),
		_ => 0.0,
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

fn cmp_f64_desc(a: f64, b: f64) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	cmp_f64_desc(a as f64, b as f64)
}
