use apex_fusion::{BackendList, FusedItem, FusionPolicy, RankedItem, fuse};
use serde_json::json;

fn item(id: &str, score: f32) -> RankedItem {
	RankedItem {
		id: id.to_string(),
		score,
		payload: json!({ "id": id }),
		embedding: None,
		source: None,
	}
}

fn item_with_embedding(id: &str, score: f32, embedding: Vec<f32>) -> RankedItem {
	RankedItem { embedding: Some(embedding), ..item(id, score) }
}

fn item_with_source(id: &str, score: f32, source: &str) -> RankedItem {
	RankedItem { source: Some(source.to_string()), ..item(id, score) }
}

fn policy() -> FusionPolicy {
	FusionPolicy { rrf_k: 60.0, diversity_weight: 0.3, diversity_sim_threshold: 0.85, max_results: 10 }
}

fn lists() -> Vec<BackendList> {
	vec![
		BackendList {
			backend: "graph".to_string(),
			items: vec![item("doc-a", 0.9), item("doc-b", 0.7), item("doc-c", 0.5)],
		},
		BackendList {
			backend: "vector".to_string(),
			items: vec![item("doc-b", 0.95), item("doc-a", 0.6)],
		},
	]
}

#[test]
fn items_on_multiple_backends_outrank_single_backend_items() {
	let fused = fuse(&lists(), &policy());
	let ids: Vec<&str> = fused.iter().map(|item| item.id.as_str()).collect();

	assert_eq!(ids[0], "doc-a");
	assert_eq!(ids[1], "doc-b");
	assert_eq!(ids[2], "doc-c");

	// doc-a: 1/61 + 1/62, doc-b: 1/62 + 1/61, doc-c: 1/62... ranks differ per backend.
	let expected_a = 1.0 / 61.0 + 1.0 / 62.0;

	assert!((fused[0].score - expected_a).abs() < 1e-12);
}

#[test]
fn fused_items_are_annotated_with_contributing_backends() {
	let fused = fuse(&lists(), &policy());
	let doc_a = fused.iter().find(|item| item.id == "doc-a").expect("doc-a fused");
	let doc_c = fused.iter().find(|item| item.id == "doc-c").expect("doc-c fused");

	assert_eq!(doc_a.contributing_backends, vec!["graph".to_string(), "vector".to_string()]);
	assert_eq!(doc_c.contributing_backends, vec!["graph".to_string()]);
}

#[test]
fn fusion_is_idempotent() {
	let first: Vec<FusedItem> = fuse(&lists(), &policy());
	let second: Vec<FusedItem> = fuse(&lists(), &policy());

	assert_eq!(first, second);
}

#[test]
fn equal_rrf_scores_break_ties_on_local_confidence_then_id() {
	let lists = vec![
		BackendList { backend: "graph".to_string(), items: vec![item("doc-b", 0.2)] },
		BackendList { backend: "vector".to_string(), items: vec![item("doc-a", 0.9)] },
	];
	let fused = fuse(&lists, &policy());

	assert_eq!(fused[0].id, "doc-a");

	let lists = vec![
		BackendList { backend: "graph".to_string(), items: vec![item("doc-b", 0.5)] },
		BackendList { backend: "vector".to_string(), items: vec![item("doc-a", 0.5)] },
	];
	let fused = fuse(&lists, &policy());

	assert_eq!(fused[0].id, "doc-a");
}

#[test]
fn near_duplicate_embeddings_are_penalized_below_distinct_items() {
	let lists = vec![BackendList {
		backend: "vector".to_string(),
		items: vec![
			item_with_embedding("doc-a", 0.9, vec![1.0, 0.0]),
			item_with_embedding("doc-a-copy", 0.89, vec![0.999, 0.01]),
			item_with_embedding("doc-d", 0.5, vec![0.0, 1.0]),
		],
	}];
	let fused = fuse(&lists, &policy());
	let ids: Vec<&str> = fused.iter().map(|item| item.id.as_str()).collect();

	assert_eq!(ids, vec!["doc-a", "doc-d", "doc-a-copy"]);
}

#[test]
fn shared_source_counts_as_full_similarity() {
	let lists = vec![BackendList {
		backend: "relational".to_string(),
		items: vec![
			item_with_source("doc-a", 0.9, "invoice-123"),
			item_with_source("doc-a-page-2", 0.85, "invoice-123"),
			item_with_source("doc-e", 0.3, "invoice-999"),
		],
	}];
	let fused = fuse(&lists, &policy());
	let ids: Vec<&str> = fused.iter().map(|item| item.id.as_str()).collect();

	assert_eq!(ids, vec!["doc-a", "doc-e", "doc-a-page-2"]);
}

#[test]
fn output_is_capped_at_max_results() {
	let items: Vec<RankedItem> = (0..50).map(|i| item(&format!("doc-{i:02}"), 0.5)).collect();
	let lists = vec![BackendList { backend: "vector".to_string(), items }];
	let fused = fuse(&lists, &FusionPolicy { max_results: 5, ..policy() });

	assert_eq!(fused.len(), 5);
}

#[test]
fn duplicate_ids_within_one_backend_count_once() {
	let lists = vec![BackendList {
		backend: "graph".to_string(),
		items: vec![item("doc-a", 0.9), item("doc-a", 0.8)],
	}];
	let fused = fuse(&lists, &policy());

	assert_eq!(fused.len(), 1);
	assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-12);
}

#[test]
fn empty_input_fuses_to_empty_output() {
	assert!(fuse(&[], &policy()).is_empty());
}
