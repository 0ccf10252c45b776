//! End-to-end scenarios against the orchestrator with in-memory backends

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use strata_context::{
    FusionWeights, HybridConfig, HybridRetriever, Orchestrator, OrchestratorConfig,
};
use strata_core::score::Tier;
use strata_core::types::{ContextItem, ContextRequest, Metadata, MetadataValue, RetrievalStrategy};
use strata_core::MetadataFilter;
use strata_graph::{Entity, GraphBackend, InMemoryGraph};
use strata_memory::{
    MemoryError, SessionConfig, VectorBackend, VectorDocument, VectorMatch,
};

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), MetadataValue::from(*v)))
        .collect()
}

fn config(immediate_size: usize, session_size: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        immediate_size,
        immediate_ttl_seconds: 60,
        session: SessionConfig {
            max_size: session_size,
            relevance_threshold: 0.1,
            consolidation_threshold: None,
        },
        async_long_term: false,
        ..OrchestratorConfig::default()
    }
}

/// A vector backend that accepts writes but is unreachable at query time
struct OfflineVectorBackend;

#[async_trait]
impl VectorBackend for OfflineVectorBackend {
    async fn add(&self, document: VectorDocument) -> strata_memory::Result<String> {
        Ok(document.id)
    }

    async fn add_batch(
        &self,
        documents: Vec<VectorDocument>,
    ) -> strata_memory::Result<Vec<String>> {
        Ok(documents.into_iter().map(|d| d.id).collect())
    }

    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
        _score_threshold: f32,
        _filters: Option<&MetadataFilter>,
    ) -> strata_memory::Result<Vec<VectorMatch>> {
        Err(MemoryError::VectorBackend("connection refused".to_string()))
    }

    async fn search_by_embedding(
        &self,
        _embedding: &[f32],
        _max_results: usize,
        _score_threshold: f32,
        _filters: Option<&MetadataFilter>,
    ) -> strata_memory::Result<Vec<VectorMatch>> {
        Err(MemoryError::VectorBackend("connection refused".to_string()))
    }

    async fn delete(&self, _id: &str) -> strata_memory::Result<bool> {
        Ok(false)
    }
}

/// Immediate recall: FIFO order, capacity eviction, newest first
#[tokio::test]
async fn immediate_recall_is_newest_first() {
    let orchestrator = Orchestrator::in_memory(config(3, 50));

    for content in ["A", "B", "C", "D"] {
        orchestrator
            .store(content, Metadata::new(), None, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let request = ContextRequest::new("")
        .with_max_results(10)
        .with_tiers(true, false, false);
    let response = orchestrator.retrieve(&request).await.unwrap();

    let contents: Vec<&str> = response.items.iter().map(|i| i.content.as_str()).collect();
    assert_eq!(contents, vec!["D", "C", "B"]);
    assert_eq!(response.immediate_count, 3);
    assert_eq!(response.session_count, 0);
}

/// Importance-weighted eviction keeps critical and high items resident
#[tokio::test]
async fn importance_retention_under_pressure() {
    let orchestrator = Orchestrator::in_memory(config(10, 5));

    for level in ["low", "normal", "high", "critical"] {
        orchestrator
            .store(
                &format!("{level} priority directive"),
                meta(&[("importance", level)]),
                Some(Tier::Session),
                None,
            )
            .await
            .unwrap();
    }
    for i in 0..15 {
        orchestrator
            .store(
                &format!("noise item {i}"),
                meta(&[("importance", "low")]),
                Some(Tier::Session),
                None,
            )
            .await
            .unwrap();
    }

    let request = ContextRequest::new("")
        .with_max_results(10)
        .with_tiers(false, true, false);
    let response = orchestrator.retrieve(&request).await.unwrap();

    let contents: Vec<&str> = response.items.iter().map(|i| i.content.as_str()).collect();
    assert!(contents.iter().any(|c| c.contains("critical")));
    assert!(contents.iter().any(|c| c.contains("high")));
    assert!(response.session_count <= 5);
}

/// Hybrid fusion degrades gracefully with the vector backend offline
#[tokio::test]
async fn hybrid_fusion_with_partial_backend() {
    let graph = Arc::new(InMemoryGraph::new());
    let topic = graph
        .add_entity(Entity::new(
            "Python ML".to_string(),
            "topic".to_string(),
            json!({}),
        ))
        .await
        .unwrap();
    let library = graph
        .add_entity(Entity::new(
            "scikit-learn".to_string(),
            "library".to_string(),
            json!({}),
        ))
        .await
        .unwrap();
    graph
        .add_relationship(&topic.id, &library.id, "implemented_by", json!({}))
        .await
        .unwrap();

    let retriever = HybridRetriever::new(HybridConfig {
        weights: FusionWeights::default(),
        ..HybridConfig::default()
    })
    .with_vector_backend(Arc::new(OfflineVectorBackend))
    .with_graph_backend(graph);

    let orchestrator = Orchestrator::new(config(10, 50), retriever);
    for (i, content) in [
        "Python ML libraries like scikit-learn",
        "Python ML model deployment patterns",
        "Python ML pipelines in production",
    ]
    .iter()
    .enumerate()
    {
        orchestrator
            .store(content, meta(&[("type", "fact"), ("doc", &i.to_string())]), None, None)
            .await
            .unwrap();
    }

    let request = ContextRequest::new("Python ML")
        .with_max_results(10)
        .with_strategy(RetrievalStrategy::Hybrid)
        .with_tiers(false, false, true);
    let response = orchestrator.retrieve(&request).await.unwrap();

    assert_eq!(response.items.len(), 4);
    assert_eq!(response.long_term_count, 4);
    for pair in response.items.windows(2) {
        assert!(pair[0].relevance_score >= pair[1].relevance_score);
    }
    assert!(response
        .backend_errors
        .iter()
        .any(|e| e.starts_with("vector:")));
}

/// The output token budget is honored
#[tokio::test]
async fn token_budget_honored() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));

    for i in 0..10 {
        let content = format!("item {i} {}", "padding word salad ".repeat(21));
        assert!(content.len() >= 380 && content.len() <= 420);
        orchestrator
            .store(&content, Metadata::new(), None, None)
            .await
            .unwrap();
    }

    let request = ContextRequest::new("")
        .with_max_results(10)
        .with_max_tokens(250)
        .with_tiers(true, false, false);
    let response = orchestrator.retrieve(&request).await.unwrap();

    assert!(response.items.len() <= 2);
    assert!(response.total_tokens <= 250);
    let estimated: usize = response
        .items
        .iter()
        .map(|i| i.content.chars().count() / 4)
        .sum();
    assert!(estimated <= 250);
}

/// The same content stored across three tiers surfaces exactly once
#[tokio::test]
async fn dedup_across_tiers() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));

    let content = "Rust ownership prevents data races at compile time";
    orchestrator
        .store(
            content,
            meta(&[("importance", "critical"), ("type", "fact")]),
            None,
            None,
        )
        .await
        .unwrap();

    // importance=critical reaches Session, type=fact reaches LongTerm
    let stats = orchestrator.statistics();
    assert_eq!(stats.immediate_stores, 1);
    assert_eq!(stats.session_stores, 1);
    assert_eq!(stats.long_term_stores, 1);

    let request = ContextRequest::new("Rust ownership prevents").with_max_results(10);
    let response = orchestrator.retrieve(&request).await.unwrap();

    let matching: Vec<&ContextItem> = response
        .items
        .iter()
        .filter(|i| i.content == content)
        .collect();
    assert_eq!(matching.len(), 1);
}

/// Store-then-retrieve returns the stored content
#[tokio::test]
async fn stored_content_is_immediately_retrievable() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));
    let content = "the deploy finished at noon";
    orchestrator
        .store(content, Metadata::new(), None, None)
        .await
        .unwrap();

    let request = ContextRequest::new(content).with_max_results(10);
    let response = orchestrator.retrieve(&request).await.unwrap();
    assert!(response.items.iter().any(|i| i.content == content));
}

/// Expired items never appear in any retrieval
#[tokio::test]
async fn expired_items_are_absent_everywhere() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));

    let expired = ContextItem::new("ephemeral token: abc123", Metadata::new())
        .with_expires_at(chrono::Utc::now() - chrono::Duration::seconds(5));
    orchestrator.store_item(expired, None).await.unwrap();
    orchestrator
        .store("long lived note", Metadata::new(), None, None)
        .await
        .unwrap();

    let request = ContextRequest::new("").with_max_results(10);
    let response = orchestrator.retrieve(&request).await.unwrap();
    assert!(!response.items.iter().any(|i| i.content.contains("abc123")));

    let keyword = ContextRequest::new("ephemeral token").with_max_results(10);
    let response = orchestrator.retrieve(&keyword).await.unwrap();
    assert!(!response.items.iter().any(|i| i.content.contains("abc123")));
}

/// Back-to-back identical retrievals are equal modulo the cache-hit flag
#[tokio::test]
async fn repeat_retrievals_are_stable() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));
    orchestrator
        .store("a stable fact", meta(&[("type", "fact")]), None, None)
        .await
        .unwrap();

    let request = ContextRequest::new("stable fact").with_max_results(5);
    let first = orchestrator.retrieve(&request).await.unwrap();
    let second = orchestrator.retrieve(&request).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    let mut unflagged = second;
    unflagged.cache_hit = false;
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&unflagged).unwrap()
    );
}

/// Tier masks restrict which tiers contribute
#[tokio::test]
async fn tier_masks_are_respected() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));
    orchestrator
        .store(
            "masked entry",
            meta(&[("importance", "critical"), ("type", "fact")]),
            None,
            None,
        )
        .await
        .unwrap();

    let immediate_only = ContextRequest::new("masked")
        .with_max_results(10)
        .with_tiers(true, false, false);
    let response = orchestrator.retrieve(&immediate_only).await.unwrap();
    assert_eq!(response.session_count, 0);
    assert_eq!(response.long_term_count, 0);
    assert_eq!(response.immediate_count, 1);

    let none = ContextRequest::new("masked")
        .with_max_results(10)
        .with_tiers(false, false, false);
    let response = orchestrator.retrieve(&none).await.unwrap();
    assert!(response.items.is_empty());
}

/// Conversation scoping narrows every tier
#[tokio::test]
async fn conversation_scoping_applies() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));
    orchestrator
        .store("alpha conversation note", Metadata::new(), None, Some("conv-a"))
        .await
        .unwrap();
    orchestrator
        .store("beta conversation note", Metadata::new(), None, Some("conv-b"))
        .await
        .unwrap();

    let request = ContextRequest::new("conversation note")
        .with_max_results(10)
        .with_conversation_id("conv-a");
    let response = orchestrator.retrieve(&request).await.unwrap();
    assert_eq!(response.items.len(), 1);
    assert!(response.items[0].content.starts_with("alpha"));
}

/// Metadata filters prune session and long-term candidates
#[tokio::test]
async fn metadata_filters_apply_across_tiers() {
    let orchestrator = Orchestrator::in_memory(config(10, 50));
    orchestrator
        .store(
            "release decision recorded",
            meta(&[("type", "decision"), ("team", "infra")]),
            None,
            None,
        )
        .await
        .unwrap();
    orchestrator
        .store(
            "release decision draft",
            meta(&[("type", "decision"), ("team", "app")]),
            None,
            None,
        )
        .await
        .unwrap();

    let request = ContextRequest::new("release decision")
        .with_max_results(10)
        .with_tiers(false, true, false)
        .with_filters(MetadataFilter::new().eq("team", "infra"));
    let response = orchestrator.retrieve(&request).await.unwrap();

    assert_eq!(response.items.len(), 1);
    assert!(response.items[0].content.ends_with("recorded"));
}
