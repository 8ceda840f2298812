//! Integration tests for EmbeddingService.

use foodflow_core::{
    EmbedSummary, EmbeddingService, ProductCollection, ProgressState, ProgressTracker, Selection,
    SilentReporter, SyncConfig,
};

use crate::integration::common::{
    MockEmbeddingBackend, RecordingReporter, embedded_product, local_product, remote_product,
};

fn local_collection(n: usize) -> ProductCollection {
    ProductCollection::from(
        (0..n)
            .map(|i| local_product(&format!("p{i}"), &format!("{:04}", i)))
            .collect::<Vec<_>>(),
    )
}

fn select_all(collection: &ProductCollection) -> Selection {
    collection.iter().map(|p| p.id.clone()).collect()
}

fn config(batch_size: usize, concurrency: usize) -> SyncConfig {
    SyncConfig::default()
        .with_embedding_batch_size(batch_size)
        .with_embedding_concurrency(concurrency)
}

#[tokio::test]
async fn test_embeds_in_batches() {
    // Arrange: ten products, batches of four
    let mut collection = local_collection(10);
    let selection = select_all(&collection);
    let backend = MockEmbeddingBackend::new();
    let service = EmbeddingService::with_config(backend.clone(), config(4, 2));
    let tracker = ProgressTracker::new();

    // Act
    let summary = service
        .embed_selected(&mut collection, &selection, &tracker, &SilentReporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(
        summary,
        EmbedSummary {
            embedded: 10,
            skipped: 0,
            failed: 0,
            cancelled: false
        }
    );
    assert_eq!(backend.batch_sizes(), vec![2, 4, 4]);
    assert!(collection.iter().all(|p| p.has_embeddings()));
    assert_eq!(
        tracker.snapshot(),
        ProgressState {
            active: false,
            total: 10,
            done: 10,
            failed: 0
        }
    );
    assert_eq!(selection.len(), 10, "selection is left unchanged");
}

#[tokio::test]
async fn test_each_key_sent_exactly_once() {
    let mut collection = local_collection(25);
    let selection = select_all(&collection);
    let backend = MockEmbeddingBackend::new().with_latency(1, 5);
    let service = EmbeddingService::with_config(backend.clone(), config(7, 3));

    service
        .embed_selected(
            &mut collection,
            &selection,
            &ProgressTracker::new(),
            &SilentReporter,
        )
        .await
        .unwrap();

    let mut sent: Vec<String> = backend
        .recorded_calls()
        .into_iter()
        .flat_map(|c| c.ids)
        .collect();
    sent.sort();
    let mut expected: Vec<String> = selection.ids().to_vec();
    expected.sort();
    assert_eq!(sent, expected);
    assert!(backend.in_flight.max() <= 3);
}

#[tokio::test]
async fn test_all_cached_makes_no_backend_calls() {
    let mut collection = ProductCollection::from(vec![
        embedded_product("a", "1"),
        embedded_product("b", "2"),
        embedded_product("c", "3"),
    ]);
    let selection = select_all(&collection);
    let backend = MockEmbeddingBackend::new();
    let service = EmbeddingService::new(backend.clone());
    let tracker = ProgressTracker::new();
    let reporter = RecordingReporter::default();

    let summary = service
        .embed_selected(&mut collection, &selection, &tracker, &reporter)
        .await
        .unwrap();

    assert_eq!(summary.embedded, 0);
    assert_eq!(summary.skipped, 3);
    assert!(backend.recorded_calls().is_empty());
    assert_eq!(tracker.snapshot(), ProgressState::default());
    assert_eq!(reporter.labels(), vec!["skipped:embedding:3".to_string()]);
}

#[tokio::test]
async fn test_remote_and_unknown_ids_are_skipped() {
    let mut collection = ProductCollection::from(vec![
        local_product("a", "1"),
        remote_product("2"),
        embedded_product("c", "3"),
    ]);
    let selection: Selection = ["a", "remote:2", "c", "ghost"].into_iter().collect();
    let backend = MockEmbeddingBackend::new();
    let service = EmbeddingService::new(backend.clone());

    let summary = service
        .embed_selected(
            &mut collection,
            &selection,
            &ProgressTracker::new(),
            &SilentReporter,
        )
        .await
        .unwrap();

    assert_eq!(summary.embedded, 1);
    assert_eq!(summary.skipped, 3);
    let calls = backend.recorded_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].ids, vec!["a".to_string()]);
    assert!(!calls[0].force);
}

#[tokio::test]
async fn test_force_reembeds_cached_products() {
    let mut collection = ProductCollection::from(vec![
        embedded_product("a", "1"),
        local_product("b", "2"),
    ]);
    let selection = select_all(&collection);
    let backend = MockEmbeddingBackend::new();
    let service =
        EmbeddingService::with_config(backend.clone(), SyncConfig::default().with_force_reembed());

    let summary = service
        .embed_selected(
            &mut collection,
            &selection,
            &ProgressTracker::new(),
            &SilentReporter,
        )
        .await
        .unwrap();

    assert_eq!(summary.embedded, 2);
    assert_eq!(summary.skipped, 0);
    let calls = backend.recorded_calls();
    assert!(calls.iter().all(|c| c.force));
    let model = &collection.get("a").unwrap().embeddings.as_ref().unwrap().model;
    assert_eq!(model, "mock-embedder");
}

#[tokio::test]
async fn test_failed_batch_counts_all_members() {
    let mut collection = local_collection(8);
    let selection = select_all(&collection);
    // p5 lives in the second batch of four
    let backend = MockEmbeddingBackend::new().failing_on(&["p5"]);
    let service = EmbeddingService::with_config(backend.clone(), config(4, 1));
    let tracker = ProgressTracker::new();

    let summary = service
        .embed_selected(&mut collection, &selection, &tracker, &SilentReporter)
        .await
        .unwrap();

    assert_eq!(summary.embedded, 4);
    assert_eq!(summary.failed, 4);
    for i in 0..4 {
        assert!(collection.get(&format!("p{i}")).unwrap().has_embeddings());
    }
    for i in 4..8 {
        assert!(!collection.get(&format!("p{i}")).unwrap().has_embeddings());
    }
    let state = tracker.snapshot();
    assert_eq!(state.done + state.failed, state.total);
}

#[tokio::test]
async fn test_partially_served_batch() {
    let mut collection = local_collection(6);
    let selection = select_all(&collection);
    let backend = MockEmbeddingBackend::new().omitting(&["p1", "p4"]);
    let service = EmbeddingService::with_config(backend.clone(), config(3, 2));
    let tracker = ProgressTracker::new();
    let reporter = RecordingReporter::default();

    let summary = service
        .embed_selected(&mut collection, &selection, &tracker, &reporter)
        .await
        .unwrap();

    assert_eq!(summary.embedded, 4);
    assert_eq!(summary.failed, 2);
    assert!(!collection.get("p1").unwrap().has_embeddings());
    assert!(!collection.get("p4").unwrap().has_embeddings());
    assert!(collection.get("p0").unwrap().has_embeddings());

    let state = tracker.snapshot();
    assert_eq!(state.done, 4);
    assert_eq!(state.failed, 2);
    assert_eq!(state.done + state.failed, state.total);
    // A partially served batch is still a successful request.
    assert_eq!(reporter.count("unit:ok"), 2);
}

#[tokio::test]
async fn test_backend_already_embedded_counts_as_skipped() {
    // Arrange: the local view is stale, the backend already embedded p1
    let mut collection = local_collection(2);
    let selection = select_all(&collection);
    let backend = MockEmbeddingBackend::new().already_embedded(&["p1"]);
    let service = EmbeddingService::with_config(backend.clone(), config(2, 1));
    let tracker = ProgressTracker::new();

    // Act
    let summary = service
        .embed_selected(&mut collection, &selection, &tracker, &SilentReporter)
        .await
        .unwrap();

    // Assert
    assert_eq!(
        summary,
        EmbedSummary {
            embedded: 1,
            skipped: 1,
            failed: 0,
            cancelled: false,
        }
    );
    assert!(collection.get("p0").unwrap().has_embeddings());

    let state = tracker.snapshot();
    assert_eq!(state.done, 2);
    assert_eq!(state.failed, 0);
}

#[tokio::test]
async fn test_backend_limit_caps_batch_size() {
    let mut collection = local_collection(7);
    let selection = select_all(&collection);
    let backend = MockEmbeddingBackend::new().with_max_batch_size(3);
    let service = EmbeddingService::with_config(backend.clone(), config(64, 2));

    service
        .embed_selected(
            &mut collection,
            &selection,
            &ProgressTracker::new(),
            &SilentReporter,
        )
        .await
        .unwrap();

    assert_eq!(backend.batch_sizes(), vec![1, 3, 3]);
}

#[tokio::test]
async fn test_embed_event_sequence() {
    let mut collection = ProductCollection::from(vec![
        embedded_product("cached", "0"),
        local_product("a", "1"),
        local_product("b", "2"),
    ]);
    let selection = select_all(&collection);
    let service = EmbeddingService::with_config(MockEmbeddingBackend::new(), config(1, 1));
    let reporter = RecordingReporter::default();

    service
        .embed_selected(
            &mut collection,
            &selection,
            &ProgressTracker::new(),
            &reporter,
        )
        .await
        .unwrap();

    assert_eq!(
        reporter.labels(),
        vec![
            "skipped:embedding:1".to_string(),
            "started:embedding:2".to_string(),
            "unit:ok:1".to_string(),
            "unit:ok:1".to_string(),
            "finished:embedding:false".to_string(),
        ]
    );
}
