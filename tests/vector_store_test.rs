//! Vector store retrieval and persistence against file-backed databases.

mod support;

use std::sync::Arc;

use cardsmith::prelude::*;
use support::{VocabularyEmbedder, embedding_client};
use tracing_test::traced_test;

const VOCABULARY: &[&str] = &[
    "mitochondria",
    "ribosomes",
    "atp",
    "protein",
    "membrane",
    "nucleus",
];

fn embedder() -> Arc<EmbeddingClient> {
    embedding_client(Arc::new(VocabularyEmbedder::new(VOCABULARY)))
}

fn config() -> StoreConfig {
    StoreConfig::default().with_min_chunk_chars(20)
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn mitochondria_query_ranks_mitochondria_chunk_first() {
    let store = VectorStore::open_in_memory(embedder(), config()).unwrap();
    store
        .add_chunks(
            &texts(&[
                "a short phrase about mitochondria",
                "a short phrase about ribosomes",
            ]),
            None,
        )
        .await
        .unwrap();

    let results = store.search("mitochondria", 1).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.text, "a short phrase about mitochondria");
}

#[tokio::test]
async fn added_text_is_found_by_exact_match() {
    let store = VectorStore::open_in_memory(embedder(), config()).unwrap();
    let chunks = texts(&[
        "mitochondria make atp across the inner membrane",
        "ribosomes translate mrna into protein",
        "the nucleus stores dna and the membrane protects it",
    ]);
    store.add_chunks(&chunks, None).await.unwrap();

    for text in &chunks {
        let results = store.search(text, 1).await.unwrap();
        assert_eq!(&results[0].chunk.text, text);
        assert!((results[0].score - 1.0).abs() < 1e-5);
    }
}

#[tokio::test]
async fn chunks_below_minimum_length_are_never_added() {
    let store = VectorStore::open_in_memory(embedder(), StoreConfig::default()).unwrap();

    let report = store
        .add_chunks(
            &texts(&[
                "mitochondria",
                "mitochondria are the site of oxidative phosphorylation producing atp",
            ]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(report.skipped_short, 1);
    assert_eq!(report.accepted, 1);
    assert!(store.chunks().unwrap().iter().all(|c| c.text.len() >= 50));
}

#[tokio::test]
async fn clear_empties_store_and_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.db");
    let store = VectorStore::open(&path, embedder(), config()).unwrap();
    store
        .add_chunks(&texts(&["a short phrase about mitochondria"]), None)
        .await
        .unwrap();

    store.clear().unwrap();

    assert_eq!(store.len().unwrap(), 0);
    assert!(store.search("mitochondria", 5).await.unwrap().is_empty());
    drop(store);
    let reopened = VectorStore::open(&path, embedder(), config()).unwrap();
    assert!(reopened.is_empty().unwrap());
}

#[tokio::test]
async fn reopening_restores_the_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.db");
    let mut source = Metadata::new();
    source.insert("source".to_string(), serde_json::json!("Cell Biology - Chapter 2"));

    let metadata = vec![source.clone(); 3];
    {
        let store = VectorStore::open(&path, embedder(), config()).unwrap();
        let report = store
            .add_chunks(
                &texts(&[
                    "a short phrase about mitochondria",
                    "a short phrase about ribosomes",
                    "tiny",
                ]),
                Some(metadata.as_slice()),
            )
            .await
            .unwrap();
        assert_eq!(report.accepted, 2);
    }

    let reopened = VectorStore::open(&path, embedder(), config()).unwrap();
    let chunks = reopened.chunks().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(reopened.dimensions().unwrap(), Some(VOCABULARY.len()));
    assert!(chunks.iter().all(|c| c.metadata == source));
    assert!(chunks[0].id < chunks[1].id);

    let results = reopened.search("ribosomes", 1).await.unwrap();
    assert_eq!(results[0].chunk.text, "a short phrase about ribosomes");
}

#[tokio::test]
async fn capacity_is_never_exceeded() {
    let store = VectorStore::open_in_memory(embedder(), config().with_max_chunks(3)).unwrap();
    store
        .add_chunks(
            &texts(&[
                "a short phrase about mitochondria",
                "a short phrase about ribosomes",
            ]),
            None,
        )
        .await
        .unwrap();

    let report = store
        .add_chunks(
            &texts(&[
                "a short phrase about the nucleus",
                "a short phrase about the membrane",
                "a short phrase about protein folding",
            ]),
            None,
        )
        .await
        .unwrap();

    assert_eq!(report.accepted, 1);
    assert_eq!(report.truncated, 2);
    assert_eq!(store.len().unwrap(), 3);
    assert_eq!(
        store.chunks().unwrap()[0].text,
        "a short phrase about mitochondria"
    );
}

#[tokio::test]
async fn unavailable_embeddings_degrade_gracefully() {
    let registry = Arc::new(ProviderRegistry::new());
    let unconfigured = Arc::new(EmbeddingClient::new(
        registry,
        Arc::new(VocabularyEmbedder::new(VOCABULARY)),
    ));
    let store = VectorStore::open_in_memory(unconfigured, config()).unwrap();

    let report = store
        .add_chunks(&texts(&["a short phrase about mitochondria"]), None)
        .await
        .unwrap();

    assert_eq!(report.failed_embedding, 1);
    assert!(store.is_empty().unwrap());
    assert!(store.search("mitochondria", 3).await.unwrap().is_empty());
}

#[tokio::test]
#[traced_test]
async fn corrupted_rows_are_skipped_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.db");
    {
        let store = VectorStore::open(&path, embedder(), config()).unwrap();
        store
            .add_chunks(&texts(&["a short phrase about mitochondria"]), None)
            .await
            .unwrap();
    }
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO chunks (text, metadata, embedding, dimensions, created_at)
             VALUES ('broken row', '{}', X'00010203', 6, '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }

    let reopened = VectorStore::open(&path, embedder(), config()).unwrap();

    assert_eq!(reopened.len().unwrap(), 1);
    assert!(logs_contain("skipping corrupted chunk row"));
}

#[tokio::test]
#[traced_test]
async fn rows_with_wrong_column_types_do_not_abort_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.db");
    {
        let store = VectorStore::open(&path, embedder(), config()).unwrap();
        store
            .add_chunks(&texts(&["a short phrase about mitochondria"]), None)
            .await
            .unwrap();
    }
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "INSERT INTO chunks (text, metadata, embedding, dimensions, created_at)
             VALUES ('text embedding', '{}', 'not-a-blob', 6, '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }

    let reopened = VectorStore::open(&path, embedder(), config()).unwrap();

    let chunks = reopened.chunks().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "a short phrase about mitochondria");
    assert!(logs_contain("skipping corrupted chunk row"));
}
