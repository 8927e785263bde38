//! Vector Store
//!
//! Text chunks with their embeddings, persisted in SQLite and mirrored in
//! memory as one contiguous row-major matrix for similarity search.
//!
//! All writes go through a single mutex that guards the connection and the
//! mirror together: a write commits to SQLite first and only then touches the
//! mirror, so the two never disagree. Embedding calls are made before the
//! lock is taken.

mod similarity;
mod sqlite;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingClient;
use crate::error::StoreError;
use sqlite::PendingChunk;

/// Free-form chunk annotations (source file, chapter, page...).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Store limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Texts shorter than this (in characters, after trimming) are not stored.
    pub min_chunk_chars: usize,
    /// Ceiling on the number of stored chunks.
    pub max_chunks: usize,
    /// Texts per embedding request.
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            min_chunk_chars: 50,
            max_chunks: 5000,
            batch_size: 100,
        }
    }
}

impl StoreConfig {
    pub const fn with_min_chunk_chars(mut self, min_chunk_chars: usize) -> Self {
        self.min_chunk_chars = min_chunk_chars;
        self
    }

    pub const fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity with the query.
    pub score: f32,
}

/// What happened to the texts passed to [`VectorStore::add_chunks`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddReport {
    pub accepted: usize,
    pub skipped_short: usize,
    pub failed_embedding: usize,
    /// Dropped because the store reached its capacity.
    pub truncated: usize,
}

#[derive(Default)]
struct Mirror {
    chunks: Vec<Chunk>,
    /// Row-major `chunks.len() x dimensions`.
    matrix: Vec<f32>,
    norms: Vec<f32>,
    dimensions: Option<usize>,
}

impl Mirror {
    fn from_chunks(chunks: Vec<Chunk>) -> Self {
        let mut mirror = Self::default();
        mirror.extend(chunks);
        mirror
    }

    fn extend(&mut self, chunks: Vec<Chunk>) {
        for chunk in chunks {
            self.dimensions.get_or_insert(chunk.embedding.len());
            self.matrix.extend_from_slice(&chunk.embedding);
            self.norms.push(similarity::norm(&chunk.embedding));
            self.chunks.push(chunk);
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn view(&self) -> Result<Option<ArrayView2<'_, f32>>, StoreError> {
        match self.dimensions {
            Some(dimensions) if !self.chunks.is_empty() => Ok(Some(ArrayView2::from_shape(
                (self.chunks.len(), dimensions),
                &self.matrix,
            )?)),
            _ => Ok(None),
        }
    }
}

struct Inner {
    conn: Connection,
    mirror: Mirror,
}

pub struct VectorStore {
    inner: Mutex<Inner>,
    embedder: Arc<EmbeddingClient>,
    config: StoreConfig,
}

impl VectorStore {
    /// Open (or create) the store at `path` and load it into memory.
    pub fn open(
        path: impl AsRef<Path>,
        embedder: Arc<EmbeddingClient>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "opening vector store");
        Self::with_connection(conn, embedder, config)
    }

    /// Non-persistent store, mainly for tests.
    pub fn open_in_memory(
        embedder: Arc<EmbeddingClient>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, embedder, config)
    }

    fn with_connection(
        conn: Connection,
        embedder: Arc<EmbeddingClient>,
        config: StoreConfig,
    ) -> Result<Self, StoreError> {
        sqlite::apply_pragmas(&conn)?;
        sqlite::create_schema(&conn)?;
        let chunks = sqlite::load_chunks(&conn)?;
        debug!(chunks = chunks.len(), "vector store loaded");
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                mirror: Mirror::from_chunks(chunks),
            }),
            embedder,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.mirror.chunks.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Dimensionality fixed by the first stored chunk.
    pub fn dimensions(&self) -> Result<Option<usize>, StoreError> {
        Ok(self.lock()?.mirror.dimensions)
    }

    /// Snapshot of every stored chunk in insertion order.
    pub fn chunks(&self) -> Result<Vec<Chunk>, StoreError> {
        Ok(self.lock()?.mirror.chunks.clone())
    }

    /// Embed and store `texts`.
    ///
    /// `metadata`, when given, is matched to `texts` by position; missing
    /// entries default to empty. Texts that cannot be embedded are skipped.
    pub async fn add_chunks(
        &self,
        texts: &[String],
        metadata: Option<&[Metadata]>,
    ) -> Result<AddReport, StoreError> {
        let mut report = AddReport::default();

        let remaining = self.config.max_chunks.saturating_sub(self.len()?);
        let incoming = texts.len().min(remaining);
        report.truncated = texts.len() - incoming;
        if report.truncated > 0 {
            warn!(
                dropped = report.truncated,
                max_chunks = self.config.max_chunks,
                "vector store capacity reached, dropping incoming chunks"
            );
        }

        let mut candidates: Vec<(String, Metadata)> = Vec::with_capacity(incoming);
        for (i, text) in texts.iter().take(incoming).enumerate() {
            if text.trim().chars().count() < self.config.min_chunk_chars {
                report.skipped_short += 1;
                continue;
            }
            let meta = metadata
                .and_then(|m| m.get(i))
                .cloned()
                .unwrap_or_default();
            candidates.push((text.clone(), meta));
        }

        let mut pending: Vec<PendingChunk> = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            let batch_texts: Vec<String> = batch.iter().map(|(t, _)| t.clone()).collect();
            let embeddings = self.embed_batch_with_fallback(&batch_texts).await;
            for ((text, meta), embedding) in batch.iter().cloned().zip(embeddings) {
                match embedding {
                    Some(embedding) => pending.push(PendingChunk {
                        text,
                        metadata: meta,
                        embedding,
                    }),
                    None => report.failed_embedding += 1,
                }
            }
        }

        if pending.is_empty() {
            return Ok(report);
        }

        let mut inner = self.lock()?;
        let expected = inner
            .mirror
            .dimensions
            .unwrap_or(pending[0].embedding.len());
        if let Some(bad) = pending.iter().find(|p| p.embedding.len() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.embedding.len(),
            });
        }

        // Another writer may have filled the store while we were embedding.
        let room = self
            .config
            .max_chunks
            .saturating_sub(inner.mirror.chunks.len());
        if pending.len() > room {
            let dropped = pending.len() - room;
            pending.truncate(room);
            report.truncated += dropped;
            warn!(dropped, "vector store filled up while embedding, dropping chunks");
        }

        let Inner { conn, mirror } = &mut *inner;
        let stored = sqlite::insert_chunks(conn, pending)?;
        report.accepted = stored.len();
        mirror.extend(stored);

        info!(
            accepted = report.accepted,
            skipped_short = report.skipped_short,
            failed_embedding = report.failed_embedding,
            truncated = report.truncated,
            total = mirror.chunks.len(),
            "chunks added"
        );
        Ok(report)
    }

    /// One request for the whole batch; per text when that fails.
    async fn embed_batch_with_fallback(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        if let Some(vectors) = self.embedder.embed_batch(texts).await {
            return vectors.into_iter().map(Some).collect();
        }
        warn!(texts = texts.len(), "batch embedding failed, embedding one by one");
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embedder.embed(text).await);
        }
        vectors
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Empty when the store is empty, `k` is zero or the query cannot be
    /// embedded.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 || self.is_empty()? {
            return Ok(Vec::new());
        }
        let Some(query_embedding) = self.embedder.embed(query).await else {
            return Ok(Vec::new());
        };

        let inner = self.lock()?;
        let mirror = &inner.mirror;
        let Some(matrix) = mirror.view()? else {
            return Ok(Vec::new());
        };
        if matrix.ncols() != query_embedding.len() {
            return Err(StoreError::DimensionMismatch {
                expected: matrix.ncols(),
                actual: query_embedding.len(),
            });
        }

        let scores = similarity::cosine_scores(matrix, &mirror.norms, &query_embedding);
        Ok(similarity::top_k(&scores, k)
            .into_iter()
            .map(|i| ScoredChunk {
                chunk: mirror.chunks[i].clone(),
                score: scores[i],
            })
            .collect())
    }

    /// Delete every chunk, durably and from memory.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let Inner { conn, mirror } = &mut *inner;
        let deleted = sqlite::delete_all(conn)?;
        mirror.clear();
        info!(deleted, "vector store cleared");
        Ok(())
    }
}
