//! SQLite persistence for chunks.
//!
//! One table, one row per chunk. Embeddings are stored as little-endian f32
//! blobs next to their dimension count.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use tracing::warn;

use super::{Chunk, Metadata};
use crate::error::StoreError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        text TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        embedding BLOB NOT NULL,
        dimensions INTEGER NOT NULL,
        created_at TEXT NOT NULL
    );
";

/// Chunk accepted for insertion, not yet assigned an id.
pub(crate) struct PendingChunk {
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// WAL journal, NORMAL sync, 5s busy timeout.
pub(crate) fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(())
}

pub(crate) fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Load every readable row in id order.
///
/// Rows with a column of the wrong SQL type, a malformed blob, bad metadata,
/// a bad timestamp or a dimension different from the first readable row are
/// skipped with a warning.
pub(crate) fn load_chunks(conn: &Connection) -> Result<Vec<Chunk>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, text, metadata, embedding, dimensions, created_at
         FROM chunks ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RawRow {
            id: row.get(0)?,
            text: row.get(1)?,
            metadata: row.get(2)?,
            embedding: row.get(3)?,
            dimensions: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut dimensions: Option<usize> = None;
    for row in rows {
        let row = row?;
        let id = row.id;
        match row.into_chunk() {
            Ok(chunk) => {
                let expected = *dimensions.get_or_insert(chunk.embedding.len());
                if chunk.embedding.len() != expected {
                    warn!(
                        chunk_id = id,
                        expected,
                        actual = chunk.embedding.len(),
                        "skipping stored chunk with foreign dimension"
                    );
                    continue;
                }
                chunks.push(chunk);
            }
            Err(reason) => warn!(chunk_id = id, reason = %reason, "skipping corrupted chunk row"),
        }
    }
    Ok(chunks)
}

/// Insert `pending` in one transaction and return the stored chunks.
pub(crate) fn insert_chunks(
    conn: &mut Connection,
    pending: Vec<PendingChunk>,
) -> Result<Vec<Chunk>, StoreError> {
    let tx = conn.transaction()?;
    let mut stored = Vec::with_capacity(pending.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO chunks (text, metadata, embedding, dimensions, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for chunk in pending {
            let created_at = Utc::now();
            stmt.execute(params![
                chunk.text,
                serde_json::to_string(&chunk.metadata)?,
                f32_vec_to_bytes(&chunk.embedding),
                chunk.embedding.len() as i64,
                created_at.to_rfc3339(),
            ])?;
            stored.push(Chunk {
                id: tx.last_insert_rowid(),
                text: chunk.text,
                metadata: chunk.metadata,
                embedding: chunk.embedding,
                created_at,
            });
        }
    }
    tx.commit()?;
    Ok(stored)
}

/// Delete every row in one transaction.
pub(crate) fn delete_all(conn: &mut Connection) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    let deleted = tx.execute("DELETE FROM chunks", [])?;
    tx.commit()?;
    Ok(deleted)
}

pub(crate) fn f32_vec_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// `None` when the blob does not hold exactly `dimensions` floats.
pub(crate) fn bytes_to_f32_vec(bytes: &[u8], dimensions: usize) -> Option<Vec<f32>> {
    if dimensions == 0 || bytes.len() != dimensions * 4 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Row as stored, before any type is assumed for its columns.
struct RawRow {
    id: i64,
    text: Value,
    metadata: Value,
    embedding: Value,
    dimensions: Value,
    created_at: Value,
}

fn text_column(value: Value, column: &str) -> Result<String, String> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(format!("{column} holds {} instead of text", other.data_type())),
    }
}

impl RawRow {
    fn into_chunk(self) -> Result<Chunk, String> {
        let dimensions = match self.dimensions {
            Value::Integer(n) => {
                usize::try_from(n).map_err(|_| format!("negative dimension count {n}"))?
            }
            other => return Err(format!("dimensions holds {}", other.data_type())),
        };
        let blob = match self.embedding {
            Value::Blob(blob) => blob,
            other => return Err(format!("embedding holds {}", other.data_type())),
        };
        let embedding = bytes_to_f32_vec(&blob, dimensions).ok_or_else(|| {
            format!(
                "embedding blob of {} bytes does not hold {dimensions} floats",
                blob.len()
            )
        })?;
        let text = text_column(self.text, "text")?;
        let metadata = text_column(self.metadata, "metadata")?;
        let created_at = text_column(self.created_at, "created_at")?;
        let metadata: Metadata = serde_json::from_str(&metadata)
            .map_err(|e| format!("metadata is not a JSON object: {e}"))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| format!("bad created_at: {e}"))?
            .with_timezone(&Utc);
        Ok(Chunk {
            id: self.id,
            text,
            metadata,
            embedding,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip_preserves_values() {
        let values = vec![0.25_f32, -1.5, 3.0e-7];
        let bytes = f32_vec_to_bytes(&values);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_f32_vec(&bytes, 3), Some(values));
    }

    #[test]
    fn blob_with_wrong_length_is_rejected() {
        assert_eq!(bytes_to_f32_vec(&[0, 0, 0], 1), None);
        assert_eq!(bytes_to_f32_vec(&[0; 8], 3), None);
        assert_eq!(bytes_to_f32_vec(&[], 0), None);
    }

    #[test]
    fn corrupted_rows_are_skipped_on_load() {
        let mut conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        insert_chunks(
            &mut conn,
            vec![PendingChunk {
                text: "kept".to_string(),
                metadata: Metadata::new(),
                embedding: vec![1.0, 0.0],
            }],
        )
        .unwrap();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chunks (text, metadata, embedding, dimensions, created_at)
             VALUES ('short blob', '{}', X'0000', 2, ?1),
                    ('bad json', 'nope', ?2, 2, ?1),
                    ('other dims', '{}', ?3, 3, ?1),
                    ('text blob', '{}', 'not-a-blob', 2, ?1),
                    ('text dims', '{}', ?2, 'two', ?1)",
            params![
                now,
                f32_vec_to_bytes(&[1.0, 1.0]),
                f32_vec_to_bytes(&[1.0, 1.0, 1.0])
            ],
        )
        .unwrap();

        let chunks = load_chunks(&conn).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "kept");
    }
}
