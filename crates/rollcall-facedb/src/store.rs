//! SQLite persistence for enrolled faces.

use crate::types::{Embedding, FaceRecord};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("face {0:?} is already enrolled")]
    DuplicateId(String),
    #[error("corrupt embedding for {id}: {len} bytes is not a whole number of f32 values")]
    CorruptEmbedding { id: String, len: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS faces (
        id            TEXT PRIMARY KEY,
        name          TEXT NOT NULL,
        embedding     BLOB NOT NULL,
        model_version TEXT,
        created_at    TEXT NOT NULL
    );
";

pub struct FaceStore {
    conn: Connection,
}

impl FaceStore {
    /// Open (or create) the database, creating its parent directory.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened face store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn insert(&self, record: &FaceRecord) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO faces (id, name, embedding, model_version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.name,
                encode_embedding(&record.embedding.values),
                record.embedding.model_version,
                record.created_at,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateId(record.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All records, oldest first.
    pub fn all(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, embedding, model_version, created_at
             FROM faces ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], RawRow::from_row)?;
        rows.map(|row| row?.into_record()).collect()
    }

    pub fn get(&self, id: &str) -> Result<Option<FaceRecord>, StoreError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, name, embedding, model_version, created_at FROM faces WHERE id = ?1",
                params![id],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Returns whether a record was deleted.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let n = self.conn.execute("DELETE FROM faces WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

struct RawRow {
    id: String,
    name: String,
    embedding: Vec<u8>,
    model_version: Option<String>,
    created_at: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            embedding: row.get(2)?,
            model_version: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<FaceRecord, StoreError> {
        let values = decode_embedding(&self.embedding).ok_or(StoreError::CorruptEmbedding {
            id: self.id.clone(),
            len: self.embedding.len(),
        })?;
        Ok(FaceRecord {
            id: self.id,
            name: self.name,
            embedding: Embedding {
                values,
                model_version: self.model_version,
            },
            created_at: self.created_at,
        })
    }
}

fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
