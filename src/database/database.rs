use chrono::Utc;
use log::info;
use rusqlite::params;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestedFile {
    pub path: String,
    pub chunks: i64,
    pub ingested_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedExchange {
    pub timestamp: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
}

/// SQLite ledger next to the vector store: which files went in, and what was asked.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DatabaseError::Connection(format!("{}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open(path.to_path_buf())
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        let db = Self {
            conn: Arc::new(conn),
        };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), DatabaseError> {
        self.conn.call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingested_files (
                    id INTEGER PRIMARY KEY,
                    path TEXT UNIQUE NOT NULL,
                    chunks INTEGER NOT NULL,
                    ingested_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS qa_log (
                    id INTEGER PRIMARY KEY,
                    timestamp TEXT NOT NULL,
                    question TEXT NOT NULL,
                    answer TEXT NOT NULL,
                    sources TEXT NOT NULL
                );"
            )?;
            Ok(())
        })
        .await?;

        info!("Database initialized successfully");
        Ok(())
    }

    /// Records (or refreshes) an ingested file and how many chunks it produced.
    pub async fn record_ingest(&self, path: String, chunks: usize) -> Result<(), DatabaseError> {
        let ingested_at = Utc::now().to_rfc3339();
        let chunks = chunks as i64;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO ingested_files (path, chunks, ingested_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(path) DO UPDATE SET chunks = excluded.chunks, ingested_at = excluded.ingested_at",
                    params![path, chunks, ingested_at],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    pub async fn ingested_files(&self) -> Result<Vec<IngestedFile>, DatabaseError> {
        let result = self.conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT path, chunks, ingested_at FROM ingested_files ORDER BY path"
                )?;

                let rows = stmt.query_map([], |row| {
                    Ok(IngestedFile {
                        path: row.get(0)?,
                        chunks: row.get(1)?,
                        ingested_at: row.get(2)?,
                    })
                })?;

                let mut files = Vec::new();
                for row in rows {
                    files.push(row?);
                }

                Ok(files)
            })
            .await?;

        Ok(result)
    }

    pub async fn log_exchange(
        &self,
        question: String,
        answer: String,
        sources: Vec<String>,
    ) -> Result<(), DatabaseError> {
        let timestamp = Utc::now().to_rfc3339();
        let sources = serde_json::to_string(&sources)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO qa_log (timestamp, question, answer, sources) VALUES (?1, ?2, ?3, ?4)",
                    [&timestamp, &question, &answer, &sources],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    /// Most recent exchanges first.
    pub async fn recent_exchanges(&self, limit: i64) -> Result<Vec<LoggedExchange>, DatabaseError> {
        let rows = self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT timestamp, question, answer, sources
                     FROM qa_log
                     ORDER BY id DESC
                     LIMIT ?"
                )?;

                let rows = stmt.query_map([limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;

                let mut exchanges = Vec::new();
                for row in rows {
                    exchanges.push(row?);
                }

                Ok(exchanges)
            })
            .await?;

        rows.into_iter()
            .map(|(timestamp, question, answer, sources)| -> Result<LoggedExchange, DatabaseError> {
                Ok(LoggedExchange {
                    timestamp,
                    question,
                    answer,
                    sources: serde_json::from_str(&sources)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ingest_ledger_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("DB").join("docqa.db")).await.unwrap();

        db.record_ingest("/docs/b.txt".to_string(), 3).await.unwrap();
        db.record_ingest("/docs/a.pdf".to_string(), 12).await.unwrap();
        db.record_ingest("/docs/b.txt".to_string(), 5).await.unwrap();

        let files = db.ingested_files().await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "/docs/a.pdf");
        assert_eq!(files[1].chunks, 5);
    }

    #[tokio::test]
    async fn test_exchange_log() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("docqa.db")).await.unwrap();

        db.log_exchange("q1".to_string(), "a1".to_string(), vec![]).await.unwrap();
        db.log_exchange(
            "q2".to_string(),
            "a2".to_string(),
            vec!["/docs/a.pdf".to_string(), "/docs/b.txt".to_string()],
        )
        .await
        .unwrap();

        let recent = db.recent_exchanges(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].question, "q2");
        assert_eq!(recent[0].sources, vec!["/docs/a.pdf", "/docs/b.txt"]);
    }
}
