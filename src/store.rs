//! SQLite persistence for review reports.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One uploaded file and its review.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReviewReport {
    pub id: i64,
    pub filename: String,
    pub code_content: String,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} — {}",
            self.filename,
            self.created_at.format("%Y-%m-%d %H:%M")
        )
    }
}

impl ReviewReport {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            code_content: row.get(2)?,
            review_text: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, filename, code_content, review_text, created_at FROM review_reports";

/// Handle to the report database. Clones share one connection.
#[derive(Clone)]
pub struct ReviewStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl ReviewStore {
    /// Create or open the database at `path`, creating parent directories.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open report store at {:?}", path))?;
        Self::with_connection(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS review_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                code_content TEXT NOT NULL,
                review_text TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("report store lock poisoned"))
    }

    /// Insert a report with an empty review; `created_at` is set here.
    pub fn create(&self, filename: &str, code_content: &str) -> Result<ReviewReport> {
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO review_reports (filename, code_content, review_text, created_at) VALUES (?1, ?2, '', ?3)",
            params![filename, code_content, created_at],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Stored report {} for {}", id, filename);

        Ok(ReviewReport {
            id,
            filename: filename.to_string(),
            code_content: code_content.to_string(),
            review_text: String::new(),
            created_at,
        })
    }

    pub fn update_review(&self, id: i64, review_text: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE review_reports SET review_text = ?1 WHERE id = ?2",
            params![review_text, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("No report with id {}", id));
        }
        Ok(())
    }

    pub fn get(&self, id: i64) -> Result<Option<ReviewReport>> {
        let conn = self.lock()?;
        let report = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                [id],
                ReviewReport::from_row,
            )
            .optional()?;
        Ok(report)
    }

    /// Most recent first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<ReviewReport>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY created_at DESC, id DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([limit as i64], ReviewReport::from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM review_reports", [], |row| row.get(0))?;
        Ok(count)
    }
}
