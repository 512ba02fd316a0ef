mod documents;
mod jobs;
mod search;
mod tokens;
pub mod types;

use anyhow::Result;
use rusqlite::{Connection, ffi::sqlite3_auto_extension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

/// Dimension of the embedding vectors stored in the vec0 virtual table.
pub const EMBEDDING_DIM: usize = 1536;

/// SQLite-backed persistence for documents, pages, embedding jobs,
/// generated documents, the email log and API tokens. Vector search runs
/// through the sqlite-vec extension.
pub struct Store {
    db: Arc<Mutex<Connection>>,
    workspace_dir: PathBuf,
}

fn create_schema(db: &Connection) -> rusqlite::Result<()> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'processing',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS document_pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL,
            page_number INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding TEXT,
            UNIQUE(document_id, page_number)
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS embedding_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            target_table TEXT NOT NULL,
            target_id INTEGER NOT NULL,
            owner_id TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            processed_at DATETIME
        )",
        [],
    )?;

    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_embedding_jobs_status_created
         ON embedding_jobs(status, created_at)",
        [],
    )?;
    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_document_pages_document
         ON document_pages(document_id)",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS generated_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            file_path TEXT NOT NULL,
            source_ids TEXT NOT NULL DEFAULT '[]',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS email_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id TEXT NOT NULL,
            recipient TEXT NOT NULL,
            subject TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            sent_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS api_tokens (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            token_hash TEXT NOT NULL UNIQUE,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    db.execute(
        &format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vss_document_pages USING vec0(
                embedding float[{EMBEDDING_DIM}] distance_metric=cosine
            )"
        ),
        [],
    )?;

    Ok(())
}

/// Register sqlite-vec so every subsequently opened connection has vec0.
fn load_vec_extension() {
    unsafe {
        sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    }
}

impl Store {
    pub async fn new<P: AsRef<Path>>(workspace_dir: P) -> Result<Self> {
        let workspace_dir = workspace_dir.as_ref().to_path_buf();
        if !workspace_dir.exists() {
            fs::create_dir_all(&workspace_dir).await?;
        }

        load_vec_extension();

        let db_path = workspace_dir.join("docsmith.db");
        let db = Connection::open(&db_path)?;
        db.pragma_update(None, "journal_mode", "WAL")?;
        db.pragma_update(None, "busy_timeout", 5000)?;
        create_schema(&db)?;

        info!("Store opened at {}", db_path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            workspace_dir,
        })
    }

    pub fn get_db(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }
}

/// Create a Store over a throwaway directory for testing.
#[cfg(test)]
pub async fn test_store() -> Store {
    let tmpdir = std::env::temp_dir().join(format!("docsmith-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&tmpdir).expect("create temp dir");

    load_vec_extension();

    let db = Connection::open(tmpdir.join("docsmith.db")).expect("open test db");
    create_schema(&db).expect("create schema");

    Store {
        db: Arc::new(Mutex::new(db)),
        workspace_dir: tmpdir,
    }
}
