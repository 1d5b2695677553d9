//! SQLite warehouse of daily KPI reports.
//!
//! An import writes every accepted row of a file in one transaction on the
//! writer connection. Reports fan out one read per source on the reader
//! connection. With WAL the reader sees the last committed import while a
//! new one is still being written, so a report never waits on an import and
//! never observes half a file.

pub mod fetch;
pub mod repository;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use rusqlite_migration::{Migrations, M};

use crate::error::{Error, Result};

/// Schema history, oldest first. Applied in order by `to_latest`.
static MIGRATIONS: LazyLock<Migrations<'static>> =
    LazyLock::new(|| Migrations::new(vec![M::up(include_str!("migrations/001_initial.sql"))]));

const WRITER_PRAGMAS: &str = "PRAGMA journal_mode=WAL;\
                              PRAGMA foreign_keys=ON;\
                              PRAGMA busy_timeout=5000;";

// journal_mode is a property of the file, already set by the writer.
const READER_PRAGMAS: &str = "PRAGMA foreign_keys=ON;\
                              PRAGMA busy_timeout=5000;";

/// Handle on the warehouse: one connection for imports and config writes,
/// one for report reads. Cloning shares both connections.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// `~/.kpiboard/kpiboard.db`, creating the directory if needed.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".kpiboard");
        std::fs::create_dir_all(&dir).map_err(|e| Error::Config(e.to_string()))?;
        Ok(dir.join("kpiboard.db"))
    }

    /// Open the warehouse at [`Database::default_path`].
    pub async fn open() -> Result<Self> {
        Self::open_at(Self::default_path()?).await
    }

    /// Open (and migrate) the warehouse file at `path`.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("opening warehouse at {}", path.display());

        // The writer migrates before the reader opens, so the reader never sees an old schema.
        let writer = tokio_rusqlite::Connection::open(path).await?;
        Self::prepare_writer(&writer).await?;
        let reader = tokio_rusqlite::Connection::open(path).await?;
        Self::prepare_reader(&reader).await?;

        Ok(Self { writer, reader })
    }

    /// In-memory warehouse for tests. A memory database exists per connection,
    /// so both roles use the same one.
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::prepare_writer(&writer).await?;
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn prepare_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(WRITER_PRAGMAS).map_err(|e| e.to_string())?;
            MIGRATIONS.to_latest(conn).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| Error::Migration(e.to_string()))
    }

    async fn prepare_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| conn.execute_batch(READER_PRAGMAS)).await?;
        Ok(())
    }

    /// Number of migrations applied to the open file.
    pub async fn schema_version(&self) -> Result<i64> {
        let version = self
            .reader
            .call(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get(0)))
            .await?;
        Ok(version)
    }

    /// Connection for imports and config writes.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Connection for report and catalogue reads.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }
}
