//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Stages call store methods and never execute SQL directly.
//!
//! Every table is keyed by run id. Loads return rows in key order, and a
//! save followed by a load gives back identical rows.

use crate::error::{PipelineError, PipelineResult};
use rusqlite::{params, Connection};

mod cleaned;
mod response;

/// Every table keyed by run id, upstream first.
pub const RUN_TABLES: [&str; 6] = [
    "offer", "customer", "event", "response", "response_agg", "response_labeled",
];

pub struct PipelineStore {
    conn: Connection,
}

impl PipelineStore {
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_cleaned.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_response.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, version: &str) -> PipelineResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, version, started_at) VALUES (?1, ?2, ?3)",
            params![run_id, version, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn run_exists(&self, run_id: &str) -> PipelineResult<bool> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM run WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// Row count of `table` for a run. Only the tables in `RUN_TABLES` are accepted.
    pub fn row_count(&self, run_id: &str, table: &str) -> PipelineResult<i64> {
        let table = RUN_TABLES
            .into_iter()
            .find(|t| *t == table)
            .ok_or_else(|| PipelineError::Config(format!("unknown table '{table}'")))?;
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE run_id = ?1");
        let n = self.conn.query_row(&sql, params![run_id], |row| row.get(0))?;
        Ok(n)
    }
}

/// Conversion error for a TEXT column holding an unknown label.
fn bad_label(col: usize, table: &str, label: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        format!("unknown {table} label '{label}'").into(),
    )
}

/// Delete a run's rows from one of `RUN_TABLES` so a stage can write it afresh.
fn clear_run(conn: &Connection, table: &'static str, run_id: &str) -> rusqlite::Result<usize> {
    conn.execute(&format!("DELETE FROM {table} WHERE run_id = ?1"), params![run_id])
}
