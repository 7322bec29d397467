// SPDX-FileCopyrightText: 2026 Indica Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! `Database` wraps the one connection; query modules take `&Database` and go
//! through [`Database::connection`]. Do NOT create additional Connection
//! instances for writes.

use std::path::Path;
use std::time::Duration;

use indica_core::IndicaError;
use rusqlite::ErrorCode;
use tracing::debug;

use crate::migrations;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure raised inside a connection closure: an SQL error or a domain rule
/// (not found, invalid transition, conflict) detected mid-transaction.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CallError {
    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
    #[error(transparent)]
    Rule(#[from] IndicaError),
}

/// Handle to the single SQLite writer connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path` in WAL mode and
    /// applies pending migrations.
    pub async fn open(path: &str) -> Result<Self, IndicaError> {
        Self::open_with(path, true).await
    }

    /// Opens the database with an explicit journal mode choice.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, IndicaError> {
        if let Some(parent) = Path::new(path)
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(IndicaError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(map_sql_err)?;

        conn.call(move |conn| -> Result<(), CallError> {
            if wal_mode {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(map_call_err)?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Closes the connection, waiting for queued calls to finish.
    pub async fn close(self) -> Result<(), IndicaError> {
        self.conn.close().await.map_err(map_tr_err)
    }
}

/// Maps a tokio-rusqlite error carrying a plain SQL error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> IndicaError {
    match e {
        tokio_rusqlite::Error::Error(sql) => map_sql_err(sql),
        other => IndicaError::Storage {
            source: Box::new(other),
        },
    }
}

/// Maps a tokio-rusqlite error raised by a closure returning [`CallError`].
pub(crate) fn map_call_err(e: tokio_rusqlite::Error<CallError>) -> IndicaError {
    match e {
        tokio_rusqlite::Error::Error(CallError::Rule(err)) => err,
        tokio_rusqlite::Error::Error(CallError::Sql(sql)) => map_sql_err(sql),
        other => IndicaError::Storage {
            source: Box::new(other),
        },
    }
}

/// Constraint violations surface as conflicts; everything else is a storage failure.
fn map_sql_err(e: rusqlite::Error) -> IndicaError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            IndicaError::Conflict(e.to_string())
        }
        _ => IndicaError::storage(e),
    }
}
