// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Local database handle.
//!
//! The handle is created once at startup and shared by the query executor.
//! Backends own an r2d2 pool, so the handle itself needs no extra locking.

mod postgres;
mod sqlite;

use std::sync::Arc;

pub use self::{postgres::Postgres, sqlite::Sqlite};
use crate::{
	config::PoolConfig,
	error::DatabaseError,
	value::{NativeValue, Value},
};

/// Columns and rows of one executed statement, still in driver-native form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
	pub columns: Vec<String>,
	pub rows: Vec<Vec<NativeValue>>,
}

/// A relational database the agent executes queries against.
///
/// Calls block on the database round trip; async callers run them on the
/// blocking pool.
pub trait Database: Send + Sync + 'static {
	/// Verifies that a connection can be acquired and used.
	fn ping(&self) -> Result<(), DatabaseError>;

	/// Runs one statement with positional parameters and reads every row.
	///
	/// A failure while reading any row fails the whole statement.
	fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet, DatabaseError>;
}

/// Opens a pooled database handle for the given connection string.
///
/// - `postgres://...` and `postgresql://...` open PostgreSQL.
/// - `sqlite::memory:`, `sqlite://<path>` and `sqlite:<path>` open SQLite.
pub fn open(url: &str, pool: &PoolConfig) -> Result<Arc<dyn Database>, DatabaseError> {
	if url.starts_with("postgres://") || url.starts_with("postgresql://") {
		return Ok(Arc::new(Postgres::open(url, pool)?));
	}

	if let Some(rest) = url.strip_prefix("sqlite:") {
		if rest == ":memory:" || rest == "//:memory:" {
			return Ok(Arc::new(Sqlite::memory(pool)?));
		}
		let path = rest.strip_prefix("//").unwrap_or(rest);
		if path.is_empty() {
			return Err(DatabaseError::UnsupportedUrl(url.to_string()));
		}
		return Ok(Arc::new(Sqlite::file(path, pool)?));
	}

	Err(DatabaseError::UnsupportedUrl(url.to_string()))
}
