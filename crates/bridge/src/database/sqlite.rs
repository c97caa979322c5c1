// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{path::Path, time::Duration};

use r2d2::Pool;
use r2d2_sqlite::{
	SqliteConnectionManager,
	rusqlite::{
		Batch, Connection, Statement, params_from_iter,
		types::{Value as SqlValue, ValueRef},
	},
};

use super::{Database, RowSet};
use crate::{
	config::PoolConfig,
	error::DatabaseError,
	value::{NativeValue, Value},
};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite backend over an r2d2 pool.
pub struct Sqlite {
	pool: Pool<SqliteConnectionManager>,
}

impl Sqlite {
	/// Opens (or creates) a database file.
	pub fn file(path: impl AsRef<Path>, pool: &PoolConfig) -> Result<Self, DatabaseError> {
		Self::build(SqliteConnectionManager::file(path.as_ref()), pool.max_open, pool.max_idle)
	}

	/// Opens a private in-memory database.
	///
	/// An in-memory database lives inside its connection, so the pool is
	/// pinned to exactly one connection regardless of the configured limits.
	pub fn memory(_pool: &PoolConfig) -> Result<Self, DatabaseError> {
		Self::build(SqliteConnectionManager::memory(), 1, 1)
	}

	fn build(manager: SqliteConnectionManager, max_size: u32, min_idle: u32) -> Result<Self, DatabaseError> {
		let pool = Pool::builder()
			.max_size(max_size)
			.min_idle(Some(min_idle))
			.connection_timeout(CONNECTION_TIMEOUT)
			.build(manager)?;
		Ok(Self {
			pool,
		})
	}
}

impl Database for Sqlite {
	fn ping(&self) -> Result<(), DatabaseError> {
		let conn = self.pool.get()?;
		conn.query_row("SELECT 1", [], |_| Ok(()))?;
		Ok(())
	}

	fn query(&self, sql: &str, params: &[Value]) -> Result<RowSet, DatabaseError> {
		let conn = self.pool.get()?;
		let mut stmt = prepare_single(&conn, sql)?;
		let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

		let mut rows = stmt.query(params_from_iter(params.iter().map(to_sql_value)))?;
		let mut result = Vec::new();
		while let Some(row) = rows.next()? {
			let mut values = Vec::with_capacity(columns.len());
			for idx in 0..columns.len() {
				values.push(from_value_ref(row.get_ref(idx)?));
			}
			result.push(values);
		}

		Ok(RowSet {
			columns,
			rows: result,
		})
	}
}

/// Prepares `sql`, which must hold exactly one statement.
///
/// Comments and trailing semicolons are allowed. Nothing is executed when a
/// second statement is present.
fn prepare_single<'conn>(conn: &'conn Connection, sql: &str) -> Result<Statement<'conn>, DatabaseError> {
	let mut batch = Batch::new(conn, sql);
	let Some(stmt) = batch.next()? else {
		return Err(DatabaseError::EmptyQuery);
	};
	match batch.next() {
		Ok(None) => Ok(stmt),
		_ => Err(DatabaseError::MultipleStatements),
	}
}

fn to_sql_value(value: &Value) -> SqlValue {
	match value {
		Value::Null => SqlValue::Null,
		Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
		Value::Integer(i) => SqlValue::Integer(*i),
		Value::Float(f) => SqlValue::Real(*f),
		Value::String(s) => SqlValue::Text(s.clone()),
	}
}

fn from_value_ref(value: ValueRef<'_>) -> NativeValue {
	match value {
		ValueRef::Null => NativeValue::Null,
		ValueRef::Integer(i) => NativeValue::Integer(i),
		ValueRef::Real(f) => NativeValue::Float(f),
		ValueRef::Text(text) => NativeValue::Text(String::from_utf8_lossy(text).into_owned()),
		ValueRef::Blob(blob) => NativeValue::Bytes(blob.to_vec()),
	}
}
