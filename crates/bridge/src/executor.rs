// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::{sync::Arc, time::Instant};

use tokio::task::spawn_blocking;
use tracing::{info, warn};

use crate::{
	database::Database,
	error::DatabaseError,
	protocol::{QueryRequest, QueryResult},
	value::{self, Value},
};

/// Longest SQL prefix written to the query start log line.
const LOGGED_SQL_LEN: usize = 100;

/// Executes hub queries against the shared database handle.
///
/// Never fails: every error is folded into the returned [`QueryResult`].
#[derive(Clone)]
pub struct QueryExecutor {
	database: Arc<dyn Database>,
}

impl QueryExecutor {
	pub fn new(database: Arc<dyn Database>) -> Self {
		Self {
			database,
		}
	}

	/// Runs one query request and builds its result message.
	pub async fn execute(&self, request: QueryRequest) -> QueryResult {
		let QueryRequest {
			id,
			sql,
			params,
		} = request;

		info!(query_id = %id, "Executing: {}", truncate(&sql, LOGGED_SQL_LEN));
		let start = Instant::now();

		match self.run(sql, params.unwrap_or_default()).await {
			Ok((columns, rows)) => {
				info!(query_id = %id, "Completed in {:?}, {} rows", start.elapsed(), rows.len());
				QueryResult::rows(id, columns, rows)
			}
			Err(err) => {
				warn!(query_id = %id, "Error: {}", err);
				QueryResult::error(id, err.to_string())
			}
		}
	}

	async fn run(
		&self,
		sql: String,
		params: Vec<serde_json::Value>,
	) -> Result<(Vec<String>, Vec<Vec<Value>>), DatabaseError> {
		if sql.trim().is_empty() {
			return Err(DatabaseError::EmptyQuery);
		}

		let params = params
			.into_iter()
			.enumerate()
			.map(|(position, param)| Value::from_param(position, param))
			.collect::<Result<Vec<_>, _>>()?;

		let database = self.database.clone();
		let row_set = spawn_blocking(move || database.query(&sql, &params))
			.await
			.map_err(|e| DatabaseError::Task(e.to_string()))??;

		let expected = row_set.columns.len();
		let mut rows = Vec::with_capacity(row_set.rows.len());
		for (idx, row) in row_set.rows.into_iter().enumerate() {
			if row.len() != expected {
				return Err(DatabaseError::RowWidth {
					row: idx,
					expected,
					actual: row.len(),
				});
			}
			rows.push(row.into_iter().map(value::convert).collect());
		}

		Ok((row_set.columns, rows))
	}
}

/// Shortens `s` to at most `n` bytes, appending `...` when anything was cut.
///
/// Unlike a plain `s[..n]` byte cut, the cut falls back to the nearest
/// character boundary at or below `n`, so a multi-byte character is never
/// split and the result may hold fewer than `n` bytes. ASCII input is cut at
/// exactly `n` bytes.
pub fn truncate(s: &str, n: usize) -> String {
	if s.len() <= n {
		return s.to_string();
	}
	let mut end = n;
	while !s.is_char_boundary(end) {
		end -= 1;
	}
	format!("{}...", &s[..end])
}
