// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use tokio_tungstenite::tungstenite;

/// Startup configuration the agent refuses to run with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
	#[error("token required: --token or BRIDGE_TOKEN")]
	MissingToken,

	#[error("database url required: --db or DATABASE_URL")]
	MissingDatabaseUrl,

	#[error("max open connections must be at least 1")]
	NoConnections,

	#[error("max idle connections ({max_idle}) exceeds max open connections ({max_open})")]
	IdleExceedsOpen {
		max_idle: u32,
		max_open: u32,
	},
}

/// Failure reading from or writing to an established hub channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
	#[error("connection closed")]
	Closed,

	#[error(transparent)]
	Transport(#[from] tungstenite::Error),

	#[error("malformed message: {0}")]
	Malformed(#[from] serde_json::Error),
}

/// Reason a session attempt ended.
///
/// Every variant is retried by the supervisor with the same backoff; none of
/// them is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	#[error("dial failed: {0}")]
	Dial(String),

	#[error("handshake failed: {0}")]
	Handshake(String),

	#[error("authentication failed: {0}")]
	Authentication(String),

	#[error("channel error: {0}")]
	Channel(#[from] ChannelError),
}

/// Failure of a single query against the local database.
///
/// The `Display` text is sent verbatim to the hub as `result.error`, so driver
/// errors are wrapped transparently.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
	#[error("unsupported database url: {0}")]
	UnsupportedUrl(String),

	#[error(transparent)]
	Pool(#[from] r2d2::Error),

	#[error(transparent)]
	Sqlite(#[from] r2d2_sqlite::rusqlite::Error),

	#[error(transparent)]
	Postgres(#[from] postgres::Error),

	#[error("empty query")]
	EmptyQuery,

	#[error("multiple statements in one query are not supported")]
	MultipleStatements,

	#[error("unsupported column type: {0}")]
	UnsupportedType(String),

	#[error("row {row} has {actual} values for {expected} columns")]
	RowWidth {
		row: usize,
		expected: usize,
		actual: usize,
	},

	#[error("unsupported parameter at position {position}")]
	UnsupportedParam {
		position: usize,
	},

	#[error("query task failed: {0}")]
	Task(String),
}
