// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Bridge agent for ReifyDB.
//!
//! The agent runs inside a private network, dials out to a hub over a single
//! WebSocket connection, authenticates, and then answers the hub's query
//! requests by executing them against a local relational database.
//!
//! # Components
//!
//! - [`Supervisor`] owns the reconnect loop and the exponential [`Backoff`].
//! - [`Session`] performs the auth handshake and runs the request/reply loop.
//! - [`QueryExecutor`] runs one query against the shared [`Database`] handle.
//! - [`value::convert`] normalises native column values into transport-safe
//!   [`Value`] scalars.
//!
//! # Message Protocol
//!
//! All messages are JSON objects discriminated by a `type` field:
//!
//! ```json
//! {"type": "auth", "token": "..."}
//! {"type": "auth", "success": true}
//! {"type": "query", "id": "q1", "sql": "SELECT $1", "params": [1]}
//! {"type": "result", "id": "q1", "columns": ["?column?"], "rows": [[1]]}
//! ```
//!
//! # Example
//!
//! ```ignore
//! let config = Arc::new(ConnectionConfig::new("wss://hub.example.com/agent", token, database_url));
//! let database = database::open(&config.database_url, &config.pool)?;
//! let executor = QueryExecutor::new(database);
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! Supervisor::new(WsConnector::new(&config.hub_url), config, executor).run(shutdown_rx).await;
//! ```

pub mod channel;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod value;

pub use channel::{Channel, Connector, WsChannel, WsConnector};
pub use config::{BackoffConfig, ConnectionConfig, PoolConfig};
pub use database::{Database, RowSet};
pub use error::{ChannelError, ConfigError, DatabaseError, SessionError};
pub use executor::{QueryExecutor, truncate};
pub use logging::LogFormat;
pub use protocol::{ClientMessage, HubMessage, QueryOutcome, QueryRequest, QueryResult};
pub use session::{Session, SessionState, Termination};
pub use supervisor::{Backoff, Supervisor};
pub use value::{NativeValue, Value};
