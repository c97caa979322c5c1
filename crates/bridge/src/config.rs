// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::time::Duration;

use crate::error::ConfigError;

/// Connection pool limits for the local database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
	/// Maximum number of open connections.
	pub max_open: u32,
	/// Connections kept open while idle.
	pub max_idle: u32,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_open: 10,
			max_idle: 5,
		}
	}
}

/// Reconnect delay bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
	pub initial: Duration,
	pub max: Duration,
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			initial: Duration::from_secs(1),
			max: Duration::from_secs(60),
		}
	}
}

/// Process-wide agent configuration.
///
/// Built once at startup and shared read-only between the supervisor and its
/// sessions.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use reifydb_bridge::ConnectionConfig;
///
/// let config = ConnectionConfig::new("hub.internal:8091/agent", "secret", "sqlite::memory:")
/// 	.name("warehouse-replica")
/// 	.handshake_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.hub_url, "ws://hub.internal:8091/agent");
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
	/// WebSocket URL of the hub.
	pub hub_url: String,
	/// Token sent in the auth message.
	pub token: String,
	/// Optional display name announced during auth.
	pub name: Option<String>,
	/// Connection string of the local database.
	pub database_url: String,
	pub pool: PoolConfig,
	pub backoff: BackoffConfig,
	/// How long to wait for the hub's auth result.
	pub handshake_timeout: Duration,
}

impl ConnectionConfig {
	pub fn new(hub_url: impl Into<String>, token: impl Into<String>, database_url: impl Into<String>) -> Self {
		Self {
			hub_url: normalize_hub_url(hub_url.into()),
			token: token.into(),
			name: None,
			database_url: database_url.into(),
			pool: PoolConfig::default(),
			backoff: BackoffConfig::default(),
			handshake_timeout: Duration::from_secs(30),
		}
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn pool(mut self, pool: PoolConfig) -> Self {
		self.pool = pool;
		self
	}

	pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
		self.backoff = backoff;
		self
	}

	pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = timeout;
		self
	}

	/// Checks the startup preconditions; a failure here is fatal.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.token.trim().is_empty() {
			return Err(ConfigError::MissingToken);
		}
		if self.database_url.trim().is_empty() {
			return Err(ConfigError::MissingDatabaseUrl);
		}
		if self.pool.max_open == 0 {
			return Err(ConfigError::NoConnections);
		}
		if self.pool.max_idle > self.pool.max_open {
			return Err(ConfigError::IdleExceedsOpen {
				max_idle: self.pool.max_idle,
				max_open: self.pool.max_open,
			});
		}
		Ok(())
	}
}

fn normalize_hub_url(url: String) -> String {
	if url.starts_with("ws://") || url.starts_with("wss://") {
		url
	} else {
		format!("ws://{}", url)
	}
}
