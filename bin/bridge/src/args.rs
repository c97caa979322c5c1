// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use std::time::Duration;

use clap::Parser;
use reifydb_bridge::{ConnectionConfig, LogFormat, PoolConfig};

/// ReifyDB bridge agent - serves hub queries from a private database
#[derive(Parser, Debug)]
#[command(name = "reifydb-bridge")]
#[command(version, about, long_about = None)]
pub struct Args {
	/// Hub authentication token
	#[arg(long, env = "BRIDGE_TOKEN", hide_env_values = true)]
	pub token: String,

	/// Database connection URL (postgres://..., sqlite://<path>, sqlite::memory:)
	#[arg(long = "db", env = "DATABASE_URL", hide_env_values = true)]
	pub database_url: String,

	/// Hub WebSocket URL
	#[arg(long = "hub", env = "BRIDGE_HUB_URL", default_value = "ws://127.0.0.1:8091/agent")]
	pub hub_url: String,

	/// Connection name shown by the hub (optional)
	#[arg(long, env = "BRIDGE_NAME")]
	pub name: Option<String>,

	/// Maximum open database connections
	#[arg(long, env = "BRIDGE_MAX_OPEN_CONNS", default_value_t = 10)]
	pub max_open_conns: u32,

	/// Database connections kept open while idle
	#[arg(long, env = "BRIDGE_MAX_IDLE_CONNS", default_value_t = 5)]
	pub max_idle_conns: u32,

	/// Seconds to wait for the hub's auth result
	#[arg(long, default_value_t = 30)]
	pub handshake_timeout: u64,

	/// Log filter directives
	#[arg(long, env = "RUST_LOG", default_value = "info")]
	pub log_level: String,

	/// Log output format: text or json
	#[arg(long, env = "BRIDGE_LOG_FORMAT", default_value = "text")]
	pub log_format: LogFormat,
}

impl Args {
	pub fn into_config(self) -> ConnectionConfig {
		let mut config = ConnectionConfig::new(self.hub_url, self.token, self.database_url)
			.pool(PoolConfig {
				max_open: self.max_open_conns,
				max_idle: self.max_idle_conns,
			})
			.handshake_timeout(Duration::from_secs(self.handshake_timeout));
		if let Some(name) = self.name.filter(|n| !n.trim().is_empty()) {
			config = config.name(name);
		}
		config
	}
}
