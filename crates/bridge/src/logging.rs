// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Process-wide tracing subscriber setup.

use std::{error::Error, fmt, str::FromStr};

use tracing_subscriber::EnvFilter;

/// Output format of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
	/// Human readable single-line records.
	#[default]
	Text,
	/// One JSON object per record.
	Json,
}

impl FromStr for LogFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"text" => Ok(LogFormat::Text),
			"json" => Ok(LogFormat::Json),
			other => Err(format!("unknown log format '{}', expected 'text' or 'json'", other)),
		}
	}
}

impl fmt::Display for LogFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LogFormat::Text => f.write_str("text"),
			LogFormat::Json => f.write_str("json"),
		}
	}
}

/// Installs the global subscriber.
///
/// `directives` uses `EnvFilter` syntax, e.g. `info` or
/// `reifydb_bridge=debug,warn`. Fails if the directives do not parse or a
/// global subscriber is already set.
pub fn init(format: LogFormat, directives: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
	let filter = EnvFilter::try_new(directives)?;
	let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
	match format {
		LogFormat::Text => builder.try_init(),
		LogFormat::Json => builder.json().try_init(),
	}
}
