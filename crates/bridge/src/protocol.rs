// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Hub protocol messages.
//!
//! Both directions use JSON objects discriminated by a `type` field. The hub
//! answers `auth` with another `auth` message, so the two directions are
//! modelled as separate enums.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A message sent from the agent to the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
	/// Sent once per session, before anything else.
	Auth {
		token: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		name: Option<String>,
	},
	/// Reply to exactly one `query`.
	Result(QueryResult),
}

/// A message received from the hub.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubMessage {
	/// Outcome of the auth handshake. Older hubs tag it `auth_result`.
	#[serde(alias = "auth_result")]
	Auth {
		#[serde(default)]
		success: bool,
		#[serde(default)]
		error: Option<String>,
	},
	Query(QueryRequest),
	/// Any type this agent does not understand.
	#[serde(other)]
	Unknown,
}

/// Query request payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
	#[serde(default)]
	pub id: String,
	#[serde(default)]
	pub sql: String,
	/// Positional parameters, decoded as raw JSON and validated per query.
	#[serde(default)]
	pub params: Option<Vec<serde_json::Value>>,
}

/// Result of one query, correlated to its request by `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
	pub id: String,
	#[serde(flatten)]
	pub outcome: QueryOutcome,
}

/// Either the result data or the error text, never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutcome {
	Rows {
		columns: Vec<String>,
		rows: Vec<Vec<Value>>,
	},
	Error {
		error: String,
	},
}

impl QueryResult {
	pub fn rows(id: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
		Self {
			id: id.into(),
			outcome: QueryOutcome::Rows {
				columns,
				rows,
			},
		}
	}

	pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			outcome: QueryOutcome::Error {
				error: error.into(),
			},
		}
	}

	pub fn is_error(&self) -> bool {
		matches!(self.outcome, QueryOutcome::Error { .. })
	}
}

impl From<QueryResult> for ClientMessage {
	fn from(result: QueryResult) -> Self {
		ClientMessage::Result(result)
	}
}
