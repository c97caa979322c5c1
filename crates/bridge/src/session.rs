// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! One connection lifetime: auth handshake followed by the query loop.
//!
//! A session moves through three states:
//!
//! ```text
//! AwaitingAuth --auth{success:true}--> Ready --channel error--> Terminated
//!      |                                 ^  |
//!      +--anything else--> Terminated    |  +--query--> execute, reply
//!                                        +--------------+
//! ```
//!
//! Queries are executed one at a time and each reply is written before the
//! next message is read, so replies leave in the order the queries arrived.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info};

use crate::{
	channel::Channel,
	config::ConnectionConfig,
	error::SessionError,
	executor::QueryExecutor,
	protocol::{ClientMessage, HubMessage, QueryRequest},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// Auth sent, waiting for the hub's verdict.
	AwaitingAuth,
	/// Authenticated; serving queries.
	Ready,
	Terminated,
}

/// How a session ended.
#[derive(Debug)]
pub struct Termination {
	/// Last state reached before terminating.
	pub reached: SessionState,
	pub reason: SessionError,
}

impl Termination {
	/// True if the handshake completed before the session ended.
	pub fn was_ready(&self) -> bool {
		self.reached == SessionState::Ready
	}
}

/// What the loop does with an accepted message.
#[derive(Debug, PartialEq)]
enum Action {
	None,
	Execute(QueryRequest),
	Ignore,
}

pub struct Session<C: Channel> {
	channel: C,
	state: SessionState,
	config: Arc<ConnectionConfig>,
	executor: QueryExecutor,
}

impl<C: Channel> Session<C> {
	pub fn new(channel: C, config: Arc<ConnectionConfig>, executor: QueryExecutor) -> Self {
		Self {
			channel,
			state: SessionState::AwaitingAuth,
			config,
			executor,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Runs the session until the channel fails or the handshake is refused.
	///
	/// The channel is closed on every exit path.
	pub async fn run(mut self) -> Termination {
		let reason = self.drive().await;
		let reached = self.state;
		self.state = SessionState::Terminated;
		self.channel.close().await;
		Termination {
			reached,
			reason,
		}
	}

	async fn drive(&mut self) -> SessionError {
		if let Err(err) = self.authenticate().await {
			return err;
		}
		info!("Ready and waiting for queries");

		loop {
			if let Err(err) = self.serve_next().await {
				return err;
			}
		}
	}

	async fn authenticate(&mut self) -> Result<(), SessionError> {
		info!("Authenticating");
		let auth = ClientMessage::Auth {
			token: self.config.token.clone(),
			name: self.config.name.clone(),
		};
		self.channel.send(&auth).await.map_err(|e| SessionError::Handshake(format!("auth send failed: {}", e)))?;

		let message = match timeout(self.config.handshake_timeout, self.channel.recv()).await {
			Ok(Ok(message)) => message,
			Ok(Err(e)) => return Err(SessionError::Handshake(format!("auth read failed: {}", e))),
			Err(_) => {
				return Err(SessionError::Handshake(format!(
					"no auth result within {:?}",
					self.config.handshake_timeout
				)));
			}
		};

		self.accept(message)?;
		info!("Authenticated successfully");
		Ok(())
	}

	async fn serve_next(&mut self) -> Result<(), SessionError> {
		let message = self.channel.recv().await?;
		match self.accept(message)? {
			Action::Execute(request) => {
				let result = self.executor.execute(request).await;
				self.channel.send(&ClientMessage::Result(result)).await?;
			}
			Action::Ignore => debug!("Ignoring message"),
			Action::None => {}
		}
		Ok(())
	}

	/// Applies one inbound message to the state machine.
	fn accept(&mut self, message: HubMessage) -> Result<Action, SessionError> {
		match (self.state, message) {
			(
				SessionState::AwaitingAuth,
				HubMessage::Auth {
					success: true,
					..
				},
			) => {
				self.state = SessionState::Ready;
				Ok(Action::None)
			}
			(
				SessionState::AwaitingAuth,
				HubMessage::Auth {
					success: false,
					error,
				},
			) => Err(SessionError::Authentication(error.unwrap_or_default())),
			(SessionState::AwaitingAuth, HubMessage::Query(query)) => {
				Err(SessionError::Handshake(format!("query {} received before auth result", query.id)))
			}
			(SessionState::AwaitingAuth, HubMessage::Unknown) => {
				Err(SessionError::Handshake("unexpected message before auth result".to_string()))
			}
			(SessionState::Ready, HubMessage::Query(query)) => Ok(Action::Execute(query)),
			(SessionState::Ready, _) => Ok(Action::Ignore),
			(SessionState::Terminated, _) => {
				Err(SessionError::Handshake("message received after termination".to_string()))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;

	use super::*;
	use crate::{
		channel::scripted::ScriptedChannel,
		config::PoolConfig,
		database::Sqlite,
		error::ChannelError,
		protocol::{QueryOutcome, QueryResult},
		value::Value,
	};

	fn config() -> Arc<ConnectionConfig> {
		Arc::new(ConnectionConfig::new("ws://hub", "secret", "sqlite::memory:"))
	}

	fn executor() -> QueryExecutor {
		QueryExecutor::new(Arc::new(Sqlite::memory(&PoolConfig::default()).unwrap()))
	}

	fn auth_ok() -> HubMessage {
		HubMessage::Auth {
			success: true,
			error: None,
		}
	}

	fn query(id: &str, sql: &str, params: Vec<serde_json::Value>) -> HubMessage {
		HubMessage::Query(QueryRequest {
			id: id.to_string(),
			sql: sql.to_string(),
			params: Some(params),
		})
	}

	fn auth_message(token: &str, name: Option<&str>) -> ClientMessage {
		ClientMessage::Auth {
			token: token.to_string(),
			name: name.map(String::from),
		}
	}

	#[tokio::test]
	async fn test_queries_answered_in_arrival_order() {
		let channel = ScriptedChannel::new(vec![
			auth_ok(),
			query("q1", "SELECT ?1 AS v", vec![json!(1)]),
			query("q2", "SELECT ?1 AS v", vec![json!("two")]),
		]);
		let sent = channel.sent();

		let termination = Session::new(channel, config(), executor()).run().await;

		assert!(termination.was_ready());
		assert!(matches!(termination.reason, SessionError::Channel(ChannelError::Closed)));
		assert_eq!(
			*sent.lock().unwrap(),
			vec![
				auth_message("secret", None),
				ClientMessage::Result(QueryResult::rows("q1", vec!["v".into()], vec![vec![Value::Integer(1)]])),
				ClientMessage::Result(QueryResult::rows(
					"q2",
					vec!["v".into()],
					vec![vec![Value::String("two".into())]]
				)),
			]
		);
	}

	#[tokio::test]
	async fn test_query_error_does_not_end_session() {
		let channel = ScriptedChannel::new(vec![
			auth_ok(),
			query("bad", "SELECT * FROM missing", vec![]),
			query("good", "SELECT 1 AS one", vec![]),
		]);
		let sent = channel.sent();

		let termination = Session::new(channel, config(), executor()).run().await;

		assert!(termination.was_ready());
		let sent = sent.lock().unwrap();
		assert_eq!(sent.len(), 3);
		let ClientMessage::Result(bad) = &sent[1] else {
			panic!("expected result");
		};
		assert_eq!(bad.id, "bad");
		assert!(bad.is_error());
		let ClientMessage::Result(good) = &sent[2] else {
			panic!("expected result");
		};
		assert_eq!(
			good.outcome,
			QueryOutcome::Rows {
				columns: vec!["one".into()],
				rows: vec![vec![Value::Integer(1)]],
			}
		);
	}

	#[tokio::test]
	async fn test_auth_carries_display_name() {
		let channel = ScriptedChannel::new(vec![auth_ok()]);
		let sent = channel.sent();
		let config = Arc::new(ConnectionConfig::new("ws://hub", "secret", "sqlite::memory:").name("replica"));

		Session::new(channel, config, executor()).run().await;

		assert_eq!(sent.lock().unwrap()[0], auth_message("secret", Some("replica")));
	}

	#[tokio::test]
	async fn test_rejected_token() {
		let channel = ScriptedChannel::new(vec![
			HubMessage::Auth {
				success: false,
				error: Some("invalid token".to_string()),
			},
			query("q1", "SELECT 1", vec![]),
		]);
		let sent = channel.sent();

		let termination = Session::new(channel, config(), executor()).run().await;

		assert!(!termination.was_ready());
		assert_eq!(termination.reached, SessionState::AwaitingAuth);
		assert!(matches!(&termination.reason, SessionError::Authentication(msg) if msg == "invalid token"));
		assert_eq!(sent.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_query_before_auth_result_is_rejected() {
		let channel = ScriptedChannel::new(vec![query("q1", "SELECT 1", vec![]), auth_ok()]);
		let sent = channel.sent();

		let termination = Session::new(channel, config(), executor()).run().await;

		assert!(!termination.was_ready());
		assert!(matches!(termination.reason, SessionError::Handshake(_)));
		assert_eq!(sent.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_closed_before_auth_result() {
		let channel = ScriptedChannel::new(vec![]);

		let termination = Session::new(channel, config(), executor()).run().await;

		assert_eq!(termination.reached, SessionState::AwaitingAuth);
		assert!(matches!(termination.reason, SessionError::Handshake(_)));
	}

	#[tokio::test]
	async fn test_unknown_messages_are_ignored() {
		let channel = ScriptedChannel::new(vec![
			auth_ok(),
			HubMessage::Unknown,
			auth_ok(),
			query("q1", "SELECT 1 AS one", vec![]),
		]);
		let sent = channel.sent();

		let termination = Session::new(channel, config(), executor()).run().await;

		assert!(termination.was_ready());
		let sent = sent.lock().unwrap();
		assert_eq!(sent.len(), 2);
		assert!(matches!(&sent[1], ClientMessage::Result(result) if result.id == "q1"));
	}

	#[tokio::test]
	async fn test_write_failure_ends_session() {
		let mut channel = ScriptedChannel::new(vec![
			auth_ok(),
			query("q1", "SELECT 1", vec![]),
			query("q2", "SELECT 2", vec![]),
		]);
		channel.fail_sends_after = Some(1);
		let sent = channel.sent();

		let termination = Session::new(channel, config(), executor()).run().await;

		assert!(termination.was_ready());
		assert!(matches!(termination.reason, SessionError::Channel(_)));
		assert_eq!(sent.lock().unwrap().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_handshake_timeout() {
		let mut channel = ScriptedChannel::new(vec![]);
		channel.hang_when_drained = true;
		let config = Arc::new(
			ConnectionConfig::new("ws://hub", "secret", "sqlite::memory:").handshake_timeout(Duration::from_secs(5)),
		);

		let termination = Session::new(channel, config, executor()).run().await;

		assert_eq!(termination.reached, SessionState::AwaitingAuth);
		assert!(matches!(termination.reason, SessionError::Handshake(_)));
	}

	#[test]
	fn test_state_transitions() {
		let mut session = Session::new(ScriptedChannel::new(vec![]), config(), executor());
		assert_eq!(session.state(), SessionState::AwaitingAuth);

		assert_eq!(session.accept(auth_ok()).unwrap(), Action::None);
		assert_eq!(session.state(), SessionState::Ready);

		assert_eq!(session.accept(HubMessage::Unknown).unwrap(), Action::Ignore);
		let action = session.accept(query("q1", "SELECT 1", vec![])).unwrap();
		assert!(matches!(action, Action::Execute(request) if request.id == "q1"));
	}
}
