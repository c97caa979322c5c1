// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Reconnect loop keeping one session to the hub alive.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::sleep};
use tracing::{info, warn};

use crate::{
	channel::Connector,
	config::{BackoffConfig, ConnectionConfig},
	executor::QueryExecutor,
	session::{Session, SessionState, Termination},
};

/// Exponential reconnect delay: doubles after every attempt up to `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
	initial: Duration,
	max: Duration,
	current: Duration,
}

impl Backoff {
	pub fn new(config: BackoffConfig) -> Self {
		Self {
			initial: config.initial,
			max: config.max,
			current: config.initial,
		}
	}

	/// Returns the delay to wait now and doubles the following one.
	pub fn next_delay(&mut self) -> Duration {
		let delay = self.current;
		self.current = self.current.saturating_mul(2).min(self.max);
		delay
	}

	pub fn reset(&mut self) {
		self.current = self.initial;
	}
}

/// Keeps re-establishing sessions until shutdown is signalled.
///
/// Every failure kind (dial, handshake, rejected token, channel) takes the
/// same path: wait for the current backoff, then dial again. The backoff
/// restarts from its initial value after any session that got past the
/// handshake.
pub struct Supervisor<C: Connector> {
	connector: C,
	config: Arc<ConnectionConfig>,
	executor: QueryExecutor,
	backoff: Backoff,
}

impl<C: Connector> Supervisor<C> {
	pub fn new(connector: C, config: Arc<ConnectionConfig>, executor: QueryExecutor) -> Self {
		let backoff = Backoff::new(config.backoff);
		Self {
			connector,
			config,
			executor,
			backoff,
		}
	}

	/// Runs until `shutdown` turns true or its sender is dropped.
	pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
		loop {
			let termination = tokio::select! {
				biased;
				_ = wait_for_shutdown(&mut shutdown) => break,
				termination = self.attempt() => termination,
			};

			if termination.was_ready() {
				self.backoff.reset();
			}

			let delay = self.backoff.next_delay();
			warn!("Connection error: {}", termination.reason);
			info!("Reconnecting in {:?}", delay);

			tokio::select! {
				biased;
				_ = wait_for_shutdown(&mut shutdown) => break,
				_ = sleep(delay) => {}
			}
		}
		info!("Supervisor stopped");
	}

	async fn attempt(&self) -> Termination {
		info!("Connecting to hub: {}", self.config.hub_url);
		match self.connector.connect().await {
			Ok(channel) => Session::new(channel, self.config.clone(), self.executor.clone()).run().await,
			Err(reason) => Termination {
				reached: SessionState::AwaitingAuth,
				reason,
			},
		}
	}
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
	loop {
		if *shutdown.borrow_and_update() {
			return;
		}
		if shutdown.changed().await.is_err() {
			return;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use async_trait::async_trait;
	use tokio::time::Instant;

	use super::*;
	use crate::{
		channel::scripted::ScriptedChannel,
		config::PoolConfig,
		database::Sqlite,
		error::SessionError,
		protocol::{ClientMessage, HubMessage},
	};

	#[test]
	fn test_backoff_sequence() {
		let mut backoff = Backoff::new(BackoffConfig::default());
		let delays: Vec<u64> = (0..9).map(|_| backoff.next_delay().as_secs()).collect();
		assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
	}

	#[test]
	fn test_backoff_reset() {
		let mut backoff = Backoff::new(BackoffConfig::default());
		backoff.next_delay();
		backoff.next_delay();
		backoff.next_delay();
		backoff.reset();
		assert_eq!(backoff.next_delay(), Duration::from_secs(1));
		assert_eq!(backoff.next_delay(), Duration::from_secs(2));
	}

	/// One scripted outcome per dial attempt; dials past the script hang.
	enum Attempt {
		DialFails,
		Session(Vec<HubMessage>),
	}

	struct ScriptedConnector {
		attempts: Mutex<Vec<Attempt>>,
		dialed_at: Arc<Mutex<Vec<Instant>>>,
		sent: Arc<Mutex<Vec<ClientMessage>>>,
	}

	impl ScriptedConnector {
		fn new(mut attempts: Vec<Attempt>) -> Self {
			attempts.reverse();
			Self {
				attempts: Mutex::new(attempts),
				dialed_at: Arc::new(Mutex::new(Vec::new())),
				sent: Arc::new(Mutex::new(Vec::new())),
			}
		}
	}

	#[async_trait]
	impl Connector for ScriptedConnector {
		type Channel = ScriptedChannel;

		async fn connect(&self) -> Result<ScriptedChannel, SessionError> {
			self.dialed_at.lock().unwrap().push(Instant::now());
			let attempt = self.attempts.lock().unwrap().pop();
			match attempt {
				Some(Attempt::DialFails) => Err(SessionError::Dial("connection refused".to_string())),
				Some(Attempt::Session(inbound)) => {
					let mut channel = ScriptedChannel::new(inbound);
					channel.sent = self.sent.clone();
					Ok(channel)
				}
				None => std::future::pending().await,
			}
		}
	}

	fn supervisor(connector: ScriptedConnector) -> Supervisor<ScriptedConnector> {
		let config = Arc::new(ConnectionConfig::new("ws://hub", "secret", "sqlite::memory:"));
		let executor = QueryExecutor::new(Arc::new(Sqlite::memory(&PoolConfig::default()).unwrap()));
		Supervisor::new(connector, config, executor)
	}

	fn gaps(dialed_at: &[Instant]) -> Vec<u64> {
		dialed_at.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect()
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_dials_back_off_exponentially() {
		let connector = ScriptedConnector::new(vec![
			Attempt::DialFails,
			Attempt::DialFails,
			Attempt::DialFails,
			Attempt::DialFails,
		]);
		let dialed_at = connector.dialed_at.clone();
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let handle = tokio::spawn(supervisor(connector).run(shutdown_rx));

		sleep(Duration::from_secs(30)).await;
		assert_eq!(gaps(&dialed_at.lock().unwrap()), vec![1, 2, 4, 8]);

		shutdown_tx.send(true).unwrap();
		handle.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_backoff_resets_after_ready_session() {
		let connector = ScriptedConnector::new(vec![
			Attempt::DialFails,
			Attempt::DialFails,
			Attempt::Session(vec![HubMessage::Auth {
				success: true,
				error: None,
			}]),
			Attempt::DialFails,
		]);
		let dialed_at = connector.dialed_at.clone();
		let sent = connector.sent.clone();
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let handle = tokio::spawn(supervisor(connector).run(shutdown_rx));

		sleep(Duration::from_secs(30)).await;
		// 1s, 2s, then the authenticated session ends and the delay restarts at 1s.
		assert_eq!(gaps(&dialed_at.lock().unwrap()), vec![1, 2, 1, 2]);
		assert_eq!(sent.lock().unwrap().len(), 1);

		shutdown_tx.send(true).unwrap();
		handle.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_rejected_token_is_retried_with_backoff() {
		let rejected = || {
			Attempt::Session(vec![HubMessage::Auth {
				success: false,
				error: Some("token revoked".to_string()),
			}])
		};
		let connector = ScriptedConnector::new(vec![rejected(), rejected(), rejected()]);
		let dialed_at = connector.dialed_at.clone();
		let sent = connector.sent.clone();
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let handle = tokio::spawn(supervisor(connector).run(shutdown_rx));

		sleep(Duration::from_secs(30)).await;
		assert_eq!(gaps(&dialed_at.lock().unwrap()), vec![1, 2, 4]);
		// Every attempt re-sends auth from scratch.
		assert_eq!(sent.lock().unwrap().len(), 3);

		shutdown_tx.send(true).unwrap();
		handle.await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_interrupts_backoff_sleep() {
		let connector = ScriptedConnector::new(vec![Attempt::DialFails]);
		let (shutdown_tx, shutdown_rx) = watch::channel(false);
		let config = Arc::new(ConnectionConfig::new("ws://hub", "secret", "sqlite::memory:").backoff(
			BackoffConfig {
				initial: Duration::from_secs(3600),
				max: Duration::from_secs(3600),
			},
		));
		let executor = QueryExecutor::new(Arc::new(Sqlite::memory(&PoolConfig::default()).unwrap()));
		let handle = tokio::spawn(Supervisor::new(connector, config, executor).run(shutdown_rx));

		sleep(Duration::from_secs(1)).await;
		let start = Instant::now();
		drop(shutdown_tx);
		handle.await.unwrap();
		assert!(start.elapsed() < Duration::from_secs(1));
	}
}
