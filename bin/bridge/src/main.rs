// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

mod args;

use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use reifydb_bridge::{ConnectionConfig, Database, DatabaseError, QueryExecutor, Supervisor, WsConnector, database, logging};
use tokio::{runtime::Builder, sync::watch, task::spawn_blocking};
use tracing::{error, info};

use crate::args::Args;

/// How long blocking database calls may keep the process alive after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
	let args = Args::parse();

	if let Err(err) = logging::init(args.log_format, &args.log_level) {
		eprintln!("Invalid logging configuration: {}", err);
		return ExitCode::FAILURE;
	}

	// Required by tokio-tungstenite for wss:// hubs.
	let _ = rustls::crypto::ring::default_provider().install_default();

	let config = args.into_config();
	if let Err(err) = config.validate() {
		error!("{}", err);
		return ExitCode::FAILURE;
	}

	let runtime = match Builder::new_multi_thread().enable_all().thread_name("bridge").build() {
		Ok(runtime) => runtime,
		Err(err) => {
			error!("Failed to start runtime: {}", err);
			return ExitCode::FAILURE;
		}
	};

	let code = runtime.block_on(run(Arc::new(config)));
	runtime.shutdown_timeout(SHUTDOWN_GRACE);
	code
}

async fn run(config: Arc<ConnectionConfig>) -> ExitCode {
	info!("Bridge agent starting");
	info!("Hub: {}", config.hub_url);

	info!("Connecting to database");
	let database = match connect_database(&config).await {
		Ok(database) => database,
		Err(err) => {
			error!("Database connection failed: {}", err);
			return ExitCode::FAILURE;
		}
	};
	info!("Database connected");

	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	tokio::spawn(async move {
		wait_for_signal().await;
		info!("Shutting down");
		let _ = shutdown_tx.send(true);
	});

	let connector = WsConnector::new(config.hub_url.clone());
	Supervisor::new(connector, config, QueryExecutor::new(database)).run(shutdown_rx).await;

	ExitCode::SUCCESS
}

async fn connect_database(config: &ConnectionConfig) -> Result<Arc<dyn Database>, DatabaseError> {
	let url = config.database_url.clone();
	let pool = config.pool;
	spawn_blocking(move || {
		let database = database::open(&url, &pool)?;
		database.ping()?;
		Ok(database)
	})
	.await
	.map_err(|e| DatabaseError::Task(e.to_string()))?
}

async fn wait_for_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{SignalKind, signal};

		match signal(SignalKind::terminate()) {
			Ok(mut terminate) => {
				tokio::select! {
					_ = tokio::signal::ctrl_c() => {}
					_ = terminate.recv() => {}
				}
			}
			Err(_) => {
				let _ = tokio::signal::ctrl_c().await;
			}
		}
	}

	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}
}
