// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! roster-server binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use http::HeaderValue;
use roster_server::{create_router, AppState};
use roster_server_config::{DeviceBackend, LogFormat, LoggingConfig, WireguardConfig};
use roster_server_db::{PoolOptions, SqliteMetadataStore};
use roster_server_wg::{PeerService, PeerServiceConfig};
use roster_wg_device::{DeviceAdapter, MemoryDevice, WgCommandDevice};
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

/// roster-server - manage the peers of a WireGuard interface over HTTP.
#[derive(Parser, Debug)]
#[command(name = "roster-server", about = "WireGuard peer management server", version)]
struct Args {
	/// Config file to read instead of /etc/roster/server.toml
	#[arg(long, env = "ROSTER_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => roster_server_config::load_config_with_file(path)?,
		None => roster_server_config::load_config()?,
	};

	init_tracing(&config.logging);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		interface = %config.wireguard.interface,
		"starting roster-server"
	);

	let pool_options = PoolOptions {
		max_connections: config.database.max_connections,
		busy_timeout: config.database.busy_timeout(),
	};
	let pool = roster_server_db::create_pool_with(&config.database.url, pool_options)
		.await
		.with_context(|| format!("opening database {}", config.database.url))?;
	roster_server_db::run_migrations(&pool).await?;
	let store = Arc::new(SqliteMetadataStore::new(pool));

	let device = open_device(&config.wireguard).await?;

	let mut service_config = PeerServiceConfig::new(config.wireguard.subnet);
	service_config.server_endpoint = config.wireguard.server_endpoint.clone();
	service_config.server_public_key = config.wireguard.server_public_key;
	service_config.stats_interval = config.wireguard.stats_interval();
	service_config.history_capacity = config.wireguard.history_capacity;

	let service = PeerService::new(store, device, service_config);
	service.start().await;

	let app = create_router(AppState::new(service.clone()))
		.layer(TraceLayer::new_for_http())
		.layer(cors_layer(&config.http.cors_allowed_origins)?);

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("binding {addr}"))?;
	tracing::info!("listening on {}", addr);

	let served = axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await;
	if let Err(e) = &served {
		tracing::error!(error = %e, "server error");
	}

	if let Err(e) = service.close().await {
		tracing::warn!(error = %e, "failed to close peer service cleanly");
	}

	tracing::info!("server shutdown complete");
	served.map_err(Into::into)
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
	let registry = tracing_subscriber::registry().with(filter);

	match logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

async fn open_device(config: &WireguardConfig) -> anyhow::Result<Arc<dyn DeviceAdapter>> {
	match config.backend {
		DeviceBackend::Memory => {
			tracing::warn!(
				interface = %config.interface,
				"using the in-memory device; peers are not applied to the kernel"
			);
			Ok(Arc::new(MemoryDevice::new(&config.interface)))
		}
		DeviceBackend::Command => match WgCommandDevice::open(&config.interface, &config.wg_binary).await {
			Ok(device) => Ok(Arc::new(device)),
			Err(e) if config.fallback_to_memory => {
				tracing::warn!(
					interface = %config.interface,
					error = %e,
					"cannot open WireGuard interface, falling back to the in-memory device"
				);
				Ok(Arc::new(MemoryDevice::new(&config.interface)))
			}
			Err(e) => Err(e).with_context(|| format!("opening WireGuard interface {}", config.interface)),
		},
	}
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
	let allow_origin = if origins.is_empty() {
		AllowOrigin::from(Any)
	} else {
		let values = origins
			.iter()
			.map(|o| {
				HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin {o:?}"))
			})
			.collect::<anyhow::Result<Vec<_>>>()?;
		AllowOrigin::list(values)
	};

	Ok(CorsLayer::new()
		.allow_origin(allow_origin)
		.allow_methods(Any)
		.allow_headers(Any))
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "failed to listen for ctrl-c");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	tracing::info!("received shutdown signal");
}
