// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the roster server.
//!
//! Layers are read from built-in defaults, a TOML file and `ROSTER_SERVER_*`
//! environment variables, merged in that order and validated once.
//!
//! # Usage
//!
//! ```ignore
//! use roster_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub wireguard: WireguardConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`ROSTER_SERVER_*`)
/// 2. Config file (`/etc/roster/server.toml`, skipped when absent)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Like [`load_config`] but reads `config_path`, which must exist.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

pub fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let database = layer.database.unwrap_or_default().finalize()?;
	let wireguard = layer.wireguard.unwrap_or_default().finalize()?;
	let logging = layer.logging.unwrap_or_default().finalize();

	info!(
		host = %http.host,
		port = http.port,
		database = %database.url,
		interface = %wireguard.interface,
		subnet = %wireguard.subnet,
		backend = ?wireguard.backend,
		"server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		database,
		wireguard,
		logging,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	struct Fixed(&'static str, Precedence, ServerConfigLayer);

	impl ConfigSource for Fixed {
		fn name(&self) -> &'static str {
			self.0
		}

		fn precedence(&self) -> Precedence {
			self.1
		}

		fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
			Ok(self.2.clone())
		}
	}

	fn layer(toml: &str) -> ServerConfigLayer {
		toml::from_str(toml).unwrap()
	}

	#[test]
	fn higher_precedence_wins_regardless_of_order() {
		let config = load_from_sources(vec![
			Box::new(Fixed("env", Precedence::Environment, layer("[http]\nport = 7000"))),
			Box::new(Fixed(
				"file",
				Precedence::ConfigFile,
				layer("[http]\nport = 6000\nhost = \"127.0.0.1\""),
			)),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert_eq!(config.http.port, 7000);
		assert_eq!(config.http.host, "127.0.0.1");
		assert_eq!(config.socket_addr(), "127.0.0.1:7000");
	}

	#[test]
	fn defaults_only() {
		let config = load_from_sources(vec![Box::new(DefaultsSource)]).unwrap();
		assert_eq!(config.database.url, "sqlite:./roster.db");
		assert_eq!(config.wireguard.interface, "wg0");
		assert_eq!(config.logging.format, LogFormat::Pretty);
	}

	#[test]
	fn invalid_subnet_fails_loading() {
		let result = load_from_sources(vec![Box::new(Fixed(
			"file",
			Precedence::ConfigFile,
			layer("[wireguard]\nsubnet = \"not-a-subnet\""),
		))]);
		assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
	}

	#[test]
	fn loads_explicit_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			"[database]\nurl = \"sqlite:/var/lib/roster/roster.db\"\n[wireguard]\nsubnet = \"10.66.0.0/16\"\nserver_endpoint = \"vpn.example.com:51820\""
		)
		.unwrap();

		let config = load_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(file.path())),
		])
		.unwrap();
		assert_eq!(config.database.url, "sqlite:/var/lib/roster/roster.db");
		assert_eq!(config.wireguard.subnet.to_string(), "10.66.0.0/16");
		assert_eq!(config.wireguard.server_endpoint, "vpn.example.com:51820");
	}
}
