// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and environment
//! variables.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, WireguardConfigLayer,
};

/// Default location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/roster/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source. Defaults are applied at finalize, so the layer
/// is empty.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

pub struct TomlSource {
	path: PathBuf,
	required: bool,
}

impl TomlSource {
	/// A file that must exist.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			required: true,
		}
	}

	/// The system-wide file; silently skipped when absent.
	pub fn system() -> Self {
		Self {
			path: PathBuf::from(SYSTEM_CONFIG_PATH),
			required: false,
		}
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `ROSTER_SERVER_<SECTION>_<FIELD>`; the WireGuard section uses
/// the `WG_` section prefix.
pub struct EnvSource;

impl EnvSource {
	/// Builds the layer from an arbitrary variable lookup.
	pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfigLayer, ConfigError> {
		let env = Env(&lookup);
		Ok(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				host: env.var("ROSTER_SERVER_HOST"),
				port: env.parse("ROSTER_SERVER_PORT")?,
				cors_allowed_origins: env.list("ROSTER_SERVER_CORS_ALLOWED_ORIGINS"),
			}),
			database: Some(DatabaseConfigLayer {
				url: env.var("ROSTER_SERVER_DATABASE_URL"),
				max_connections: env.parse("ROSTER_SERVER_DATABASE_MAX_CONNECTIONS")?,
				busy_timeout_secs: env.parse("ROSTER_SERVER_DATABASE_BUSY_TIMEOUT_SECS")?,
			}),
			wireguard: Some(WireguardConfigLayer {
				interface: env.var("ROSTER_SERVER_WG_INTERFACE"),
				subnet: env.var("ROSTER_SERVER_WG_SUBNET"),
				server_endpoint: env.var("ROSTER_SERVER_WG_SERVER_ENDPOINT"),
				server_public_key: env.var("ROSTER_SERVER_WG_SERVER_PUBLIC_KEY"),
				backend: env.parse("ROSTER_SERVER_WG_BACKEND")?,
				wg_binary: env.var("ROSTER_SERVER_WG_BINARY"),
				stats_interval_secs: env.parse("ROSTER_SERVER_WG_STATS_INTERVAL_SECS")?,
				history_capacity: env.parse("ROSTER_SERVER_WG_HISTORY_CAPACITY")?,
				fallback_to_memory: env.bool("ROSTER_SERVER_WG_FALLBACK_TO_MEMORY"),
			}),
			logging: Some(LoggingConfigLayer {
				level: env.var("ROSTER_SERVER_LOG_LEVEL"),
				format: env.parse("ROSTER_SERVER_LOG_FORMAT")?,
			}),
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Self::load_from(|name| std::env::var(name).ok())
	}
}

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn list(&self, name: &str) -> Option<Vec<String>> {
		self.var(name).map(|s| {
			s.split(',')
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty())
				.collect()
		})
	}

	fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
		T::Err: std::fmt::Display,
	{
		match self.var(name) {
			Some(v) => v.trim().parse().map(Some).map_err(|e| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid value '{v}': {e}"),
			}),
			None => Ok(None),
		}
	}
}
