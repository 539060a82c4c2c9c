// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer metadata store settings.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_URL: &str = "sqlite:./roster.db";

/// SQLite allows one writer at a time; a small pool is plenty.
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	/// `sqlite:` URL of the metadata store.
	pub url: String,
	pub max_connections: u32,
	/// How long a writer waits on a locked database before failing.
	pub busy_timeout_secs: u64,
}

impl DatabaseConfig {
	pub fn busy_timeout(&self) -> Duration {
		Duration::from_secs(self.busy_timeout_secs)
	}
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: DEFAULT_URL.to_string(),
			max_connections: DEFAULT_MAX_CONNECTIONS,
			busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub max_connections: Option<u32>,
	#[serde(default)]
	pub busy_timeout_secs: Option<u64>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.max_connections.is_some() {
			self.max_connections = other.max_connections;
		}
		if other.busy_timeout_secs.is_some() {
			self.busy_timeout_secs = other.busy_timeout_secs;
		}
	}

	pub fn finalize(self) -> Result<DatabaseConfig, ConfigError> {
		let url = self
			.url
			.map(|u| u.trim().to_string())
			.unwrap_or_else(|| DEFAULT_URL.to_string());
		if !url.starts_with("sqlite:") {
			return Err(ConfigError::invalid_value(
				"database.url",
				format!("'{url}' is not a sqlite: URL"),
			));
		}

		let max_connections = self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
		if max_connections == 0 {
			return Err(ConfigError::Validation(
				"database.max_connections must be greater than zero".to_string(),
			));
		}

		Ok(DatabaseConfig {
			url,
			max_connections,
			busy_timeout_secs: self.busy_timeout_secs.unwrap_or(DEFAULT_BUSY_TIMEOUT_SECS),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_point_at_local_file() {
		let config = DatabaseConfigLayer::default().finalize().unwrap();
		assert_eq!(config.url, "sqlite:./roster.db");
		assert_eq!(config.max_connections, 4);
		assert_eq!(config.busy_timeout(), Duration::from_secs(5));
	}

	#[test]
	fn later_layer_overrides_only_set_fields() {
		let mut base = DatabaseConfigLayer {
			url: Some("sqlite:/var/lib/roster/roster.db".to_string()),
			max_connections: Some(8),
			busy_timeout_secs: None,
		};
		base.merge(DatabaseConfigLayer {
			busy_timeout_secs: Some(30),
			..Default::default()
		});

		let config = base.finalize().unwrap();
		assert_eq!(config.url, "sqlite:/var/lib/roster/roster.db");
		assert_eq!(config.max_connections, 8);
		assert_eq!(config.busy_timeout_secs, 30);
	}

	#[test]
	fn rejects_non_sqlite_url_and_empty_pool() {
		let err = DatabaseConfigLayer {
			url: Some("postgres://localhost/roster".to_string()),
			..Default::default()
		}
		.finalize()
		.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "database.url"));

		let err = DatabaseConfigLayer {
			max_connections: Some(0),
			..Default::default()
		}
		.finalize()
		.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}
}
