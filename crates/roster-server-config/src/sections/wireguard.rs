// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard interface and engine configuration.

use std::str::FromStr;
use std::time::Duration;

use ipnet::IpNet;
use roster_wg_common::WgPublicKey;
use serde::Deserialize;

use crate::error::ConfigError;

/// How the server talks to the interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
	/// Shell out to `wg(8)`.
	#[default]
	Command,
	/// In-process peer table, nothing reaches the kernel.
	Memory,
}

impl FromStr for DeviceBackend {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"command" | "wg" => Ok(DeviceBackend::Command),
			"memory" | "mock" => Ok(DeviceBackend::Memory),
			other => Err(ConfigError::invalid_value(
				"wireguard.backend",
				format!("expected 'command' or 'memory', got '{other}'"),
			)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireguardConfig {
	pub interface: String,
	pub subnet: IpNet,
	pub server_endpoint: String,
	pub server_public_key: Option<WgPublicKey>,
	pub backend: DeviceBackend,
	pub wg_binary: String,
	pub stats_interval_secs: u64,
	pub history_capacity: usize,
	/// Serve from the in-memory backend when the interface cannot be opened.
	pub fallback_to_memory: bool,
}

impl WireguardConfig {
	pub fn stats_interval(&self) -> Duration {
		Duration::from_secs(self.stats_interval_secs)
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireguardConfigLayer {
	#[serde(default)]
	pub interface: Option<String>,
	#[serde(default)]
	pub subnet: Option<String>,
	#[serde(default)]
	pub server_endpoint: Option<String>,
	#[serde(default)]
	pub server_public_key: Option<String>,
	#[serde(default)]
	pub backend: Option<DeviceBackend>,
	#[serde(default)]
	pub wg_binary: Option<String>,
	#[serde(default)]
	pub stats_interval_secs: Option<u64>,
	#[serde(default)]
	pub history_capacity: Option<usize>,
	#[serde(default)]
	pub fallback_to_memory: Option<bool>,
}

impl WireguardConfigLayer {
	pub fn merge(&mut self, other: WireguardConfigLayer) {
		if other.interface.is_some() {
			self.interface = other.interface;
		}
		if other.subnet.is_some() {
			self.subnet = other.subnet;
		}
		if other.server_endpoint.is_some() {
			self.server_endpoint = other.server_endpoint;
		}
		if other.server_public_key.is_some() {
			self.server_public_key = other.server_public_key;
		}
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.wg_binary.is_some() {
			self.wg_binary = other.wg_binary;
		}
		if other.stats_interval_secs.is_some() {
			self.stats_interval_secs = other.stats_interval_secs;
		}
		if other.history_capacity.is_some() {
			self.history_capacity = other.history_capacity;
		}
		if other.fallback_to_memory.is_some() {
			self.fallback_to_memory = other.fallback_to_memory;
		}
	}

	pub fn finalize(self) -> Result<WireguardConfig, ConfigError> {
		let interface = self.interface.unwrap_or_else(|| "wg0".to_string());
		if interface.trim().is_empty() {
			return Err(ConfigError::Validation(
				"wireguard.interface must not be empty".to_string(),
			));
		}

		let subnet_raw = self.subnet.unwrap_or_else(|| "10.0.0.0/24".to_string());
		let subnet = subnet_raw
			.trim()
			.parse::<IpNet>()
			.map_err(|e| ConfigError::invalid_value("wireguard.subnet", format!("'{subnet_raw}': {e}")))?
			.trunc();

		let server_public_key = match self.server_public_key.as_deref().map(str::trim) {
			Some(key) if !key.is_empty() => Some(
				WgPublicKey::from_base64(key)
					.map_err(|e| ConfigError::invalid_value("wireguard.server_public_key", e.to_string()))?,
			),
			_ => None,
		};

		let stats_interval_secs = self.stats_interval_secs.unwrap_or(60);
		if stats_interval_secs == 0 {
			return Err(ConfigError::Validation(
				"wireguard.stats_interval_secs must be greater than zero".to_string(),
			));
		}
		let history_capacity = self.history_capacity.unwrap_or(100);
		if history_capacity == 0 {
			return Err(ConfigError::Validation(
				"wireguard.history_capacity must be greater than zero".to_string(),
			));
		}

		Ok(WireguardConfig {
			interface,
			subnet,
			server_endpoint: self.server_endpoint.unwrap_or_default().trim().to_string(),
			server_public_key,
			backend: self.backend.unwrap_or_default(),
			wg_binary: self.wg_binary.unwrap_or_else(|| "wg".to_string()),
			stats_interval_secs,
			history_capacity,
			fallback_to_memory: self.fallback_to_memory.unwrap_or(true),
		})
	}
}
