// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::error::{DbError, Result};

pub const DEFAULT_DNS: &str = "1.1.1.1, 8.8.8.8";
pub const DEFAULT_MTU: u32 = 1420;
pub const DEFAULT_KEEPALIVE: u32 = 25;

/// Network-wide defaults shared by every peer profile.
///
/// `server_address` is this device's own address with prefix
/// (`10.0.0.1/24`); it is excluded from allocation. `endpoint` is the
/// `host:port` clients dial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
	#[serde(default)]
	pub server_address: String,
	#[serde(default)]
	pub dns: String,
	#[serde(default)]
	pub mtu: u32,
	#[serde(default)]
	pub keepalive: u32,
	#[serde(default)]
	pub endpoint: String,
}

impl Default for GlobalSettings {
	fn default() -> Self {
		Self {
			server_address: String::new(),
			dns: DEFAULT_DNS.to_string(),
			mtu: DEFAULT_MTU,
			keepalive: DEFAULT_KEEPALIVE,
			endpoint: String::new(),
		}
	}
}

type SettingsRow = (String, String, i64, i64, String);

#[derive(Clone)]
pub struct SettingsRepository {
	pool: SqlitePool,
}

impl SettingsRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Reads the settings singleton. Never fails: a missing or unreadable
	/// row yields [`GlobalSettings::default`].
	#[tracing::instrument(skip(self))]
	pub async fn get(&self) -> GlobalSettings {
		match self.try_get().await {
			Ok(Some(settings)) => settings,
			Ok(None) => {
				tracing::warn!("settings row missing, using defaults");
				GlobalSettings::default()
			}
			Err(e) => {
				tracing::warn!(error = %e, "failed to read settings, using defaults");
				GlobalSettings::default()
			}
		}
	}

	async fn try_get(&self) -> Result<Option<GlobalSettings>> {
		let row: Option<SettingsRow> = sqlx::query_as(
			"SELECT server_address, dns, mtu, keepalive, endpoint FROM settings WHERE id = 1",
		)
		.fetch_optional(&self.pool)
		.await?;

		let Some((server_address, dns, mtu, keepalive, endpoint)) = row else {
			return Ok(None);
		};
		let corrupt = |field: &str, value: i64| DbError::Corrupt {
			key: "settings".to_string(),
			message: format!("{field} out of range: {value}"),
		};

		Ok(Some(GlobalSettings {
			server_address,
			dns,
			mtu: u32::try_from(mtu).map_err(|_| corrupt("mtu", mtu))?,
			keepalive: u32::try_from(keepalive).map_err(|_| corrupt("keepalive", keepalive))?,
			endpoint,
		}))
	}

	#[tracing::instrument(skip(self, settings))]
	pub async fn update(&self, settings: &GlobalSettings) -> Result<()> {
		sqlx::query(
			"INSERT INTO settings (id, server_address, dns, mtu, keepalive, endpoint)
			 VALUES (1, ?, ?, ?, ?, ?)
			 ON CONFLICT(id) DO UPDATE SET
				server_address = excluded.server_address,
				dns = excluded.dns,
				mtu = excluded.mtu,
				keepalive = excluded.keepalive,
				endpoint = excluded.endpoint",
		)
		.bind(&settings.server_address)
		.bind(&settings.dns)
		.bind(i64::from(settings.mtu))
		.bind(i64::from(settings.keepalive))
		.bind(&settings.endpoint)
		.execute(&self.pool)
		.await?;

		tracing::debug!("settings updated");
		Ok(())
	}
}
