// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;

use async_trait::async_trait;
use roster_wg_common::WgPublicKey;
use sqlx::sqlite::SqlitePool;

use crate::error::Result;
use crate::peers::{PeerRecord, PeerRepository};
use crate::settings::{GlobalSettings, SettingsRepository};

/// Durable record of peers and network settings.
///
/// Every mutation has been committed when it returns `Ok`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
	async fn get(&self, public_key: &WgPublicKey) -> Result<Option<PeerRecord>>;
	async fn put(&self, record: &PeerRecord) -> Result<()>;
	/// Returns whether a record was removed.
	async fn delete(&self, public_key: &WgPublicKey) -> Result<bool>;
	async fn list_all(&self) -> Result<BTreeMap<WgPublicKey, PeerRecord>>;
	/// Never fails; falls back to defaults when the row is missing or unreadable.
	async fn get_settings(&self) -> GlobalSettings;
	async fn update_settings(&self, settings: &GlobalSettings) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteMetadataStore {
	peers: PeerRepository,
	settings: SettingsRepository,
}

impl SqliteMetadataStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			peers: PeerRepository::new(pool.clone()),
			settings: SettingsRepository::new(pool),
		}
	}
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
	async fn get(&self, public_key: &WgPublicKey) -> Result<Option<PeerRecord>> {
		self.peers.get(public_key).await
	}

	async fn put(&self, record: &PeerRecord) -> Result<()> {
		self.peers.put(record).await
	}

	async fn delete(&self, public_key: &WgPublicKey) -> Result<bool> {
		Ok(self.peers.delete(public_key).await? > 0)
	}

	async fn list_all(&self) -> Result<BTreeMap<WgPublicKey, PeerRecord>> {
		self.peers.list_all().await
	}

	async fn get_settings(&self) -> GlobalSettings {
		self.settings.get().await
	}

	async fn update_settings(&self, settings: &GlobalSettings) -> Result<()> {
		self.settings.update(settings).await
	}
}
