// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-peer metadata keyed by public key.

use std::collections::BTreeMap;

use ipnet::IpNet;
use roster_wg_common::{WgPresharedKey, WgPrivateKey, WgPublicKey};
use sqlx::sqlite::SqlitePool;

use crate::error::{DbError, Result};

/// Stored attributes of one peer.
///
/// `private_key` is only present when the server generated the key pair.
/// Empty strings and zero numbers in the override fields mean "inherit the
/// global default".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
	pub public_key: WgPublicKey,
	pub private_key: Option<WgPrivateKey>,
	pub preshared_key: Option<WgPresharedKey>,
	pub name: String,
	pub allowed_ips: Vec<IpNet>,
	pub dns: String,
	pub mtu: u32,
	pub persistent_keepalive: u32,
	pub interface_address: String,
}

impl PeerRecord {
	pub fn new(public_key: WgPublicKey, name: impl Into<String>, allowed_ips: Vec<IpNet>) -> Self {
		Self {
			public_key,
			private_key: None,
			preshared_key: None,
			name: name.into(),
			allowed_ips,
			dns: String::new(),
			mtu: 0,
			persistent_keepalive: 0,
			interface_address: String::new(),
		}
	}
}

type PeerRow = (
	String,
	Option<String>,
	Option<String>,
	String,
	String,
	String,
	i64,
	i64,
	String,
);

const SELECT_PEERS: &str = "SELECT public_key, private_key, preshared_key, name, allowed_ips, dns, mtu, persistent_keepalive, interface_address FROM peers";

const SELECT_PEER: &str = "SELECT public_key, private_key, preshared_key, name, allowed_ips, dns, mtu, persistent_keepalive, interface_address FROM peers WHERE public_key = ?";

fn decode_row(row: PeerRow) -> Result<PeerRecord> {
	let (
		public_key,
		private_key,
		preshared_key,
		name,
		allowed_ips,
		dns,
		mtu,
		keepalive,
		interface_address,
	) = row;
	let corrupt = |message: String| DbError::Corrupt {
		key: public_key.clone(),
		message,
	};

	let parsed_key = WgPublicKey::from_base64(&public_key)
		.map_err(|e| corrupt(format!("public key: {e}")))?;
	let private_key = match private_key.as_deref() {
		None | Some("") => None,
		Some(s) => Some(
			WgPrivateKey::from_base64(s).map_err(|e| corrupt(format!("private key: {e}")))?,
		),
	};
	let preshared_key = match preshared_key.as_deref() {
		None | Some("") => None,
		Some(s) => Some(
			WgPresharedKey::from_base64(s).map_err(|e| corrupt(format!("preshared key: {e}")))?,
		),
	};
	let allowed_ips: Vec<IpNet> = serde_json::from_str(&allowed_ips)
		.map_err(|e| corrupt(format!("allowed ips: {e}")))?;

	Ok(PeerRecord {
		public_key: parsed_key,
		private_key,
		preshared_key,
		name,
		allowed_ips,
		dns,
		mtu: u32::try_from(mtu).map_err(|_| corrupt(format!("mtu out of range: {mtu}")))?,
		persistent_keepalive: u32::try_from(keepalive)
			.map_err(|_| corrupt(format!("keepalive out of range: {keepalive}")))?,
		interface_address,
	})
}

#[derive(Clone)]
pub struct PeerRepository {
	pool: SqlitePool,
}

impl PeerRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self), fields(public_key = %public_key))]
	pub async fn get(&self, public_key: &WgPublicKey) -> Result<Option<PeerRecord>> {
		let row: Option<PeerRow> = sqlx::query_as(SELECT_PEER)
			.bind(public_key.to_base64())
			.fetch_optional(&self.pool)
			.await?;

		row.map(decode_row).transpose()
	}

	/// Inserts or replaces the record stored under `record.public_key`.
	#[tracing::instrument(skip(self, record), fields(public_key = %record.public_key))]
	pub async fn put(&self, record: &PeerRecord) -> Result<()> {
		let allowed_ips = serde_json::to_string(&record.allowed_ips)?;
		let private_key = record.private_key.as_ref().map(|k| k.to_base64());
		let preshared_key = record.preshared_key.as_ref().map(|k| k.to_base64());

		sqlx::query(
			"INSERT INTO peers (public_key, private_key, preshared_key, name, allowed_ips, dns, mtu, persistent_keepalive, interface_address)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			 ON CONFLICT(public_key) DO UPDATE SET
				private_key = excluded.private_key,
				preshared_key = excluded.preshared_key,
				name = excluded.name,
				allowed_ips = excluded.allowed_ips,
				dns = excluded.dns,
				mtu = excluded.mtu,
				persistent_keepalive = excluded.persistent_keepalive,
				interface_address = excluded.interface_address,
				updated_at = datetime('now')",
		)
		.bind(record.public_key.to_base64())
		.bind(private_key.as_ref().map(|k| k.as_str()))
		.bind(preshared_key.as_ref().map(|k| k.as_str()))
		.bind(&record.name)
		.bind(allowed_ips)
		.bind(&record.dns)
		.bind(i64::from(record.mtu))
		.bind(i64::from(record.persistent_keepalive))
		.bind(&record.interface_address)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	/// Deletes the record. Returns the number of rows removed (0 or 1).
	#[tracing::instrument(skip(self), fields(public_key = %public_key))]
	pub async fn delete(&self, public_key: &WgPublicKey) -> Result<u64> {
		let result = sqlx::query("DELETE FROM peers WHERE public_key = ?")
			.bind(public_key.to_base64())
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	/// Every decodable record. Rows that fail to decode are logged and
	/// skipped so one bad row cannot hide the rest of the roster.
	#[tracing::instrument(skip(self))]
	pub async fn list_all(&self) -> Result<BTreeMap<WgPublicKey, PeerRecord>> {
		let rows: Vec<PeerRow> = sqlx::query_as(SELECT_PEERS).fetch_all(&self.pool).await?;

		let mut records = BTreeMap::new();
		for row in rows {
			match decode_row(row) {
				Ok(record) => {
					records.insert(record.public_key, record);
				}
				Err(DbError::Corrupt { key, message }) => {
					tracing::error!(public_key = %key, %message, "skipping unreadable peer record");
				}
				Err(e) => return Err(e),
			}
		}

		Ok(records)
	}
}
