// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use roster_wg_common::{WgPresharedKey, WgPublicKey};

use crate::error::Result;

/// Live state of one peer as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePeer {
	pub public_key: WgPublicKey,
	pub endpoint: Option<String>,
	pub allowed_ips: Vec<IpNet>,
	pub last_handshake: Option<DateTime<Utc>>,
	pub rx_bytes: u64,
	pub tx_bytes: u64,
	pub persistent_keepalive: Option<u16>,
	pub has_preshared_key: bool,
}

impl DevicePeer {
	pub fn new(public_key: WgPublicKey, allowed_ips: Vec<IpNet>) -> Self {
		Self {
			public_key,
			endpoint: None,
			allowed_ips,
			last_handshake: None,
			rx_bytes: 0,
			tx_bytes: 0,
			persistent_keepalive: None,
			has_preshared_key: false,
		}
	}
}

/// Snapshot of the interface and its peer table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
	pub name: String,
	pub public_key: Option<WgPublicKey>,
	pub listen_port: u16,
	pub peers: Vec<DevicePeer>,
}

impl DeviceInfo {
	pub fn peer(&self, public_key: &WgPublicKey) -> Option<&DevicePeer> {
		self.peers.iter().find(|p| &p.public_key == public_key)
	}

	/// Interface-wide (receive, transmit) byte counters.
	pub fn totals(&self) -> (u64, u64) {
		self.peers.iter().fold((0, 0), |(rx, tx), p| {
			(rx.saturating_add(p.rx_bytes), tx.saturating_add(p.tx_bytes))
		})
	}
}

/// One imperative configuration command for a single peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerChange {
	/// Add the peer, or replace its allowed IPs if it already exists.
	/// Other peers are never touched. A `None` preshared key leaves any
	/// existing one in place.
	Upsert {
		public_key: WgPublicKey,
		allowed_ips: Vec<IpNet>,
		preshared_key: Option<WgPresharedKey>,
	},

	/// Replace the allowed IPs of a peer that must already exist.
	UpdateAllowedIps {
		public_key: WgPublicKey,
		allowed_ips: Vec<IpNet>,
	},

	/// Remove the peer. Removing an absent peer is not an error.
	Remove { public_key: WgPublicKey },
}

impl PeerChange {
	pub fn public_key(&self) -> &WgPublicKey {
		match self {
			PeerChange::Upsert { public_key, .. }
			| PeerChange::UpdateAllowedIps { public_key, .. }
			| PeerChange::Remove { public_key } => public_key,
		}
	}
}

/// Handle on the live WireGuard device.
///
/// Implementations must be safe to share between tasks. If the underlying
/// driver cannot take concurrent configuration calls the adapter serialises
/// [`DeviceAdapter::apply`] itself.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
	/// Interface name, e.g. `wg0`.
	fn name(&self) -> &str;

	/// Reads the current interface state and peer table.
	async fn device(&self) -> Result<DeviceInfo>;

	/// Applies a batch of changes in order. Fails on the first rejected change.
	async fn apply(&self, changes: &[PeerChange]) -> Result<()>;

	/// Releases the handle. Later calls return [`crate::DeviceError::Closed`].
	async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
	use super::*;
	use roster_wg_common::WgKeyPair;

	#[test]
	fn totals_sum_all_peers() {
		let mut a = DevicePeer::new(*WgKeyPair::generate().public_key(), vec![]);
		a.rx_bytes = 10;
		a.tx_bytes = 1;
		let mut b = DevicePeer::new(*WgKeyPair::generate().public_key(), vec![]);
		b.rx_bytes = 5;
		b.tx_bytes = u64::MAX;
		let info = DeviceInfo {
			name: "wg0".to_string(),
			public_key: None,
			listen_port: 51820,
			peers: vec![a, b],
		};
		assert_eq!(info.totals(), (15, u64::MAX));
	}

	#[test]
	fn change_exposes_key() {
		let key = *WgKeyPair::generate().public_key();
		assert_eq!(PeerChange::Remove { public_key: key }.public_key(), &key);
	}
}
