// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deterministic in-process device used when no kernel interface is
//! available and by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use roster_wg_common::{WgKeyPair, WgPublicKey};
use tracing::{debug, instrument};

use crate::adapter::{DeviceAdapter, DeviceInfo, DevicePeer, PeerChange};
use crate::error::{DeviceError, Result};

#[derive(Default)]
struct State {
	peers: BTreeMap<WgPublicKey, DevicePeer>,
	apply_failure: Option<String>,
	read_failure: Option<String>,
	apply_calls: usize,
	closed: bool,
}

pub struct MemoryDevice {
	name: String,
	public_key: WgPublicKey,
	listen_port: u16,
	state: Mutex<State>,
}

impl MemoryDevice {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			public_key: *WgKeyPair::generate().public_key(),
			listen_port: 51820,
			state: Mutex::new(State::default()),
		}
	}

	pub fn public_key(&self) -> WgPublicKey {
		self.public_key
	}

	/// Inserts a peer directly, bypassing [`DeviceAdapter::apply`]. Models
	/// peers configured on the interface by hand.
	pub fn insert_peer(&self, peer: DevicePeer) {
		self.state.lock().peers.insert(peer.public_key, peer);
	}

	pub fn peer(&self, public_key: &WgPublicKey) -> Option<DevicePeer> {
		self.state.lock().peers.get(public_key).cloned()
	}

	pub fn contains(&self, public_key: &WgPublicKey) -> bool {
		self.state.lock().peers.contains_key(public_key)
	}

	pub fn peer_count(&self) -> usize {
		self.state.lock().peers.len()
	}

	/// Number of successful or failed `apply` calls so far.
	pub fn apply_calls(&self) -> usize {
		self.state.lock().apply_calls
	}

	/// Makes every later `apply` fail with `message` until cleared.
	pub fn fail_applies(&self, message: Option<&str>) {
		self.state.lock().apply_failure = message.map(str::to_string);
	}

	/// Makes every later `device` read fail with `message` until cleared.
	pub fn fail_reads(&self, message: Option<&str>) {
		self.state.lock().read_failure = message.map(str::to_string);
	}

	/// Sets the traffic counters of an existing peer.
	pub fn set_traffic(&self, public_key: &WgPublicKey, rx_bytes: u64, tx_bytes: u64) {
		if let Some(peer) = self.state.lock().peers.get_mut(public_key) {
			peer.rx_bytes = rx_bytes;
			peer.tx_bytes = tx_bytes;
		}
	}
}

#[async_trait]
impl DeviceAdapter for MemoryDevice {
	fn name(&self) -> &str {
		&self.name
	}

	async fn device(&self) -> Result<DeviceInfo> {
		let state = self.state.lock();
		if state.closed {
			return Err(DeviceError::Closed);
		}
		if let Some(message) = &state.read_failure {
			return Err(DeviceError::Rejected(message.clone()));
		}
		Ok(DeviceInfo {
			name: self.name.clone(),
			public_key: Some(self.public_key),
			listen_port: self.listen_port,
			peers: state.peers.values().cloned().collect(),
		})
	}

	#[instrument(skip(self, changes), fields(interface = %self.name, changes = changes.len()))]
	async fn apply(&self, changes: &[PeerChange]) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(DeviceError::Closed);
		}
		state.apply_calls += 1;
		if let Some(message) = &state.apply_failure {
			return Err(DeviceError::Rejected(message.clone()));
		}

		// Validate the whole batch first so a rejected batch changes nothing.
		for change in changes {
			if let PeerChange::UpdateAllowedIps { public_key, .. } = change {
				if !state.peers.contains_key(public_key) {
					return Err(DeviceError::PeerNotFound(*public_key));
				}
			}
		}

		for change in changes {
			match change {
				PeerChange::Upsert {
					public_key,
					allowed_ips,
					preshared_key,
				} => {
					let peer = state
						.peers
						.entry(*public_key)
						.or_insert_with(|| DevicePeer::new(*public_key, Vec::new()));
					peer.allowed_ips = allowed_ips.clone();
					if preshared_key.is_some() {
						peer.has_preshared_key = true;
					}
				}
				PeerChange::UpdateAllowedIps {
					public_key,
					allowed_ips,
				} => {
					if let Some(peer) = state.peers.get_mut(public_key) {
						peer.allowed_ips = allowed_ips.clone();
					}
				}
				PeerChange::Remove { public_key } => {
					state.peers.remove(public_key);
				}
			}
		}
		debug!(peers = state.peers.len(), "applied peer changes");
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(DeviceError::Closed);
		}
		state.closed = true;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use ipnet::IpNet;

	fn net(s: &str) -> IpNet {
		s.parse().unwrap()
	}

	fn new_key() -> WgPublicKey {
		*WgKeyPair::generate().public_key()
	}

	#[tokio::test]
	async fn upsert_is_additive() {
		let device = MemoryDevice::new("wg0");
		let manual = new_key();
		device.insert_peer(DevicePeer::new(manual, vec![net("10.0.0.9/32")]));

		let key = new_key();
		device
			.apply(&[PeerChange::Upsert {
				public_key: key,
				allowed_ips: vec![net("10.0.0.2/32")],
				preshared_key: None,
			}])
			.await
			.unwrap();

		assert!(device.contains(&manual));
		assert!(device.contains(&key));
		assert_eq!(device.device().await.unwrap().peers.len(), 2);
	}

	#[tokio::test]
	async fn update_only_requires_existing_peer() {
		let device = MemoryDevice::new("wg0");
		let key = new_key();
		let err = device
			.apply(&[PeerChange::UpdateAllowedIps {
				public_key: key,
				allowed_ips: vec![net("10.0.0.5/32")],
			}])
			.await
			.unwrap_err();
		assert!(matches!(err, DeviceError::PeerNotFound(k) if k == key));
		assert!(!device.contains(&key));
	}

	#[tokio::test]
	async fn update_replaces_allowed_ips() {
		let device = MemoryDevice::new("wg0");
		let key = new_key();
		device.insert_peer(DevicePeer::new(key, vec![net("10.0.0.2/32")]));
		device
			.apply(&[PeerChange::UpdateAllowedIps {
				public_key: key,
				allowed_ips: vec![net("10.0.0.50/32")],
			}])
			.await
			.unwrap();
		assert_eq!(device.peer(&key).unwrap().allowed_ips, vec![net("10.0.0.50/32")]);
	}

	#[tokio::test]
	async fn remove_absent_peer_is_noop() {
		let device = MemoryDevice::new("wg0");
		device
			.apply(&[PeerChange::Remove {
				public_key: new_key(),
			}])
			.await
			.unwrap();
		assert_eq!(device.peer_count(), 0);
	}

	#[tokio::test]
	async fn injected_failures_leave_state_untouched() {
		let device = MemoryDevice::new("wg0");
		device.fail_applies(Some("boom"));
		let key = new_key();
		let err = device
			.apply(&[PeerChange::Upsert {
				public_key: key,
				allowed_ips: vec![],
				preshared_key: None,
			}])
			.await
			.unwrap_err();
		assert!(matches!(err, DeviceError::Rejected(_)));
		assert!(!device.contains(&key));

		device.fail_reads(Some("unreadable"));
		assert!(device.device().await.is_err());
		device.fail_reads(None);
		assert!(device.device().await.is_ok());
	}

	#[tokio::test]
	async fn close_rejects_later_calls() {
		let device = MemoryDevice::new("wg0");
		device.close().await.unwrap();
		assert!(matches!(device.device().await, Err(DeviceError::Closed)));
		assert!(matches!(device.close().await, Err(DeviceError::Closed)));
	}
}
