// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

use chrono::{DateTime, Utc};
use roster_server_db::PeerRecord;
use roster_wg_device::DevicePeer;
use serde::{Deserialize, Serialize};

/// A peer as callers see it: live device state merged with its stored name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
	pub id: String,
	pub public_key: String,
	pub name: String,
	pub endpoint: String,
	#[serde(rename = "allowedIPs")]
	pub allowed_ips: Vec<String>,
	pub last_handshake: Option<DateTime<Utc>>,
	pub receive_bytes: u64,
	pub transmit_bytes: u64,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub interface_address: String,
}

impl PeerView {
	/// A live peer with no stored record renders with an empty name.
	pub(crate) fn from_live(peer: &DevicePeer, record: Option<&PeerRecord>) -> Self {
		let key = peer.public_key.to_base64();
		Self {
			id: key.clone(),
			public_key: key,
			name: record.map(|r| r.name.clone()).unwrap_or_default(),
			endpoint: peer.endpoint.clone().unwrap_or_default(),
			allowed_ips: peer.allowed_ips.iter().map(ToString::to_string).collect(),
			last_handshake: peer.last_handshake,
			receive_bytes: peer.rx_bytes,
			transmit_bytes: peer.tx_bytes,
			interface_address: record
				.map(|r| r.interface_address.clone())
				.unwrap_or_default(),
		}
	}

	/// A stored peer the device is not (yet) reporting.
	pub(crate) fn from_record(record: &PeerRecord) -> Self {
		let key = record.public_key.to_base64();
		Self {
			id: key.clone(),
			public_key: key,
			name: record.name.clone(),
			endpoint: String::new(),
			allowed_ips: record.allowed_ips.iter().map(ToString::to_string).collect(),
			last_handshake: None,
			receive_bytes: 0,
			transmit_bytes: 0,
			interface_address: record.interface_address.clone(),
		}
	}
}

/// Request to create a peer.
///
/// Without `public_key` the server generates the key pair; without
/// `allowed_ips` it allocates the next free address of the subnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPeer {
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub public_key: Option<String>,
	#[serde(default, rename = "allowedIPs")]
	pub allowed_ips: Option<Vec<String>>,
	#[serde(default)]
	pub dns: Option<String>,
	#[serde(default)]
	pub mtu: Option<u32>,
	#[serde(default)]
	pub persistent_keepalive: Option<u32>,
	#[serde(default, rename = "preSharedKey")]
	pub preshared_key: bool,
	#[serde(default)]
	pub interface_address: Option<String>,
}

/// Field-level changes; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerUpdate {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default, rename = "allowedIPs")]
	pub allowed_ips: Option<Vec<String>>,
	#[serde(default)]
	pub dns: Option<String>,
	#[serde(default)]
	pub mtu: Option<u32>,
	#[serde(default)]
	pub persistent_keepalive: Option<u32>,
	#[serde(default)]
	pub interface_address: Option<String>,
}

/// Result of Add and Regenerate. Secrets are only present when the server
/// generated them, and this is the only time they are handed out.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCreated {
	#[serde(flatten)]
	pub peer: PeerView,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub private_key: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub preshared_key: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub config: Option<String>,
}

impl fmt::Debug for PeerCreated {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
		f.debug_struct("PeerCreated")
			.field("peer", &self.peer)
			.field("private_key", &redact(&self.private_key))
			.field("preshared_key", &redact(&self.preshared_key))
			.field("config", &redact(&self.config))
			.finish()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceStats {
	pub interface_name: String,
	pub public_key: String,
	pub listen_port: u16,
	pub subnet: String,
	pub peer_count: usize,
	pub total_rx: u64,
	pub total_tx: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsHistoryItem {
	/// Unix seconds.
	pub timestamp: i64,
	pub total_rx: u64,
	pub total_tx: u64,
}

impl StatsHistoryItem {
	pub fn now(total_rx: u64, total_tx: u64) -> Self {
		Self {
			timestamp: Utc::now().timestamp(),
			total_rx,
			total_tx,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use roster_wg_common::WgKeyPair;

	#[test]
	fn view_serializes_camel_case() {
		let key = *WgKeyPair::generate().public_key();
		let record = PeerRecord::new(key, "Laptop", vec!["10.0.0.2/32".parse().unwrap()]);
		let json = serde_json::to_value(PeerView::from_record(&record)).unwrap();
		assert_eq!(json["publicKey"], key.to_base64());
		assert_eq!(json["allowedIPs"][0], "10.0.0.2/32");
		assert_eq!(json["receiveBytes"], 0);
		assert!(json.get("interfaceAddress").is_none());
	}

	#[test]
	fn live_peer_without_record_has_empty_name() {
		let key = *WgKeyPair::generate().public_key();
		let mut peer = DevicePeer::new(key, vec!["10.0.0.7/32".parse().unwrap()]);
		peer.endpoint = Some("198.51.100.2:5000".to_string());
		let view = PeerView::from_live(&peer, None);
		assert_eq!(view.name, "");
		assert_eq!(view.endpoint, "198.51.100.2:5000");
		assert_eq!(view.id, view.public_key);
	}

	#[test]
	fn new_peer_accepts_minimal_body() {
		let req: NewPeer = serde_json::from_str(r#"{"name":"Laptop"}"#).unwrap();
		assert_eq!(req.name, "Laptop");
		assert!(req.public_key.is_none());
		assert!(req.allowed_ips.is_none());
		assert!(!req.preshared_key);

		let req: NewPeer =
			serde_json::from_str(r#"{"name":"x","allowedIPs":["10.0.0.9/32"],"preSharedKey":true}"#).unwrap();
		assert_eq!(req.allowed_ips.unwrap(), vec!["10.0.0.9/32"]);
		assert!(req.preshared_key);
	}

	#[test]
	fn created_flattens_and_redacts_debug() {
		let key = *WgKeyPair::generate().public_key();
		let record = PeerRecord::new(key, "Laptop", vec![]);
		let created = PeerCreated {
			peer: PeerView::from_record(&record),
			private_key: Some("c2VjcmV0".to_string()),
			preshared_key: None,
			config: Some("[Interface]".to_string()),
		};
		let json = serde_json::to_value(&created).unwrap();
		assert_eq!(json["name"], "Laptop");
		assert_eq!(json["privateKey"], "c2VjcmV0");
		assert!(json.get("presharedKey").is_none());
		assert!(!format!("{:?}", created).contains("c2VjcmV0"));
	}
}
