// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side `wg-quick` profile rendering.

use crate::keys::{WgPresharedKey, WgPrivateKey, WgPublicKey};
use std::fmt::Write;

/// Routes that send all of a client's traffic through the tunnel.
pub const FULL_TUNNEL_ROUTES: [&str; 2] = ["0.0.0.0/0", "::/0"];

/// Everything needed to produce one peer's connection profile.
///
/// Rendering is a pure function of these fields: the same value always
/// yields byte-identical text. Empty strings, empty lists and zero numbers
/// are left out of the output instead of being written as blank values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
	pub private_key: WgPrivateKey,
	pub addresses: Vec<String>,
	pub dns: Vec<String>,
	pub mtu: u32,
	pub persistent_keepalive: u32,
	pub server_public_key: WgPublicKey,
	pub preshared_key: Option<WgPresharedKey>,
	pub endpoint: String,
	pub allowed_ips: Vec<String>,
}

impl ClientConfig {
	pub fn render(&self) -> String {
		let mut out = String::with_capacity(384);

		out.push_str("[Interface]\n");
		push_line(&mut out, "PrivateKey", &self.private_key.to_base64());
		push_list(&mut out, "Address", &self.addresses);
		push_list(&mut out, "DNS", &self.dns);
		push_number(&mut out, "MTU", self.mtu);

		out.push_str("\n[Peer]\n");
		push_line(&mut out, "PublicKey", &self.server_public_key.to_base64());
		if let Some(psk) = &self.preshared_key {
			push_line(&mut out, "PresharedKey", &psk.to_base64());
		}
		push_line(&mut out, "Endpoint", &self.endpoint);
		push_list(&mut out, "AllowedIPs", &self.allowed_ips);
		push_number(&mut out, "PersistentKeepalive", self.persistent_keepalive);

		out
	}
}

fn push_line(out: &mut String, key: &str, value: &str) {
	if value.is_empty() {
		return;
	}
	let _ = writeln!(out, "{key} = {value}");
}

fn push_list(out: &mut String, key: &str, values: &[String]) {
	push_line(out, key, &values.join(", "));
}

fn push_number(out: &mut String, key: &str, value: u32) {
	if value != 0 {
		let _ = writeln!(out, "{key} = {value}");
	}
}

/// Splits a comma-separated setting (`"1.1.1.1, 8.8.8.8"`) into trimmed,
/// non-empty entries.
pub fn split_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn server_key() -> WgPublicKey {
		WgPrivateKey::from_bytes([7u8; 32]).public_key()
	}

	fn sample() -> ClientConfig {
		ClientConfig {
			private_key: WgPrivateKey::from_bytes([1u8; 32]),
			addresses: vec!["10.0.0.2/32".to_string()],
			dns: split_list("1.1.1.1, 8.8.8.8"),
			mtu: 1420,
			persistent_keepalive: 25,
			server_public_key: server_key(),
			preshared_key: None,
			endpoint: "vpn.example.com:51820".to_string(),
			allowed_ips: FULL_TUNNEL_ROUTES.iter().map(|s| s.to_string()).collect(),
		}
	}

	#[test]
	fn renders_full_profile() {
		let config = sample();
		let expected = format!(
			"[Interface]\n\
			 PrivateKey = {}\n\
			 Address = 10.0.0.2/32\n\
			 DNS = 1.1.1.1, 8.8.8.8\n\
			 MTU = 1420\n\
			 \n\
			 [Peer]\n\
			 PublicKey = {}\n\
			 Endpoint = vpn.example.com:51820\n\
			 AllowedIPs = 0.0.0.0/0, ::/0\n\
			 PersistentKeepalive = 25\n",
			config.private_key.to_base64().as_str(),
			server_key()
		);
		assert_eq!(config.render(), expected);
	}

	#[test]
	fn omits_unset_fields() {
		let config = ClientConfig {
			dns: Vec::new(),
			mtu: 0,
			persistent_keepalive: 0,
			endpoint: String::new(),
			..sample()
		};
		let text = config.render();
		assert!(!text.contains("DNS"));
		assert!(!text.contains("MTU"));
		assert!(!text.contains("PersistentKeepalive"));
		assert!(!text.contains("Endpoint"));
		assert!(!text.contains("PresharedKey"));
		assert!(!text.contains("= \n"));
	}

	#[test]
	fn includes_preshared_key_when_set() {
		let psk = WgPresharedKey::from_bytes([9u8; 32]);
		let config = ClientConfig {
			preshared_key: Some(psk.clone()),
			..sample()
		};
		let text = config.render();
		assert!(text.contains(&format!("PresharedKey = {}\n", psk.to_base64().as_str())));
	}

	#[test]
	fn split_list_drops_blanks() {
		assert_eq!(split_list(" 1.1.1.1 ,, 9.9.9.9,"), vec!["1.1.1.1", "9.9.9.9"]);
		assert!(split_list("").is_empty());
	}

	proptest! {
		#[test]
		fn render_is_deterministic(
			seed in prop::array::uniform32(any::<u8>()),
			mtu in 0u32..9000,
			keepalive in 0u32..600,
			host in 1u8..255,
			endpoint in "[a-z]{0,12}",
		) {
			let config = ClientConfig {
				private_key: WgPrivateKey::from_bytes(seed),
				addresses: vec![format!("10.0.0.{host}/32")],
				mtu,
				persistent_keepalive: keepalive,
				endpoint: endpoint.clone(),
				..sample()
			};
			let first = config.render();
			prop_assert_eq!(&first, &config.clone().render());
			prop_assert_eq!(first.contains("MTU"), mtu != 0);
			prop_assert_eq!(first.contains("PersistentKeepalive"), keepalive != 0);
			prop_assert_eq!(first.contains("Endpoint"), !endpoint.is_empty());
		}
	}
}
