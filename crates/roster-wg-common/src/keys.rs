// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Curve25519 key material in the padded base64 form `wg(8)` prints and accepts.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

#[derive(Error, Debug)]
pub enum KeyError {
	#[error("invalid key length: expected 32 bytes, got {0}")]
	InvalidLength(usize),

	#[error("invalid base64 encoding: {0}")]
	InvalidBase64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, KeyError>;

fn decode_key(s: &str) -> Result<[u8; 32]> {
	let bytes = Zeroizing::new(STANDARD.decode(s.trim())?);
	if bytes.len() != 32 {
		return Err(KeyError::InvalidLength(bytes.len()));
	}
	let mut arr = [0u8; 32];
	arr.copy_from_slice(&bytes);
	Ok(arr)
}

#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct WgPrivateKey {
	bytes: [u8; 32],
}

impl WgPrivateKey {
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		Self {
			bytes: secret.to_bytes(),
		}
	}

	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s)?,
		})
	}

	pub fn to_base64(&self) -> Zeroizing<String> {
		Zeroizing::new(STANDARD.encode(self.bytes))
	}

	pub fn public_key(&self) -> WgPublicKey {
		let secret = StaticSecret::from(self.bytes);
		let public = PublicKey::from(&secret);
		WgPublicKey {
			bytes: *public.as_bytes(),
		}
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPrivateKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

impl fmt::Display for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl PartialEq for WgPrivateKey {
	fn eq(&self, other: &Self) -> bool {
		self.bytes == other.bytes
	}
}

impl Eq for WgPrivateKey {}

/// Symmetric secret mixed into the handshake of a single peer.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct WgPresharedKey {
	bytes: [u8; 32],
}

impl WgPresharedKey {
	pub fn generate() -> Self {
		let mut bytes = [0u8; 32];
		OsRng.fill_bytes(&mut bytes);
		Self { bytes }
	}

	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s)?,
		})
	}

	pub fn to_base64(&self) -> Zeroizing<String> {
		Zeroizing::new(STANDARD.encode(self.bytes))
	}
}

impl fmt::Debug for WgPresharedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPresharedKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

impl fmt::Display for WgPresharedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl PartialEq for WgPresharedKey {
	fn eq(&self, other: &Self) -> bool {
		self.bytes == other.bytes
	}
}

impl Eq for WgPresharedKey {}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WgPublicKey {
	bytes: [u8; 32],
}

impl WgPublicKey {
	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s)?,
		})
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.bytes
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let b64 = self.to_base64();
		f.debug_struct("WgPublicKey")
			.field("prefix", &format!("{}...", &b64[..8]))
			.finish()
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_base64(s)
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

#[derive(Clone)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		Self::from_private_key(WgPrivateKey::generate())
	}

	pub fn from_private_key(private: WgPrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}

	pub fn into_private_key(self) -> WgPrivateKey {
		self.private
	}
}

impl fmt::Debug for WgKeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgKeyPair")
			.field("private", &self.private)
			.field("public", &self.public)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn generated_keys_use_padded_base64() {
		let keypair = WgKeyPair::generate();
		let public = keypair.public_key().to_base64();
		assert_eq!(public.len(), 44);
		assert!(public.ends_with('='));
		assert_eq!(keypair.private_key().to_base64().len(), 44);
	}

	#[test]
	fn known_vector_matches_wg_pubkey() {
		// `echo yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk= | wg pubkey`
		let private = WgPrivateKey::from_base64("yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=").unwrap();
		assert_eq!(
			private.public_key().to_base64(),
			"HIgo9xNzJMWLKASShiTqIybxZ0U3wGLiUeJ1PKf8ykw="
		);
	}

	#[test]
	fn base64_roundtrip() {
		let keypair = WgKeyPair::generate();
		let private_b64 = keypair.private_key().to_base64();
		let restored = WgPrivateKey::from_base64(&private_b64).unwrap();
		assert_eq!(keypair.public_key(), &restored.public_key());
	}

	#[test]
	fn rejects_short_keys() {
		let err = WgPublicKey::from_base64("AAAA").unwrap_err();
		assert!(matches!(err, KeyError::InvalidLength(3)));
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(
			"not a key!".parse::<WgPublicKey>(),
			Err(KeyError::InvalidBase64(_))
		));
	}

	#[test]
	fn public_key_parse_trims_whitespace() {
		let keypair = WgKeyPair::generate();
		let padded = format!("  {}\n", keypair.public_key());
		assert_eq!(padded.parse::<WgPublicKey>().unwrap(), *keypair.public_key());
	}

	#[test]
	fn private_key_display_is_redacted() {
		let private = WgPrivateKey::generate();
		assert_eq!(format!("{}", private), "[REDACTED]");
	}

	#[test]
	fn preshared_keys_are_random() {
		assert_ne!(WgPresharedKey::generate(), WgPresharedKey::generate());
	}

	#[test]
	fn public_key_debug_shows_prefix() {
		let keypair = WgKeyPair::generate();
		let debug = format!("{:?}", keypair.public_key());
		assert!(debug.contains("..."));
		assert!(!debug.contains(&keypair.public_key().to_base64()));
	}

	#[test]
	fn public_key_serialize_deserialize() {
		let keypair = WgKeyPair::generate();
		let json = serde_json::to_string(keypair.public_key()).unwrap();
		let restored: WgPublicKey = serde_json::from_str(&json).unwrap();
		assert_eq!(keypair.public_key(), &restored);
	}

	proptest! {
		#[test]
		fn private_key_debug_never_leaks(seed in prop::array::uniform32(any::<u8>())) {
			let private = WgPrivateKey::from_bytes(seed);
			let debug = format!("{:?}", private);
			let b64 = STANDARD.encode(seed);

			prop_assert!(!debug.contains(&b64));
			prop_assert!(debug.contains("[REDACTED]"));
		}

		#[test]
		fn preshared_key_debug_never_leaks(seed in prop::array::uniform32(any::<u8>())) {
			let psk = WgPresharedKey::from_bytes(seed);
			let rendered = format!("{:?} {}", psk, psk);
			let b64 = STANDARD.encode(seed);

			prop_assert!(!rendered.contains(&b64));
		}

		#[test]
		fn keypair_roundtrip_via_base64(seed in prop::array::uniform32(any::<u8>())) {
			let keypair = WgKeyPair::from_private_key(WgPrivateKey::from_bytes(seed));
			let b64 = keypair.private_key().to_base64();
			let restored = WgKeyPair::from_private_key(WgPrivateKey::from_base64(&b64).unwrap());
			prop_assert_eq!(keypair.public_key(), restored.public_key());
		}
	}
}
