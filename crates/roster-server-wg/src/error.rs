// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use roster_server_db::DbError;
use roster_wg_common::{CidrError, KeyError, QrError, WgPublicKey};
use roster_wg_device::DeviceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WgError {
	#[error("{0}")]
	Validation(String),

	#[error("peer {0} not found")]
	PeerNotFound(WgPublicKey),

	#[error("config unavailable for peer {0}: its private key is not stored")]
	ConfigUnavailable(WgPublicKey),

	#[error("device error: {0}")]
	Device(#[from] DeviceError),

	#[error("store error: {0}")]
	Store(#[from] DbError),

	#[error("subnet {0} is exhausted")]
	SubnetExhausted(IpNet),

	#[error("QR rendering failed: {0}")]
	Qr(#[from] QrError),

	#[error("peer service is closed")]
	Closed,

	#[error("internal error: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, WgError>;

/// How a caller should classify a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// Bad input; nothing was changed.
	Validation,
	NotFound,
	/// Device, store or internal failure.
	Upstream,
	/// The subnet has no free host address left.
	Capacity,
}

impl WgError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			WgError::Validation(_) => ErrorKind::Validation,
			WgError::PeerNotFound(_)
			| WgError::ConfigUnavailable(_)
			| WgError::Device(DeviceError::PeerNotFound(_)) => ErrorKind::NotFound,
			WgError::SubnetExhausted(_) => ErrorKind::Capacity,
			WgError::Device(_)
			| WgError::Store(_)
			| WgError::Qr(_)
			| WgError::Closed
			| WgError::Internal(_) => ErrorKind::Upstream,
		}
	}
}

impl From<KeyError> for WgError {
	fn from(e: KeyError) -> Self {
		WgError::Validation(format!("invalid public key: {e}"))
	}
}

impl From<CidrError> for WgError {
	fn from(e: CidrError) -> Self {
		WgError::Validation(e.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use roster_wg_common::WgKeyPair;

	#[test]
	fn kinds_follow_taxonomy() {
		let key = *WgKeyPair::generate().public_key();
		assert_eq!(WgError::Validation("x".into()).kind(), ErrorKind::Validation);
		assert_eq!(WgError::PeerNotFound(key).kind(), ErrorKind::NotFound);
		assert_eq!(WgError::ConfigUnavailable(key).kind(), ErrorKind::NotFound);
		assert_eq!(
			WgError::Device(DeviceError::PeerNotFound(key)).kind(),
			ErrorKind::NotFound
		);
		assert_eq!(
			WgError::Device(DeviceError::Rejected("x".into())).kind(),
			ErrorKind::Upstream
		);
		assert_eq!(
			WgError::SubnetExhausted("10.0.0.0/30".parse().unwrap()).kind(),
			ErrorKind::Capacity
		);
	}

	#[test]
	fn cidr_errors_are_validation() {
		let err: WgError = CidrError::Empty.into();
		assert_eq!(err.kind(), ErrorKind::Validation);
	}

	#[test]
	fn exhaustion_message_names_subnet() {
		let err = WgError::SubnetExhausted("10.0.0.0/30".parse().unwrap());
		assert_eq!(err.to_string(), "subnet 10.0.0.0/30 is exhausted");
	}
}
