// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use roster_wg_common::WgPublicKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
	#[error("{binary} not found in PATH")]
	NotInstalled { binary: String },

	#[error("{cmd} {} failed: {stderr}", .args.join(" "))]
	CommandFailed {
		cmd: String,
		args: Vec<String>,
		stderr: String,
	},

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("unreadable device output: {0}")]
	Parse(String),

	#[error("peer {0} is not configured on the device")]
	PeerNotFound(WgPublicKey),

	#[error("device rejected configuration: {0}")]
	Rejected(String),

	#[error("device handle is closed")]
	Closed,
}

pub type Result<T> = std::result::Result<T, DeviceError>;
