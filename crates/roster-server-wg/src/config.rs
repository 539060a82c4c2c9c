// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use ipnet::IpNet;
use roster_wg_common::WgPublicKey;

use crate::history::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PeerServiceConfig {
	/// Pool that automatic addresses are drawn from.
	pub subnet: IpNet,
	/// `host:port` written into profiles when the settings carry no endpoint.
	pub server_endpoint: String,
	/// Overrides the key read from the device when rendering profiles.
	pub server_public_key: Option<WgPublicKey>,
	pub stats_interval: Duration,
	pub history_capacity: usize,
}

impl PeerServiceConfig {
	pub fn new(subnet: IpNet) -> Self {
		Self {
			subnet,
			server_endpoint: String::new(),
			server_public_key: None,
			stats_interval: DEFAULT_STATS_INTERVAL,
			history_capacity: DEFAULT_HISTORY_CAPACITY,
		}
	}
}
