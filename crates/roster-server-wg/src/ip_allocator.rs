// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lowest-free-address allocation inside the peer subnet.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;
use roster_wg_common::host_net;

use crate::error::{Result, WgError};

/// Returns the numerically smallest host address of `subnet` that is neither
/// the network nor the broadcast address and is not in `reserved` or `used`,
/// as a single-host prefix (`/32` or `/128`).
pub fn allocate_next_address(
	subnet: IpNet,
	reserved: &HashSet<IpAddr>,
	used: &HashSet<IpAddr>,
) -> Result<IpNet> {
	let (network, broadcast) = bounds(&subnet);

	let Some(mut candidate) = network.checked_add(1) else {
		return Err(WgError::SubnetExhausted(subnet));
	};
	while candidate < broadcast {
		let addr = to_addr(&subnet, candidate);
		if !reserved.contains(&addr) && !used.contains(&addr) {
			return Ok(host_net(addr));
		}
		candidate += 1;
	}

	Err(WgError::SubnetExhausted(subnet))
}

/// The server's own address: the address part of `server_address` when it
/// parses, otherwise the first host of `subnet`.
pub fn gateway_address(subnet: &IpNet, server_address: &str) -> IpAddr {
	let server_address = server_address.trim();
	if let Ok(net) = server_address.parse::<IpNet>() {
		return net.addr();
	}
	if let Ok(addr) = server_address.parse::<IpAddr>() {
		return addr;
	}
	let (network, broadcast) = bounds(subnet);
	to_addr(subnet, network.checked_add(1).unwrap_or(broadcast).min(broadcast))
}

/// Reduces prefixes to their base addresses.
pub fn used_addresses<'a>(nets: impl IntoIterator<Item = &'a IpNet>) -> HashSet<IpAddr> {
	nets.into_iter().map(IpNet::addr).collect()
}

fn bounds(subnet: &IpNet) -> (u128, u128) {
	match subnet {
		IpNet::V4(net) => (
			u32::from(net.network()) as u128,
			u32::from(net.broadcast()) as u128,
		),
		IpNet::V6(net) => (u128::from(net.network()), u128::from(net.broadcast())),
	}
}

fn to_addr(subnet: &IpNet, value: u128) -> IpAddr {
	match subnet {
		IpNet::V4(_) => IpAddr::V4(Ipv4Addr::from(value as u32)),
		IpNet::V6(_) => IpAddr::V6(Ipv6Addr::from(value)),
	}
}
