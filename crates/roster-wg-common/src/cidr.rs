// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CidrError {
	#[error("invalid CIDR {entry:?}: expected address/prefix")]
	Invalid { entry: String },

	#[error("at least one address prefix is required")]
	Empty,
}

/// Parses a peer's allowed-IP entries.
///
/// Every entry must carry an explicit prefix length; bare addresses are
/// rejected. Host bits are preserved so `10.0.0.2/24` stays as written.
pub fn parse_allowed_ips<S: AsRef<str>>(entries: &[S]) -> Result<Vec<IpNet>, CidrError> {
	if entries.is_empty() {
		return Err(CidrError::Empty);
	}
	entries.iter().map(|e| parse_entry(e.as_ref())).collect()
}

/// Parses a comma-separated prefix list such as an interface address
/// override (`10.0.0.2/32, fd00::2/128`). An empty string yields no prefixes.
pub fn parse_prefix_list(list: &str) -> Result<Vec<IpNet>, CidrError> {
	list.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(parse_entry)
		.collect()
}

fn parse_entry(entry: &str) -> Result<IpNet, CidrError> {
	entry.trim().parse().map_err(|_| CidrError::Invalid {
		entry: entry.to_string(),
	})
}

/// The single-host prefix for `addr` (`/32` or `/128`).
pub fn host_net(addr: IpAddr) -> IpNet {
	match addr {
		IpAddr::V4(v4) => IpNet::V4(Ipv4Net::from(v4)),
		IpAddr::V6(v6) => IpNet::V6(Ipv6Net::from(v6)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_v4_and_v6() {
		let nets = parse_allowed_ips(&["10.0.0.2/32", " fd00::2/128 "]).unwrap();
		assert_eq!(nets.len(), 2);
		assert_eq!(nets[0].to_string(), "10.0.0.2/32");
		assert_eq!(nets[1].to_string(), "fd00::2/128");
	}

	#[test]
	fn keeps_host_bits() {
		let nets = parse_allowed_ips(&["10.0.0.7/24"]).unwrap();
		assert_eq!(nets[0].to_string(), "10.0.0.7/24");
	}

	#[test]
	fn rejects_bare_address() {
		let err = parse_allowed_ips(&["10.0.0.2"]).unwrap_err();
		assert_eq!(
			err,
			CidrError::Invalid {
				entry: "10.0.0.2".to_string()
			}
		);
	}

	#[test]
	fn reports_first_bad_entry() {
		let err = parse_allowed_ips(&["10.0.0.2/32", "nope", "10.0.0.300/32"]).unwrap_err();
		assert!(err.to_string().contains("nope"));
	}

	#[test]
	fn rejects_empty_set() {
		let empty: [&str; 0] = [];
		assert_eq!(parse_allowed_ips(&empty).unwrap_err(), CidrError::Empty);
	}

	#[test]
	fn prefix_list_splits_on_commas() {
		assert!(parse_prefix_list("").unwrap().is_empty());
		let nets = parse_prefix_list("10.0.0.2/32,fd00::2/128").unwrap();
		assert_eq!(nets.len(), 2);
		assert!(parse_prefix_list("10.0.0.2/32, bogus").is_err());
	}

	#[test]
	fn host_net_uses_full_mask() {
		assert_eq!(host_net("10.1.2.3".parse().unwrap()).to_string(), "10.1.2.3/32");
		assert_eq!(host_net("fd00::9".parse().unwrap()).to_string(), "fd00::9/128");
	}
}
