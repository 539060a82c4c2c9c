// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device adapter that drives the kernel interface through `wg(8)`.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use roster_wg_common::WgPublicKey;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use crate::adapter::{DeviceAdapter, DeviceInfo, DevicePeer, PeerChange};
use crate::error::{DeviceError, Result};

const NONE: &str = "(none)";

pub struct WgCommandDevice {
	interface: String,
	binary: PathBuf,
	/// `wg set` calls are not safe to interleave with the update-only check.
	config_lock: Mutex<()>,
	closed: AtomicBool,
}

impl WgCommandDevice {
	/// Opens `interface`, failing if the device cannot be read.
	pub async fn open(interface: impl Into<String>, binary: impl AsRef<Path>) -> Result<Self> {
		let device = Self {
			interface: interface.into(),
			binary: binary.as_ref().to_path_buf(),
			config_lock: Mutex::new(()),
			closed: AtomicBool::new(false),
		};
		let info = device.read().await?;
		info!(
			interface = %device.interface,
			listen_port = info.listen_port,
			peers = info.peers.len(),
			"opened wireguard device"
		);
		Ok(device)
	}

	fn ensure_open(&self) -> Result<()> {
		if self.closed.load(Ordering::Acquire) {
			return Err(DeviceError::Closed);
		}
		Ok(())
	}

	async fn read(&self) -> Result<DeviceInfo> {
		let output = self
			.run(&["show".into(), self.interface.clone().into(), "dump".into()])
			.await?;
		parse_dump(&self.interface, &output)
	}

	async fn run(&self, args: &[OsString]) -> Result<String> {
		let printable: Vec<String> = args
			.iter()
			.map(|a| a.to_string_lossy().into_owned())
			.collect();
		trace!(
			cmd = %format!("{} {}", self.binary.display(), printable.join(" ")),
			"running wg command"
		);

		let output = Command::new(&self.binary)
			.args(args)
			.kill_on_drop(true)
			.output()
			.await
			.map_err(|e| {
				if e.kind() == std::io::ErrorKind::NotFound {
					warn!(binary = %self.binary.display(), "wg not found in PATH");
					DeviceError::NotInstalled {
						binary: self.binary.display().to_string(),
					}
				} else {
					DeviceError::Io(e)
				}
			})?;

		if output.status.success() {
			Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
		} else {
			Err(DeviceError::CommandFailed {
				cmd: self.binary.display().to_string(),
				args: printable,
				stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
			})
		}
	}
}

#[async_trait]
impl DeviceAdapter for WgCommandDevice {
	fn name(&self) -> &str {
		&self.interface
	}

	#[instrument(skip(self), fields(interface = %self.interface))]
	async fn device(&self) -> Result<DeviceInfo> {
		self.ensure_open()?;
		self.read().await
	}

	#[instrument(skip(self, changes), fields(interface = %self.interface, changes = changes.len()))]
	async fn apply(&self, changes: &[PeerChange]) -> Result<()> {
		self.ensure_open()?;
		if changes.is_empty() {
			return Ok(());
		}

		let _guard = self.config_lock.lock().await;

		// wg(8) has no update-only flag, so check presence under the lock.
		if changes
			.iter()
			.any(|c| matches!(c, PeerChange::UpdateAllowedIps { .. }))
		{
			let info = self.read().await?;
			for change in changes {
				if let PeerChange::UpdateAllowedIps { public_key, .. } = change {
					if info.peer(public_key).is_none() {
						return Err(DeviceError::PeerNotFound(*public_key));
					}
				}
			}
		}

		let mut args: Vec<OsString> = vec!["set".into(), self.interface.clone().into()];
		// Held until the command exits; the files are unlinked on drop.
		let mut psk_files = Vec::new();

		for change in changes {
			args.push("peer".into());
			args.push(change.public_key().to_base64().into());
			match change {
				PeerChange::Upsert {
					allowed_ips,
					preshared_key,
					..
				} => {
					if let Some(psk) = preshared_key {
						let mut file = NamedTempFile::new()?;
						writeln!(file, "{}", psk.to_base64().as_str())?;
						file.flush()?;
						args.push("preshared-key".into());
						args.push(file.path().as_os_str().to_owned());
						psk_files.push(file);
					}
					args.push("allowed-ips".into());
					args.push(join_nets(allowed_ips).into());
				}
				PeerChange::UpdateAllowedIps { allowed_ips, .. } => {
					args.push("allowed-ips".into());
					args.push(join_nets(allowed_ips).into());
				}
				PeerChange::Remove { .. } => args.push("remove".into()),
			}
		}

		self.run(&args).await?;
		debug!(changes = changes.len(), "applied peer changes");
		drop(psk_files);
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		if self.closed.swap(true, Ordering::AcqRel) {
			return Err(DeviceError::Closed);
		}
		debug!(interface = %self.interface, "closed wireguard device");
		Ok(())
	}
}

fn join_nets(nets: &[IpNet]) -> String {
	nets.iter()
		.map(IpNet::to_string)
		.collect::<Vec<_>>()
		.join(",")
}

/// Parses the tab-separated output of `wg show <interface> dump`.
///
/// The first line describes the interface (private key, public key, listen
/// port, fwmark); each following line is one peer (public key, preshared
/// key, endpoint, allowed IPs, latest handshake, rx, tx, keepalive).
pub fn parse_dump(interface: &str, output: &str) -> Result<DeviceInfo> {
	let mut lines = output.lines().filter(|l| !l.trim().is_empty());

	let header = lines
		.next()
		.ok_or_else(|| DeviceError::Parse("empty dump".to_string()))?;
	let fields: Vec<&str> = header.split('\t').collect();
	if fields.len() < 3 {
		return Err(DeviceError::Parse(format!(
			"interface line has {} fields",
			fields.len()
		)));
	}
	let public_key = match fields[1] {
		NONE => None,
		key => Some(parse_key(key)?),
	};
	let listen_port = parse_number::<u16>("listen port", fields[2])?;

	let peers = lines.map(parse_peer).collect::<Result<Vec<_>>>()?;

	Ok(DeviceInfo {
		name: interface.to_string(),
		public_key,
		listen_port,
		peers,
	})
}

fn parse_peer(line: &str) -> Result<DevicePeer> {
	let fields: Vec<&str> = line.split('\t').collect();
	if fields.len() != 8 {
		return Err(DeviceError::Parse(format!(
			"peer line has {} fields, expected 8",
			fields.len()
		)));
	}

	let allowed_ips = match fields[3] {
		NONE | "" => Vec::new(),
		list => list
			.split(',')
			.map(|s| {
				s.trim()
					.parse::<IpNet>()
					.map_err(|_| DeviceError::Parse(format!("bad allowed ip {s:?}")))
			})
			.collect::<Result<Vec<_>>>()?,
	};

	let handshake = parse_number::<i64>("latest handshake", fields[4])?;
	let last_handshake = if handshake == 0 {
		None
	} else {
		DateTime::<Utc>::from_timestamp(handshake, 0)
	};

	let persistent_keepalive = match fields[7] {
		"off" | "0" => None,
		v => Some(parse_number::<u16>("persistent keepalive", v)?),
	};

	Ok(DevicePeer {
		public_key: parse_key(fields[0])?,
		has_preshared_key: fields[1] != NONE,
		endpoint: (fields[2] != NONE).then(|| fields[2].to_string()),
		allowed_ips,
		last_handshake,
		rx_bytes: parse_number("transfer rx", fields[5])?,
		tx_bytes: parse_number("transfer tx", fields[6])?,
		persistent_keepalive,
	})
}

fn parse_key(s: &str) -> Result<WgPublicKey> {
	WgPublicKey::from_base64(s).map_err(|e| DeviceError::Parse(format!("bad public key: {e}")))
}

fn parse_number<T: std::str::FromStr>(what: &str, s: &str) -> Result<T> {
	s.parse()
		.map_err(|_| DeviceError::Parse(format!("bad {what} {s:?}")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use roster_wg_common::WgKeyPair;

	fn key() -> String {
		WgKeyPair::generate().public_key().to_base64()
	}

	#[test]
	fn parses_interface_and_peers() {
		let server = key();
		let a = key();
		let b = key();
		let dump = format!(
			"PRIVATE=\t{server}\t51820\toff\n\
			 {a}\t(none)\t203.0.113.4:40000\t10.0.0.2/32\t1700000000\t1024\t2048\t25\n\
			 {b}\tPSK=\t(none)\t10.0.0.3/32,fd00::3/128\t0\t0\t0\toff\n"
		);

		let info = parse_dump("wg0", &dump).unwrap();
		assert_eq!(info.name, "wg0");
		assert_eq!(info.public_key.unwrap().to_base64(), server);
		assert_eq!(info.listen_port, 51820);
		assert_eq!(info.peers.len(), 2);

		let first = &info.peers[0];
		assert_eq!(first.public_key.to_base64(), a);
		assert_eq!(first.endpoint.as_deref(), Some("203.0.113.4:40000"));
		assert_eq!(first.rx_bytes, 1024);
		assert_eq!(first.tx_bytes, 2048);
		assert_eq!(first.persistent_keepalive, Some(25));
		assert_eq!(first.last_handshake.unwrap().timestamp(), 1_700_000_000);
		assert!(!first.has_preshared_key);

		let second = &info.peers[1];
		assert!(second.has_preshared_key);
		assert!(second.endpoint.is_none());
		assert!(second.last_handshake.is_none());
		assert!(second.persistent_keepalive.is_none());
		assert_eq!(second.allowed_ips.len(), 2);
		assert_eq!(info.totals(), (1024, 2048));
	}

	#[test]
	fn parses_interface_without_peers_or_key() {
		let info = parse_dump("wg1", "(none)\t(none)\t0\toff\n").unwrap();
		assert!(info.public_key.is_none());
		assert!(info.peers.is_empty());
	}

	#[test]
	fn peer_without_allowed_ips() {
		let a = key();
		let dump = format!("x\t(none)\t51820\toff\n{a}\t(none)\t(none)\t(none)\t0\t0\t0\toff");
		let info = parse_dump("wg0", &dump).unwrap();
		assert!(info.peers[0].allowed_ips.is_empty());
	}

	#[test]
	fn rejects_truncated_peer_line() {
		let dump = format!("x\t(none)\t51820\toff\n{}\t(none)\t(none)", key());
		assert!(matches!(
			parse_dump("wg0", &dump),
			Err(DeviceError::Parse(_))
		));
	}

	#[test]
	fn rejects_empty_output() {
		assert!(matches!(parse_dump("wg0", ""), Err(DeviceError::Parse(_))));
	}

	#[test]
	fn parse_errors_do_not_echo_private_key() {
		let dump = "SECRETPRIVATEKEY\tnot-a-key\t51820\toff";
		let err = parse_dump("wg0", dump).unwrap_err().to_string();
		assert!(!err.contains("SECRETPRIVATEKEY"));
	}

	#[test]
	fn joins_prefixes_with_commas() {
		let nets: Vec<IpNet> = vec!["10.0.0.2/32".parse().unwrap(), "fd00::2/128".parse().unwrap()];
		assert_eq!(join_nets(&nets), "10.0.0.2/32,fd00::2/128");
	}

	#[tokio::test]
	async fn missing_binary_is_reported() {
		let err = WgCommandDevice::open("wg0", "/nonexistent/wg-binary")
			.await
			.err()
			.unwrap();
		assert!(matches!(err, DeviceError::NotInstalled { .. }));
	}
}
