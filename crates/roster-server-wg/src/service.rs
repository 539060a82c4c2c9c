// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reconciliation engine.
//!
//! Every mutation touches the device first and the store second, so a failed
//! device step never leaves metadata behind. Locks are always taken in the
//! order sync gate, per-key lock, creation lock:
//!
//! - the sync gate is held shared by mutations and exclusively by [`PeerService::sync`]
//!   and [`PeerService::close`], so a sync never re-adds a peer that a
//!   concurrent removal just deleted;
//! - the per-key lock serialises operations on one public key;
//! - the creation lock makes "scan for a free address, then configure it on
//!   the device" a single critical section.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ipnet::IpNet;
use parking_lot::Mutex as SyncMutex;
use roster_server_db::{GlobalSettings, MetadataStore, PeerRecord};
use roster_wg_common::{
	parse_allowed_ips, parse_prefix_list, render_qr_svg, split_list, ClientConfig, WgKeyPair,
	WgPresharedKey, WgPublicKey, FULL_TUNNEL_ROUTES,
};
use roster_wg_device::{DeviceAdapter, PeerChange};
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PeerServiceConfig;
use crate::error::{Result, WgError};
use crate::history::{spawn_sampler, StatsHistory};
use crate::ip_allocator::{allocate_next_address, gateway_address, used_addresses};
use crate::types::{InterfaceStats, NewPeer, PeerCreated, PeerUpdate, PeerView, StatsHistoryItem};

/// Largest keepalive interval wg(8) accepts.
const MAX_KEEPALIVE: u32 = u16::MAX as u32;

#[derive(Default)]
struct KeyLocks {
	locks: SyncMutex<HashMap<WgPublicKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
	async fn lock(&self, key: WgPublicKey) -> OwnedMutexGuard<()> {
		let lock = {
			let mut locks = self.locks.lock();
			// Entries only the map still references are idle.
			locks.retain(|_, l| Arc::strong_count(l) > 1);
			locks.entry(key).or_default().clone()
		};
		lock.lock_owned().await
	}
}

/// A validated creation request.
struct PeerSpec {
	name: String,
	public_key: WgPublicKey,
	/// Set when the server generated the key pair.
	key_pair: Option<WgKeyPair>,
	/// `None` means allocate.
	allowed_ips: Option<Vec<IpNet>>,
	dns: String,
	mtu: u32,
	persistent_keepalive: u32,
	preshared_key: bool,
	interface_address: String,
}

impl PeerSpec {
	fn from_request(req: NewPeer) -> Result<Self> {
		let name = req.name.trim().to_string();
		if name.is_empty() {
			return Err(WgError::Validation("name is required".to_string()));
		}

		let allowed_ips = req
			.allowed_ips
			.as_deref()
			.map(parse_allowed_ips)
			.transpose()?;

		let interface_address = req.interface_address.unwrap_or_default().trim().to_string();
		parse_prefix_list(&interface_address)?;

		let persistent_keepalive = req.persistent_keepalive.unwrap_or(0);
		check_keepalive(persistent_keepalive)?;

		let supplied = req
			.public_key
			.as_deref()
			.map(str::trim)
			.filter(|k| !k.is_empty());
		let (public_key, key_pair) = match supplied {
			Some(key) => (WgPublicKey::from_base64(key)?, None),
			None => {
				let pair = WgKeyPair::generate();
				(*pair.public_key(), Some(pair))
			}
		};

		Ok(Self {
			name,
			public_key,
			key_pair,
			allowed_ips,
			dns: req.dns.unwrap_or_default().trim().to_string(),
			mtu: req.mtu.unwrap_or(0),
			persistent_keepalive,
			preshared_key: req.preshared_key,
			interface_address,
		})
	}
}

fn check_keepalive(keepalive: u32) -> Result<()> {
	if keepalive > MAX_KEEPALIVE {
		return Err(WgError::Validation(format!(
			"persistent keepalive must be at most {MAX_KEEPALIVE} seconds"
		)));
	}
	Ok(())
}

fn parse_key(public_key: &str) -> Result<WgPublicKey> {
	Ok(WgPublicKey::from_base64(public_key)?)
}

struct Inner {
	store: Arc<dyn MetadataStore>,
	device: Arc<dyn DeviceAdapter>,
	config: PeerServiceConfig,
	history: StatsHistory,
	sync_gate: RwLock<()>,
	key_locks: KeyLocks,
	creation_lock: Mutex<()>,
	shutdown_tx: watch::Sender<bool>,
	sampler: SyncMutex<Option<JoinHandle<()>>>,
	closed: AtomicBool,
}

/// Coordinates the metadata store, the device and the stats history.
#[derive(Clone)]
pub struct PeerService {
	inner: Arc<Inner>,
}

impl PeerService {
	pub fn new(
		store: Arc<dyn MetadataStore>,
		device: Arc<dyn DeviceAdapter>,
		config: PeerServiceConfig,
	) -> Self {
		let (shutdown_tx, _) = watch::channel(false);
		let history = StatsHistory::new(config.history_capacity);
		Self {
			inner: Arc::new(Inner {
				store,
				device,
				config,
				history,
				sync_gate: RwLock::new(()),
				key_locks: KeyLocks::default(),
				creation_lock: Mutex::new(()),
				shutdown_tx,
				sampler: SyncMutex::new(None),
				closed: AtomicBool::new(false),
			}),
		}
	}

	pub fn config(&self) -> &PeerServiceConfig {
		&self.inner.config
	}

	pub fn history(&self) -> &StatsHistory {
		&self.inner.history
	}

	fn ensure_open(&self) -> Result<()> {
		if self.inner.closed.load(Ordering::Acquire) {
			return Err(WgError::Closed);
		}
		Ok(())
	}

	/// Pushes stored peers to the device and starts the stats sampler.
	///
	/// A failed sync is logged and startup continues; the device may then
	/// lack some stored peers until the next successful [`Self::sync`].
	pub async fn start(&self) {
		if let Err(e) = self.sync().await {
			error!(error = %e, "startup sync failed, serving with possibly inconsistent device state");
		}

		// `close` flips `closed` before taking the slot, so checking under the
		// lock means a sampler spawned here is always seen by `close`.
		let mut sampler = self.inner.sampler.lock();
		if self.inner.closed.load(Ordering::Acquire) {
			return;
		}
		if sampler.is_none() {
			let device = self.inner.device.clone();
			*sampler = Some(spawn_sampler(
				self.inner.history.clone(),
				self.inner.config.stats_interval,
				self.inner.shutdown_tx.subscribe(),
				move || {
					let device = device.clone();
					async move { device.device().await.map(|info| info.totals()) }
				},
			));
			debug!(
				interval_secs = self.inner.config.stats_interval.as_secs(),
				"stats sampler started"
			);
		}
	}

	/// Additively applies every stored peer to the device in one batch.
	/// Peers present only on the device are left alone. Idempotent.
	#[instrument(skip(self))]
	pub async fn sync(&self) -> Result<()> {
		self.ensure_open()?;
		let _gate = self.inner.sync_gate.write().await;

		let records = self.inner.store.list_all().await?;
		if records.is_empty() {
			debug!("no stored peers to sync");
			return Ok(());
		}

		let changes: Vec<PeerChange> = records
			.values()
			.map(|r| PeerChange::Upsert {
				public_key: r.public_key,
				allowed_ips: r.allowed_ips.clone(),
				preshared_key: r.preshared_key.clone(),
			})
			.collect();
		self.inner.device.apply(&changes).await?;

		info!(peers = changes.len(), "synced stored peers to device");
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn list_peers(&self) -> Result<Vec<PeerView>> {
		self.ensure_open()?;
		let info = self.inner.device.device().await?;
		let records = self.inner.store.list_all().await?;

		Ok(info
			.peers
			.iter()
			.map(|p| PeerView::from_live(p, records.get(&p.public_key)))
			.collect())
	}

	#[instrument(skip(self))]
	pub async fn get_peer(&self, public_key: &str) -> Result<PeerView> {
		self.ensure_open()?;
		let key = parse_key(public_key)?;
		let record = self.inner.store.get(&key).await?;
		let info = self.inner.device.device().await?;

		match (info.peer(&key), &record) {
			(Some(live), record) => Ok(PeerView::from_live(live, record.as_ref())),
			(None, Some(record)) => Ok(PeerView::from_record(record)),
			(None, None) => Err(WgError::PeerNotFound(key)),
		}
	}

	#[instrument(skip(self, req), fields(name = %req.name))]
	pub async fn add_peer(&self, req: NewPeer) -> Result<PeerCreated> {
		self.ensure_open()?;
		let spec = PeerSpec::from_request(req)?;
		let _gate = self.inner.sync_gate.read().await;
		self.add_locked(spec).await
	}

	async fn add_locked(&self, spec: PeerSpec) -> Result<PeerCreated> {
		let inner = &self.inner;
		let _key_guard = inner.key_locks.lock(spec.public_key).await;

		if inner.store.get(&spec.public_key).await?.is_some() {
			return Err(WgError::Validation(format!(
				"peer {} already exists",
				spec.public_key
			)));
		}

		let preshared_key = spec.preshared_key.then(WgPresharedKey::generate);

		let allowed_ips = {
			let _creation = inner.creation_lock.lock().await;
			let allowed_ips = match spec.allowed_ips {
				Some(ips) => ips,
				None => vec![self.allocate_address().await?],
			};
			inner
				.device
				.apply(&[PeerChange::Upsert {
					public_key: spec.public_key,
					allowed_ips: allowed_ips.clone(),
					preshared_key: preshared_key.clone(),
				}])
				.await?;
			allowed_ips
		};

		let record = PeerRecord {
			public_key: spec.public_key,
			private_key: spec.key_pair.map(WgKeyPair::into_private_key),
			preshared_key,
			name: spec.name,
			allowed_ips,
			dns: spec.dns,
			mtu: spec.mtu,
			persistent_keepalive: spec.persistent_keepalive,
			interface_address: spec.interface_address,
		};

		if let Err(e) = inner.store.put(&record).await {
			error!(
				public_key = %record.public_key,
				error = %e,
				"peer is configured on the device but its metadata was not saved; remove it or re-add"
			);
			return Err(e.into());
		}
		info!(public_key = %record.public_key, name = %record.name, "added peer");

		let config = match record.private_key {
			Some(_) => match self.render_config(&record).await {
				Ok(config) => Some(config),
				Err(e) => {
					warn!(public_key = %record.public_key, error = %e, "peer added but its profile could not be rendered");
					None
				}
			},
			None => None,
		};

		Ok(PeerCreated {
			peer: PeerView::from_record(&record),
			private_key: record
				.private_key
				.as_ref()
				.map(|k| k.to_base64().as_str().to_string()),
			preshared_key: record
				.preshared_key
				.as_ref()
				.map(|k| k.to_base64().as_str().to_string()),
			config,
		})
	}

	async fn allocate_address(&self) -> Result<IpNet> {
		let subnet = self.inner.config.subnet;
		let settings = self.inner.store.get_settings().await;
		let reserved = HashSet::from([gateway_address(&subnet, &settings.server_address)]);

		let info = self.inner.device.device().await?;
		let records = self.inner.store.list_all().await?;

		let mut used = used_addresses(info.peers.iter().flat_map(|p| p.allowed_ips.iter()));
		used.extend(used_addresses(
			records.values().flat_map(|r| r.allowed_ips.iter()),
		));
		for record in records.values() {
			if let Ok(nets) = parse_prefix_list(&record.interface_address) {
				used.extend(used_addresses(&nets));
			}
		}

		let addr = allocate_next_address(subnet, &reserved, &used)?;
		debug!(%addr, %subnet, "allocated address");
		Ok(addr)
	}

	/// Removes the peer from the device, then deletes its metadata.
	#[instrument(skip(self))]
	pub async fn remove_peer(&self, public_key: &str) -> Result<()> {
		self.ensure_open()?;
		let key = parse_key(public_key)?;
		let _gate = self.inner.sync_gate.read().await;
		let _key_guard = self.inner.key_locks.lock(key).await;
		self.remove_locked(&key).await
	}

	async fn remove_locked(&self, key: &WgPublicKey) -> Result<()> {
		let record = self.inner.store.get(key).await?;
		let live = self.inner.device.device().await?.peer(key).is_some();
		if record.is_none() && !live {
			return Err(WgError::PeerNotFound(*key));
		}

		self.inner
			.device
			.apply(&[PeerChange::Remove { public_key: *key }])
			.await?;
		if record.is_some() {
			self.inner.store.delete(key).await?;
		}

		info!(public_key = %key, "removed peer");
		Ok(())
	}

	/// Applies field updates. Only a change of allowed IPs reaches the device.
	#[instrument(skip(self, update))]
	pub async fn update_peer(&self, public_key: &str, update: PeerUpdate) -> Result<PeerView> {
		self.ensure_open()?;
		let key = parse_key(public_key)?;

		let name = match update.name {
			Some(name) => {
				let name = name.trim().to_string();
				if name.is_empty() {
					return Err(WgError::Validation("name cannot be empty".to_string()));
				}
				Some(name)
			}
			None => None,
		};
		let allowed_ips = update
			.allowed_ips
			.as_deref()
			.map(parse_allowed_ips)
			.transpose()?;
		let interface_address = update.interface_address.map(|a| a.trim().to_string());
		if let Some(address) = &interface_address {
			parse_prefix_list(address)?;
		}
		if let Some(keepalive) = update.persistent_keepalive {
			check_keepalive(keepalive)?;
		}

		let _gate = self.inner.sync_gate.read().await;
		let _key_guard = self.inner.key_locks.lock(key).await;

		let mut record = self
			.inner
			.store
			.get(&key)
			.await?
			.ok_or(WgError::PeerNotFound(key))?;

		if let Some(name) = name {
			record.name = name;
		}
		if let Some(dns) = update.dns {
			record.dns = dns.trim().to_string();
		}
		if let Some(mtu) = update.mtu {
			record.mtu = mtu;
		}
		if let Some(keepalive) = update.persistent_keepalive {
			record.persistent_keepalive = keepalive;
		}
		if let Some(address) = interface_address {
			record.interface_address = address;
		}

		if let Some(ips) = allowed_ips {
			if ips != record.allowed_ips {
				let _creation = self.inner.creation_lock.lock().await;
				self.inner
					.device
					.apply(&[PeerChange::UpdateAllowedIps {
						public_key: key,
						allowed_ips: ips.clone(),
					}])
					.await?;
				record.allowed_ips = ips;
			}
		}

		self.inner.store.put(&record).await?;
		info!(public_key = %key, "updated peer");

		match self.inner.device.device().await {
			Ok(info) => Ok(match info.peer(&key) {
				Some(live) => PeerView::from_live(live, Some(&record)),
				None => PeerView::from_record(&record),
			}),
			Err(e) => {
				warn!(public_key = %key, error = %e, "peer updated but device is unreadable");
				Ok(PeerView::from_record(&record))
			}
		}
	}

	/// Rotates a peer's key: remove the old key, then add a new server-generated
	/// key with the same name, allowed IPs and overrides.
	///
	/// The two steps are not atomic. If the add fails after the removal the
	/// peer stays absent and must be re-added by the caller.
	#[instrument(skip(self))]
	pub async fn regenerate_peer(&self, public_key: &str) -> Result<PeerCreated> {
		self.ensure_open()?;
		let key = parse_key(public_key)?;
		let _gate = self.inner.sync_gate.read().await;
		let _key_guard = self.inner.key_locks.lock(key).await;

		let record = self.inner.store.get(&key).await?;
		let info = self.inner.device.device().await?;
		let live = info.peer(&key);
		if record.is_none() && live.is_none() {
			return Err(WgError::PeerNotFound(key));
		}

		let allowed_ips = match (live, &record) {
			(Some(live), _) if !live.allowed_ips.is_empty() => Some(live.allowed_ips.clone()),
			(_, Some(record)) if !record.allowed_ips.is_empty() => Some(record.allowed_ips.clone()),
			_ => None,
		};
		let pair = WgKeyPair::generate();
		let spec = PeerSpec {
			name: record.as_ref().map(|r| r.name.clone()).unwrap_or_default(),
			public_key: *pair.public_key(),
			key_pair: Some(pair),
			allowed_ips,
			dns: record.as_ref().map(|r| r.dns.clone()).unwrap_or_default(),
			mtu: record.as_ref().map_or(0, |r| r.mtu),
			persistent_keepalive: record.as_ref().map_or(0, |r| r.persistent_keepalive),
			preshared_key: record.as_ref().is_some_and(|r| r.preshared_key.is_some())
				|| live.is_some_and(|l| l.has_preshared_key),
			interface_address: record
				.as_ref()
				.map(|r| r.interface_address.clone())
				.unwrap_or_default(),
		};

		self.remove_locked(&key).await?;

		match self.add_locked(spec).await {
			Ok(created) => {
				info!(old = %key, new = %created.peer.public_key, "regenerated peer keys");
				Ok(created)
			}
			Err(e) => {
				error!(
					public_key = %key,
					error = %e,
					"old key removed but the replacement could not be added; the peer must be re-added"
				);
				Err(e)
			}
		}
	}

	/// Renders the client profile. Fails when the server never held the
	/// peer's private key.
	#[instrument(skip(self))]
	pub async fn get_peer_config(&self, public_key: &str) -> Result<String> {
		self.ensure_open()?;
		let key = parse_key(public_key)?;
		let record = self
			.inner
			.store
			.get(&key)
			.await?
			.ok_or(WgError::PeerNotFound(key))?;
		self.render_config(&record).await
	}

	/// The client profile as an SVG QR code.
	pub async fn get_peer_qr(&self, public_key: &str) -> Result<String> {
		let config = self.get_peer_config(public_key).await?;
		Ok(render_qr_svg(&config)?)
	}

	async fn render_config(&self, record: &PeerRecord) -> Result<String> {
		let private_key = record
			.private_key
			.clone()
			.ok_or(WgError::ConfigUnavailable(record.public_key))?;
		let settings = self.inner.store.get_settings().await;
		let server_public_key = self.server_public_key().await?;

		let addresses = if record.interface_address.trim().is_empty() {
			record.allowed_ips.iter().map(ToString::to_string).collect()
		} else {
			split_list(&record.interface_address)
		};
		let dns = if record.dns.trim().is_empty() {
			split_list(&settings.dns)
		} else {
			split_list(&record.dns)
		};
		let endpoint = if settings.endpoint.trim().is_empty() {
			self.inner.config.server_endpoint.clone()
		} else {
			settings.endpoint.trim().to_string()
		};

		Ok(ClientConfig {
			private_key,
			addresses,
			dns,
			mtu: or_default(record.mtu, settings.mtu),
			persistent_keepalive: or_default(record.persistent_keepalive, settings.keepalive),
			server_public_key,
			preshared_key: record.preshared_key.clone(),
			endpoint,
			allowed_ips: FULL_TUNNEL_ROUTES.iter().map(|s| s.to_string()).collect(),
		}
		.render())
	}

	async fn server_public_key(&self) -> Result<WgPublicKey> {
		if let Some(key) = self.inner.config.server_public_key {
			return Ok(key);
		}
		self.inner
			.device
			.device()
			.await?
			.public_key
			.ok_or_else(|| WgError::Internal("server public key is unknown".to_string()))
	}

	#[instrument(skip(self))]
	pub async fn get_stats(&self) -> Result<InterfaceStats> {
		self.ensure_open()?;
		let info = self.inner.device.device().await?;
		let (total_rx, total_tx) = info.totals();

		Ok(InterfaceStats {
			interface_name: info.name.clone(),
			public_key: info
				.public_key
				.or(self.inner.config.server_public_key)
				.map(|k| k.to_base64())
				.unwrap_or_default(),
			listen_port: info.listen_port,
			subnet: self.inner.config.subnet.to_string(),
			peer_count: info.peers.len(),
			total_rx,
			total_tx,
		})
	}

	pub fn get_stats_history(&self) -> Vec<StatsHistoryItem> {
		self.inner.history.snapshot()
	}

	pub async fn get_settings(&self) -> GlobalSettings {
		self.inner.store.get_settings().await
	}

	#[instrument(skip(self, settings))]
	pub async fn update_settings(&self, settings: GlobalSettings) -> Result<()> {
		self.ensure_open()?;
		let settings = GlobalSettings {
			server_address: settings.server_address.trim().to_string(),
			dns: settings.dns.trim().to_string(),
			endpoint: settings.endpoint.trim().to_string(),
			..settings
		};
		if !settings.server_address.is_empty() && settings.server_address.parse::<IpNet>().is_err() {
			return Err(WgError::Validation(format!(
				"invalid server address {:?}: expected address/prefix",
				settings.server_address
			)));
		}
		check_keepalive(settings.keepalive)?;

		self.inner.store.update_settings(&settings).await?;
		info!("settings updated");
		Ok(())
	}

	/// Stops the sampler and releases the device. Later calls are no-ops.
	pub async fn close(&self) -> Result<()> {
		if self.inner.closed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		let _ = self.inner.shutdown_tx.send(true);

		let sampler = self.inner.sampler.lock().take();
		if let Some(handle) = sampler {
			if let Err(e) = handle.await {
				warn!(error = %e, "stats sampler task failed");
			}
		}

		// Let in-flight mutations finish before the device goes away.
		let _gate = self.inner.sync_gate.write().await;
		self.inner.device.close().await?;
		info!(interface = %self.inner.device.name(), "peer service closed");
		Ok(())
	}
}

fn or_default(value: u32, default: u32) -> u32 {
	if value != 0 {
		value
	} else {
		default
	}
}
