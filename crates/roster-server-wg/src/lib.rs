// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer roster engine.
//!
//! [`PeerService`] keeps the metadata store and the live device consistent:
//! it pushes stored peers to the device at startup, applies every add,
//! update, removal and key rotation to the device before committing the
//! matching metadata, allocates addresses from the configured subnet and
//! samples interface counters into a bounded history.

pub mod config;
pub mod error;
pub mod history;
pub mod ip_allocator;
pub mod service;
pub mod types;

pub use config::PeerServiceConfig;
pub use error::{ErrorKind, Result, WgError};
pub use history::{StatsHistory, DEFAULT_HISTORY_CAPACITY};
pub use ip_allocator::allocate_next_address;
pub use service::PeerService;
pub use types::{InterfaceStats, NewPeer, PeerCreated, PeerUpdate, PeerView, StatsHistoryItem};
