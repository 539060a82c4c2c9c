// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed metadata store.
//!
//! The store owns everything the live device does not track itself: display
//! names, server-generated private keys, per-peer overrides and the single
//! global settings row.

pub mod error;
pub mod peers;
pub mod pool;
pub mod settings;
pub mod store;
pub mod testing;

pub use error::{DbError, Result};
pub use peers::{PeerRecord, PeerRepository};
pub use pool::{create_pool, create_pool_with, run_migrations, PoolOptions};
pub use settings::{GlobalSettings, SettingsRepository};
pub use store::{MetadataStore, SqliteMetadataStore};
