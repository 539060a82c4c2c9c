// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Narrow adapters over the live WireGuard interface.
//!
//! The engine never models device internals. It reads the current peer table
//! and hands the device imperative [`PeerChange`] batches; anything else
//! (names, private keys, defaults) lives in the metadata store.

pub mod adapter;
pub mod command;
pub mod error;
pub mod memory;

pub use adapter::{DeviceAdapter, DeviceInfo, DevicePeer, PeerChange};
pub use command::WgCommandDevice;
pub use error::{DeviceError, Result};
pub use memory::MemoryDevice;
