// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared WireGuard primitives for the roster server.
//!
//! Everything in this crate is pure: key material, address-prefix parsing and
//! the client profile renderer carry no I/O so they can be reused by the
//! device adapters, the store and the engine alike.

pub mod cidr;
pub mod keys;
pub mod qr;
pub mod render;

pub use cidr::{host_net, parse_allowed_ips, parse_prefix_list, CidrError};
pub use keys::{KeyError, WgKeyPair, WgPresharedKey, WgPrivateKey, WgPublicKey};
pub use qr::{render_qr_svg, QrError};
pub use render::{split_list, ClientConfig, FULL_TUNNEL_ROUTES};
