// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP surface over [`roster_server_wg::PeerService`].

pub mod api;
pub mod error;
pub mod routes;

pub use api::{create_router, AppState};
pub use error::ApiError;
