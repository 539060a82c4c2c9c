// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	routing::{get, post},
	Router,
};
use roster_server_wg::PeerService;

use crate::routes::{health, peers, settings, stats};

#[derive(Clone)]
pub struct AppState {
	pub service: PeerService,
}

impl AppState {
	pub fn new(service: PeerService) -> Self {
		Self { service }
	}
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health::health_check))
		.route("/peers", get(peers::list_peers).post(peers::add_peer))
		.route(
			"/peers/{id}",
			get(peers::get_peer)
				.patch(peers::update_peer)
				.delete(peers::remove_peer),
		)
		.route("/peers/{id}/regenerate", post(peers::regenerate_peer))
		.route("/peers/{id}/config", get(peers::get_peer_config))
		.route("/peers/{id}/qr", get(peers::get_peer_qr))
		.route("/stats", get(stats::get_stats))
		.route("/stats/history", get(stats::get_stats_history))
		.route(
			"/settings",
			get(settings::get_settings).put(settings::update_settings),
		)
		.route("/sync", post(peers::sync))
		.with_state(state)
}
