// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer HTTP handlers.
//!
//! `{id}` is the peer's public key. Standard base64 contains `/`, so clients
//! either percent-encode it or send the URL-safe alphabet (`-`, `_`), which
//! is translated back here.

use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::{header, StatusCode},
	response::IntoResponse,
	Json,
};
use roster_server_wg::{NewPeer, PeerCreated, PeerUpdate, PeerView};

use crate::{api::AppState, error::ApiError};

fn peer_key(id: &str) -> String {
	id.trim().replace('-', "+").replace('_', "/")
}

/// File name for a downloaded profile: the peer's name reduced to safe
/// characters.
fn profile_file_name(name: &str) -> String {
	let stem: String = name
		.trim()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
		.collect();
	if stem.trim_matches('_').is_empty() {
		"peer.conf".to_string()
	} else {
		format!("{stem}.conf")
	}
}

/// GET /peers
pub async fn list_peers(State(state): State<AppState>) -> Result<Json<Vec<PeerView>>, ApiError> {
	Ok(Json(state.service.list_peers().await?))
}

/// POST /peers
pub async fn add_peer(
	State(state): State<AppState>,
	body: Result<Json<NewPeer>, JsonRejection>,
) -> Result<(StatusCode, Json<PeerCreated>), ApiError> {
	let Json(req) = body?;
	let created = state.service.add_peer(req).await?;
	Ok((StatusCode::CREATED, Json(created)))
}

/// GET /peers/{id}
pub async fn get_peer(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<PeerView>, ApiError> {
	Ok(Json(state.service.get_peer(&peer_key(&id)).await?))
}

/// PATCH /peers/{id}
pub async fn update_peer(
	State(state): State<AppState>,
	Path(id): Path<String>,
	body: Result<Json<PeerUpdate>, JsonRejection>,
) -> Result<Json<PeerView>, ApiError> {
	let Json(update) = body?;
	Ok(Json(state.service.update_peer(&peer_key(&id), update).await?))
}

/// DELETE /peers/{id}
pub async fn remove_peer(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.remove_peer(&peer_key(&id)).await?;
	Ok(StatusCode::NO_CONTENT)
}

/// POST /peers/{id}/regenerate
pub async fn regenerate_peer(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<PeerCreated>, ApiError> {
	Ok(Json(state.service.regenerate_peer(&peer_key(&id)).await?))
}

/// GET /peers/{id}/config - the client profile as a download.
pub async fn get_peer_config(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	let key = peer_key(&id);
	let config = state.service.get_peer_config(&key).await?;
	let name = state
		.service
		.get_peer(&key)
		.await
		.map(|p| p.name)
		.unwrap_or_default();

	Ok((
		[
			(header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
			(
				header::CONTENT_DISPOSITION,
				format!("attachment; filename=\"{}\"", profile_file_name(&name)),
			),
		],
		config,
	))
}

/// GET /peers/{id}/qr - the client profile as an SVG QR code.
pub async fn get_peer_qr(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
	let svg = state.service.get_peer_qr(&peer_key(&id)).await?;
	Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}

/// POST /sync - re-applies every stored peer to the device.
pub async fn sync(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
	state.service.sync().await?;
	Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn url_safe_ids_are_translated() {
		assert_eq!(peer_key("ab-c_d="), "ab+c/d=");
		assert_eq!(peer_key(" abc= "), "abc=");
	}

	#[test]
	fn profile_names_are_sanitised() {
		assert_eq!(profile_file_name("Laptop"), "Laptop.conf");
		assert_eq!(profile_file_name("Bob's phone"), "Bob_s_phone.conf");
		assert_eq!(profile_file_name("../../etc"), "______etc.conf");
		assert_eq!(profile_file_name(""), "peer.conf");
		assert_eq!(profile_file_name("ÄÖ"), "peer.conf");
	}
}
