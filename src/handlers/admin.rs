//! Admin endpoints, gated by the shared admin secret
//!
//! Only aggregate counters are exposed. Every check takes at least
//! `ADMIN_AUTH_MIN_MILLIS` whatever the outcome.

use log::warn;
use serde::Deserialize;
use std::time::Duration;
use warp::http::StatusCode;
use warp::Rejection;

use crate::constants::ADMIN_AUTH_MIN_MILLIS;
use crate::core::server::AppState;
use crate::error::GhostboxError;
use crate::handlers::api_error;
use crate::security::{json_reply, secret_matches, AuthTimer};

/// Body of `POST /admin/login`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub secret: String,
}

fn auth_timer() -> AuthTimer {
    AuthTimer::new(Duration::from_millis(ADMIN_AUTH_MIN_MILLIS))
}

pub async fn handle_stats(
    token: Option<String>,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    let timer = auth_timer();
    let authorized = secret_matches(token.as_deref(), state.config.admin_token.as_deref());
    timer.wait().await;

    if !authorized {
        warn!("Rejected admin stats request");
        return Err(api_error(GhostboxError::Unauthorized));
    }

    let (send, get) = state.mailbox.stats().await.map_err(api_error)?;
    let body = serde_json::json!({
        "stats": { "send": send, "get": get },
        "rooms": state.metrics.snapshot(),
        "active_rooms": state.rooms.active_rooms().await,
        "uptime_secs": state.metrics.uptime_secs(),
    });
    Ok(json_reply(&body, StatusCode::OK))
}

pub async fn handle_login(
    request: LoginRequest,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    let timer = auth_timer();
    let success = secret_matches(Some(&request.secret), state.config.admin_token.as_deref());
    timer.wait().await;

    if !success {
        warn!("Failed admin login attempt");
    }

    let status = if success {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    Ok(json_reply(&serde_json::json!({ "success": success }), status))
}
