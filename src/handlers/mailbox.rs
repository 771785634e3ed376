//! One-time mailbox endpoints

use serde::Deserialize;
use warp::http::StatusCode;
use warp::Rejection;

use crate::core::server::AppState;
use crate::handlers::api_error;
use crate::security::json_reply;

/// Body of `POST /mailbox/put`
#[derive(Debug, Deserialize)]
pub struct PutRequest {
    pub key: String,
    /// Opaque client-side ciphertext, stored as-is
    pub data: String,
}

/// Body of `POST /mailbox/take`
#[derive(Debug, Deserialize)]
pub struct TakeRequest {
    pub key: String,
}

pub async fn handle_put(
    request: PutRequest,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    state
        .mailbox
        .put(&request.key, &request.data)
        .await
        .map_err(api_error)?;

    Ok(json_reply(
        &serde_json::json!({ "success": true }),
        StatusCode::OK,
    ))
}

pub async fn handle_take(
    request: TakeRequest,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    let outcome = state.mailbox.take(&request.key).await.map_err(api_error)?;
    Ok(json_reply(&outcome, StatusCode::OK))
}
