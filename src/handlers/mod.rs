//! Request handlers for different server endpoints, and the composed gateway

pub mod admin;
pub mod mailbox;
pub mod websocket;

use log::{error, warn};
use std::convert::Infallible;
use std::net::SocketAddr;
use warp::http::{HeaderMap, StatusCode};
use warp::{Filter, Rejection, Reply};

use crate::constants::{ADMIN_TOKEN_HEADER, MAILBOX_PATH, MAX_BODY_BYTES, ROOM_PATH};
use crate::core::ip_extractor::extract_client_ip;
use crate::core::server::AppState;
use crate::error::GhostboxError;
use crate::security::json_reply;

pub use websocket::{handle_room_client, handle_room_upgrade};

/// Crate error carried through warp's rejection path
#[derive(Debug)]
pub struct ApiRejection(pub GhostboxError);

impl warp::reject::Reject for ApiRejection {}

pub(crate) fn api_error(err: GhostboxError) -> Rejection {
    if let GhostboxError::Unavailable(detail) = &err {
        error!("Backing cache failure: {}", detail);
    }
    warp::reject::custom(ApiRejection(err))
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Per-client request budget. Lets requests through when the cache is down.
fn ip_budget(state: AppState) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(warp::addr::remote())
        .and(with_state(state))
        .and_then(
            |headers: HeaderMap, remote: Option<SocketAddr>, state: AppState| async move {
                let ip = extract_client_ip(&headers, remote, &state.ip_config);
                match state.limiter.check_ip(ip, state.config.ip_rate).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(warp::reject::custom(ApiRejection(
                        GhostboxError::RateLimited,
                    ))),
                    Err(e) => {
                        warn!("IP rate limiter unavailable, allowing request: {}", e);
                        Ok(())
                    }
                }
            },
        )
        .untuple_one()
}

fn cors(state: &AppState) -> warp::cors::Cors {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", ADMIN_TOKEN_HEADER, "upgrade"]);

    let builder = if state.config.allowed_origins.is_empty() {
        builder.allow_any_origin()
    } else {
        builder.allow_origins(state.config.allowed_origins.iter().map(String::as_str))
    };
    builder.build()
}

/// Build the full gateway: health, mailbox, rooms and admin
pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            json_reply(
                &serde_json::json!({
                    "status": "ok",
                    "time": chrono::Utc::now().to_rfc3339(),
                }),
                StatusCode::OK,
            )
        });

    let mailbox_put = warp::path(MAILBOX_PATH)
        .and(warp::path("put"))
        .and(warp::path::end())
        .and(warp::post())
        .and(ip_budget(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(mailbox::handle_put);

    let mailbox_take = warp::path(MAILBOX_PATH)
        .and(warp::path("take"))
        .and(warp::path::end())
        .and(warp::post())
        .and(ip_budget(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(mailbox::handle_take);

    let room = warp::path(ROOM_PATH)
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(ip_budget(state.clone()))
        .and(warp::ws())
        .and(with_state(state.clone()))
        .and_then(handle_room_upgrade);

    let admin_stats = warp::path("admin")
        .and(warp::path("stats"))
        .and(warp::path::end())
        .and(warp::get())
        .and(ip_budget(state.clone()))
        .and(warp::header::optional::<String>(ADMIN_TOKEN_HEADER))
        .and(with_state(state.clone()))
        .and_then(admin::handle_stats);

    let admin_login = warp::path("admin")
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::post())
        .and(ip_budget(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(admin::handle_login);

    health
        .or(mailbox_put)
        .or(mailbox_take)
        .or(room)
        .or(admin_stats)
        .or(admin_login)
        .recover(handle_rejection)
        .with(cors(&state))
        // Only CORS refusals get past the first recover
        .recover(handle_rejection)
        .with(warp::log("ghostbox::access"))
}

/// Turn every rejection into a `{error}` JSON body
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Route not found")
    } else if let Some(ApiRejection(e)) = err.find::<ApiRejection>() {
        (e.status(), e.public_message())
    } else if let Some(forbidden) = err.find::<warp::cors::CorsForbidden>() {
        let e = GhostboxError::OriginForbidden(forbidden.to_string());
        warn!("{}", e);
        (e.status(), e.public_message())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid data")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Length required")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request")
    };

    Ok(json_reply(&serde_json::json!({ "error": message }), status))
}
