//! Security headers for JSON API responses

use warp::http::StatusCode;
use warp::Reply;

/// Strict Content Security Policy for API endpoints
const STRICT_CSP: &str = "default-src 'none'; frame-ancestors 'none';";

/// Wrap a reply with strict security headers for API endpoints
pub fn with_api_security_headers<T: Reply>(reply: T) -> impl Reply {
    let reply = warp::reply::with_header(reply, "X-Frame-Options", "DENY");
    let reply = warp::reply::with_header(reply, "X-Content-Type-Options", "nosniff");
    let reply = warp::reply::with_header(reply, "Referrer-Policy", "no-referrer");
    let reply = warp::reply::with_header(reply, "Content-Security-Policy", STRICT_CSP);
    warp::reply::with_header(reply, "Cache-Control", "no-store")
}

/// JSON body with status and API headers
pub fn json_reply<T: serde::Serialize>(body: &T, status: StatusCode) -> warp::reply::Response {
    with_api_security_headers(warp::reply::with_status(warp::reply::json(body), status))
        .into_response()
}
