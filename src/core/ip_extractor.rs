//! Client IP extraction for rate limiting
//!
//! Proxy headers are only believed when the direct peer is a configured
//! trusted proxy; otherwise a client could pick its own rate-limit bucket.

use log::{debug, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use warp::hyper::HeaderMap;

/// Headers consulted behind a trusted proxy, in priority order
const PROXY_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// Configuration for IP extraction behavior
#[derive(Debug, Clone, Default)]
pub struct IpExtractionConfig {
    /// Whether to trust proxy headers at all
    pub trust_proxy_headers: bool,
    /// Peers whose proxy headers are believed
    pub trusted_proxies: Vec<IpAddr>,
}

impl IpExtractionConfig {
    pub fn new(trust_proxy_headers: bool, trusted_proxies: Vec<IpAddr>) -> Self {
        Self {
            trust_proxy_headers,
            trusted_proxies,
        }
    }
}

/// Address used when neither the peer nor a header yields one
pub const UNKNOWN_CLIENT_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Parse one proxy header value. X-Forwarded-For may hold "client, proxy1, proxy2";
/// the leftmost entry is the original client.
fn parse_header_ip(name: &str, headers: &HeaderMap) -> Option<IpAddr> {
    let raw = headers.get(name)?.to_str().ok()?;
    let candidate = raw.split(',').next().unwrap_or("").trim();
    match candidate.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            warn!("Invalid IP format in {} header", name);
            None
        }
    }
}

/// Extract the client IP address from headers and connection info
pub fn extract_client_ip(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    config: &IpExtractionConfig,
) -> IpAddr {
    let direct_ip = remote_addr.map(|addr| addr.ip());

    let behind_trusted_proxy = config.trust_proxy_headers
        && direct_ip
            .map(|ip| config.trusted_proxies.contains(&ip))
            .unwrap_or(false);

    if behind_trusted_proxy {
        for name in PROXY_HEADERS {
            if let Some(ip) = parse_header_ip(name, headers) {
                debug!("Client IP taken from {} header", name);
                return ip;
            }
        }
        debug!("No usable proxy header, using proxy address");
    }

    direct_ip.unwrap_or(UNKNOWN_CLIENT_IP)
}
