use log::{error, info, warn};
use std::net::SocketAddr;

use ghostbox::config::{CacheBackend, ServerConfig};
use ghostbox::core::server::AppState;
use ghostbox::handlers::routes;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match dotenv_result {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("No .env file loaded: {}", e),
    };

    // Load config from env
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);
    match &config.cache {
        CacheBackend::Memory => info!("Cache backend: in-memory"),
        CacheBackend::Upstash { .. } => info!("Cache backend: Upstash REST"),
    }
    if config.development_mode {
        warn!("Development mode is enabled; do not use it in production");
    }
    if config.allowed_origins.is_empty() {
        warn!("GHOSTBOX_ALLOWED_ORIGINS is empty: any origin is accepted");
    }

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let tls_paths = if config.enable_tls {
        config.tls_cert_path.clone().zip(config.tls_key_path.clone())
    } else {
        None
    };

    let state = match AppState::from_config(config) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialise backing cache: {}", e);
            std::process::exit(1);
        }
    };

    match state.cache.health_check().await {
        Ok(true) => info!("Backing cache reachable"),
        Ok(false) => warn!("Backing cache health check failed"),
        Err(e) => warn!("Backing cache unreachable at startup: {}", e),
    }

    let routes = routes(state);

    match tls_paths {
        Some((cert_path, key_path)) => {
            info!("Starting Ghostbox server with TLS on {}", addr);
            warp::serve(routes)
                .tls()
                .cert_path(cert_path)
                .key_path(key_path)
                .run(addr)
                .await;
        }
        None => {
            info!("Starting Ghostbox server on {}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}
