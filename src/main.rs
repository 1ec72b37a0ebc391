//! maptile-pacer - Rate-limited vector tile serving.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use maptile_pacer::{
    config::Config,
    create_s3_client,
    server::{create_router, RouterConfig, ServerMapView},
    ArchiveProtocol, MapSession, PmTilesSource, StyleDocument,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("maptile-pacer v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Archive: {}", config.archive);
    info!("  Source name: {}", config.source_name);
    info!(
        "  Rate limits: tile log {}ms, viewport log {}ms, fetch debounce {}ms",
        config.tile_log_interval_ms, config.viewport_log_interval_ms, config.fetch_debounce_ms
    );
    info!("  Cache: {} archive(s)", config.cache_archives);

    let http = match reqwest::Client::builder()
        .user_agent(concat!("maptile-pacer/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut source = PmTilesSource::new().with_http_client(http);

    // Only s3:// archives need a client
    if config.needs_s3() {
        if let Some(ref endpoint) = config.s3_endpoint {
            info!("  S3 endpoint: {}", endpoint);
        }
        info!("  S3 region: {}", config.s3_region);
        let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
        source = source.with_s3_client(client);
    }

    let protocol = Arc::new(ArchiveProtocol::with_capacity(source, config.cache_archives));
    let view = Arc::new(ServerMapView::new(StyleDocument::new(&config.style_config())));
    let session = Arc::new(MapSession::new(config.session_config(), protocol, view));

    // The archive is opened eagerly; a failure here is retried on the next load event
    info!("");
    info!("Opening archive...");
    match session.load().await {
        Ok(report) => {
            info!("  Opened {}", report.archive);
            info!("  Added {} layer(s)", report.layers_added.len());
            if let Some(warning) = report.warning {
                warn!("  {}", warning);
            }
        }
        Err(e) => {
            warn!("  Failed to open archive: {}", e);
            warn!("  Tiles return 503 until a load event succeeds");
        }
    }

    let router = create_router(session, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/style.json", addr);
    info!("    curl http://{}/tiles/0/0/0.mvt", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "maptile_pacer=debug,tower_http=debug"
    } else {
        "maptile_pacer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}
