use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use voyage_core::geocode::GeocodingProvider;
use voyage_core::relay::AgentProvider;
use voyage_core::{AgentSessionRelay, GoogleMapsGeocoder, TripStore, VoyageConfig};

use voyage_server::http::{self, AppState};
use voyage_server::unavailable::{UnavailableAgent, UnavailableGeocoder};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "voyage.toml")]
    config: String,

    /// Probe the storage backend and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match VoyageConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins, otherwise service.log_level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.service.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let sdk = voyage_core::aws::load_sdk_config(&config.aws).await;
    let storage = voyage_core::aws::create_storage(&config, &sdk);

    if args.health {
        match voyage_core::aws::storage_health(storage.as_ref()).await {
            Ok(status) => println!("✅ Storage reachable: {}", status),
            Err(e) => {
                println!("❌ Storage health check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Voyage health check passed");
        return Ok(());
    }

    let agent: Arc<dyn AgentProvider> = match voyage_core::aws::create_agent(&config, &sdk) {
        Ok(agent) => agent,
        Err(e) => {
            tracing::warn!("Chat endpoints disabled: {}", e);
            Arc::new(UnavailableAgent::new(e.to_string()))
        }
    };

    let geocoder: Arc<dyn GeocodingProvider> = match GoogleMapsGeocoder::new(&config.maps) {
        Ok(geocoder) => Arc::new(geocoder),
        Err(e) => {
            tracing::warn!("Location enrichment disabled: {}", e);
            Arc::new(UnavailableGeocoder::new(e.to_string()))
        }
    };

    let state = Arc::new(AppState {
        trips: TripStore::new(storage),
        relay: AgentSessionRelay::new(agent),
        geocoder,
        config,
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
