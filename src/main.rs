use climate_stations::appliance::AcRatingTable;
use climate_stations::config::{Config, QueryTarget};
use climate_stations::error::AppError;
use climate_stations::fetcher::Fetcher;
use climate_stations::geocode::Geocoder;
use climate_stations::inventory::StationInventory;
use climate_stations::orchestrator::{Orchestrator, RunOutcome};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,climate_stations=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Climate station retrieval starting...");

    // Load configuration
    let config = Config::load("config/config.yaml").map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {}\n\n\
             Make sure:\n\
             1. config/config.yaml exists\n\
             2. All required environment variables are set (check .env.example)\n\
             3. Create a .env file if needed",
            e
        )
    })?;
    info!("Configuration loaded");

    let fetcher = Fetcher::new(&config.source.base_url, config.source.timeout())?;

    let inventory = match (&config.inventory.path, &config.inventory.url) {
        (Some(path), _) => StationInventory::load(path),
        (None, Some(url)) => {
            let text = fetcher.download_text(url).await?;
            StationInventory::parse(&text)
        }
        (None, None) => Err(AppError::Config(
            "Inventory needs either 'path' or 'url'".to_string(),
        )),
    }
    .map_err(|e| {
        anyhow::anyhow!(
            "Failed to load station inventory: {}\n\n\
             Check inventory.path / inventory.url in config/config.yaml",
            e
        )
    })?;
    info!("Station inventory loaded: {} stations", inventory.len());

    if let Some(appliance) = &config.appliance {
        let table = AcRatingTable::load(&appliance.ratings_path)?;
        match table.lookup(&appliance.model) {
            Ok(rating) => info!(
                "AC {}: {} BTU cooling capacity, EER {}",
                rating.model, rating.cooling_capacity_btu, rating.energy_efficiency_ratio
            ),
            Err(e) => warn!("{}", e),
        }
    }

    let mut orchestrator = Orchestrator::new(
        Arc::new(inventory),
        fetcher,
        config.source.max_concurrent_fetches,
    );
    if let Some(geocoding) = &config.geocoding {
        orchestrator = orchestrator.with_geocoder(Geocoder::new(
            &geocoding.base_url,
            &geocoding.api_key,
            config.source.timeout(),
        )?);
    }

    let radius_km = config.query.radius_km;
    let target = config.query.target()?;
    let run = async {
        match target {
            QueryTarget::Address(address) => orchestrator.run_for_address(&address, radius_km).await,
            QueryTarget::Point {
                latitude,
                longitude,
            } => orchestrator.run(latitude, longitude, radius_km).await,
        }
    };

    let outcome = tokio::select! {
        result = run => result,
        _ = shutdown_signal() => {
            info!("Climate station retrieval interrupted");
            return Ok(());
        }
    };

    match outcome {
        Ok(outcome) => {
            summarize(&outcome);
            if let Some(output) = &config.output {
                let json = serde_json::to_string_pretty(&outcome)?;
                std::fs::write(&output.path, json)?;
                info!("Wrote results to {}", output.path.display());
            }
        }
        Err(e) => {
            error!("Retrieval error: {}", e);
            return Err(e.into());
        }
    }

    info!("Climate station retrieval finished");
    Ok(())
}

fn summarize(outcome: &RunOutcome) {
    for station in &outcome.stations {
        info!(
            "{} ({}): {:.1} km, {} years covered, {} timestamps",
            station.name,
            station.station_id,
            station.distance_km,
            station.coverage.len() - station.coverage.missing_years().len(),
            station.series.len()
        );
    }

    for failure in &outcome.report.failures {
        warn!(
            "Missing {} data for '{}' {}-{:02}: {}",
            failure.granularity, failure.station, failure.year, failure.month, failure.reason
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
