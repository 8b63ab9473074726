mod bluetooth;
mod bthome;
mod comfort;
mod config;
mod database;
mod error;
mod models;
mod rain;
mod station;
mod utils;

use log::{debug, error, info, warn};
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration, Instant};

use bluetooth::scan_for_ws90;
use config::StationConfig;
use database::{load_rain_history, DatabaseTarget, HistoryWriter, ReportWriter, RetryPolicy};
use error::DatabaseError;
use rain::HistoryEntry;
use station::WeatherStation;
use utils::{format_datetime, unix_now};

const SCAN_DURATION_SECS: u64 = 20;
const POLL_INTERVAL_SECS: u64 = 30;
const SHUTDOWN_GRACE_SECS: u64 = 30;

/// Decide what a station may start from after a history load
///
/// # Arguments
/// * `name` - Station name for logging
/// * `loaded` - Outcome of `load_rain_history`
///
/// # Returns
/// The history to adopt, or `None` when the stored history is unknown and
/// must not be overwritten until a later load succeeds
fn restored_history(
    name: &str,
    loaded: Result<Vec<HistoryEntry>, DatabaseError>,
) -> Option<Vec<HistoryEntry>> {
    match loaded {
        Ok(history) => {
            info!("Restored {} rain samples for {}", history.len(), name);
            Some(history)
        }
        Err(DatabaseError::InvalidHistory(e)) => {
            warn!("Discarding unreadable rain history for {}: {}", name, e);
            Some(Vec::new())
        }
        Err(e) => {
            warn!("Rain history for {} unavailable, will retry: {}", name, e);
            None
        }
    }
}

/// Create one station per configured address, restoring its rain history
async fn load_stations(
    config: &StationConfig,
    target: &DatabaseTarget,
    policy: RetryPolicy,
) -> HashMap<String, WeatherStation> {
    let mut stations = HashMap::new();

    for (address, name) in &config.stations {
        let loaded = load_rain_history(address, target, policy).await;
        let station = match restored_history(name, loaded) {
            Some(history) => WeatherStation::new(name, address, history),
            None => WeatherStation::unrestored(name, address),
        };
        stations.insert(address.clone(), station);
    }

    stations
}

/// Retry the history load for stations that started without one
async fn restore_pending(
    stations: &mut HashMap<String, WeatherStation>,
    target: &DatabaseTarget,
    policy: RetryPolicy,
) {
    for station in stations.values_mut().filter(|s| s.needs_restore()) {
        let address = station.address().to_string();
        let loaded = load_rain_history(&address, target, policy).await;
        if let Some(history) = restored_history(station.name(), loaded) {
            station.restore(history);
        }
    }
}

fn log_health(stations: &HashMap<String, WeatherStation>, uptime: Duration) {
    let now = unix_now();
    for station in stations.values() {
        let health = station.health(now);
        match health.last_seen_secs {
            Some(last_seen) => info!(
                "[{}] Health: {} packets, last seen {}s ago, uptime {}s",
                station.name(),
                health.packets,
                last_seen,
                uptime.as_secs()
            ),
            None => info!(
                "[{}] Health: no packets yet, uptime {}s",
                station.name(),
                uptime.as_secs()
            ),
        }
    }
}

/// Sleep for `duration` unless shutdown is requested first
///
/// # Returns
/// `true` when shutdown was requested
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut oneshot::Receiver<()>) -> bool {
    tokio::select! {
        _ = sleep(duration) => false,
        _ = shutdown => true,
    }
}

/// Wait for a writer task to flush its queue
async fn flush_writer(what: &str, handle: JoinHandle<()>) {
    match timeout(Duration::from_secs(SHUTDOWN_GRACE_SECS), handle).await {
        Ok(Ok(())) => debug!("{} writer flushed", what),
        Ok(Err(e)) => error!("{} writer failed: {}", what, e),
        Err(_) => warn!("Gave up waiting for the {} writer to flush", what),
    }
}

async fn main_loop(
    config: StationConfig,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting WS90 weather data collection service");

    let target = DatabaseTarget::parse(&config.database_url)?;
    let policy = RetryPolicy {
        max_attempts: config.db_max_retries,
        wait: config.db_retry_wait,
    };
    // Startup loads and report inserts must not hold things up for minutes
    // on an unreachable database; only history saves retry for long
    let quick_policy = RetryPolicy {
        max_attempts: config.db_max_retries.min(3),
        ..policy
    };
    let single_attempt = RetryPolicy {
        max_attempts: 1,
        ..policy
    };

    let mut stations = load_stations(&config, &target, quick_policy).await;
    let (history_writer, history_handle) = HistoryWriter::spawn(target.clone(), policy);
    let (report_writer, report_handle) = ReportWriter::spawn(target.clone(), quick_policy);

    let started = Instant::now();
    let mut last_health = Instant::now();

    loop {
        let cycle_started = OffsetDateTime::now_utc();
        info!("Starting scan at: {}", format_datetime(&cycle_started));

        restore_pending(&mut stations, &target, single_attempt).await;

        let scan = scan_for_ws90(&config, Duration::from_secs(SCAN_DURATION_SECS));
        let adverts = tokio::select! {
            result = scan => match result {
                Ok(adverts) => adverts,
                Err(e) => {
                    error!("Scan failed: {}", e);
                    if sleep_or_shutdown(Duration::from_secs(POLL_INTERVAL_SECS), &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let mut reports = 0;
        for advert in &adverts {
            let Some(station) = stations.get_mut(&advert.address) else {
                continue;
            };

            let Some(report) = station.process(advert, advert.received_at, config.fallback_offset)
            else {
                continue;
            };

            if let Some(entries) = station.take_history_update() {
                history_writer.save(station.address(), entries);
            }

            match serde_json::to_string(&report.fields()) {
                Ok(json) => debug!("{}: {}", station.name(), json),
                Err(e) => debug!("{}: could not serialize report: {}", station.name(), e),
            }
            info!(
                "{}: temp={:?}°C, feels like={:?}°C, raining={:?}",
                station.name(),
                report.values.get("temperature"),
                report.feels_like,
                report.raining
            );

            report_writer.store(report);
            reports += 1;
        }

        if reports == 0 {
            warn!("No new readings during this scan!");
        }

        if last_health.elapsed() >= config.health_interval {
            log_health(&stations, started.elapsed());
            last_health = Instant::now();
        }

        let elapsed = (OffsetDateTime::now_utc() - cycle_started).whole_seconds().max(0) as u64;
        let wait = POLL_INTERVAL_SECS.saturating_sub(elapsed);
        if wait > 0 && sleep_or_shutdown(Duration::from_secs(wait), &mut shutdown).await {
            break;
        }
    }

    info!("Shutdown requested, flushing pending writes");
    drop(history_writer);
    drop(report_writer);
    flush_writer("Rain history", history_handle).await;
    flush_writer("Report", report_handle).await;

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match StationConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
                // Keep the sender alive so the main loop is not cancelled
                std::future::pending::<()>().await;
            }
        }
    });

    // Run main loop until the shutdown signal has been handled
    match main_loop(config, rx).await {
        Ok(()) => info!("Program terminated by user. Exiting gracefully."),
        Err(e) => error!("Fatal error: {}", e),
    }

    Ok(())
}
