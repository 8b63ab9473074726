use log::{debug, info, warn};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use time::UtcOffset;

use crate::error::ConfigError;
use crate::utils::parse_utc_offset;

const DEFAULT_DB_MAX_RETRIES: usize = 100;
const DEFAULT_DB_RETRY_WAIT_SECS: u64 = 5;
const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct StationConfig {
    /// Upper-case MAC address -> station name
    pub stations: HashMap<String, String>,
    pub database_url: String,
    pub db_max_retries: usize,
    pub db_retry_wait: Duration,
    /// How often per-station packet statistics are logged
    pub health_interval: Duration,
    /// Used for "rain today" whenever the system offset cannot be read
    pub fallback_offset: UtcOffset,
}

impl StationConfig {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let stations = match env::var("WS90_STATIONS") {
            Ok(list) => parse_station_list(&list),
            Err(_) => {
                debug!("WS90_STATIONS not set, trying individual station variables");
                stations_from_vars(env::vars())
            }
        };

        for (mac, name) in &stations {
            info!("Station: {} -> {}", mac, name);
        }
        if stations.is_empty() {
            return Err(ConfigError::NoStations);
        }

        let db_max_retries = parse_var("DB_MAX_RETRIES")?.unwrap_or(DEFAULT_DB_MAX_RETRIES);
        let db_retry_wait = Duration::from_secs(
            parse_var("DB_RETRY_WAIT_SECS")?.unwrap_or(DEFAULT_DB_RETRY_WAIT_SECS),
        );

        let health_interval = Duration::from_secs(
            parse_var("HEALTH_INTERVAL_SECS")?.unwrap_or(DEFAULT_HEALTH_INTERVAL_SECS),
        );

        let fallback_offset = match env::var("LOCAL_UTC_OFFSET") {
            Ok(text) => parse_utc_offset(&text).map_err(|_| ConfigError::InvalidValue {
                name: "LOCAL_UTC_OFFSET",
                value: text,
            })?,
            Err(_) => UtcOffset::current_local_offset().unwrap_or_else(|_| {
                warn!("Could not determine local UTC offset, using UTC for daily rain totals");
                UtcOffset::UTC
            }),
        };

        Ok(StationConfig {
            stations,
            database_url,
            db_max_retries,
            db_retry_wait,
            health_interval,
            fallback_offset,
        })
    }
}

/// Parse `MAC=Name,MAC=Name` pairs
fn parse_station_list(list: &str) -> HashMap<String, String> {
    let mut stations = HashMap::new();
    for pair in list.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((mac, name)) => {
                let mac = mac.trim();
                let name = name.trim();
                if !mac.is_empty() && !name.is_empty() {
                    stations.insert(mac.to_uppercase(), name.to_string());
                }
            }
            None => warn!("Ignoring malformed station entry '{}'", pair),
        }
    }
    stations
}

/// Collect `WS90_STATION_<N>_MAC` / `WS90_STATION_<N>_NAME` pairs
fn stations_from_vars(vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
    let vars: HashMap<String, String> = vars.collect();
    let mut stations = HashMap::new();
    for (key, mac) in &vars {
        let Some(index) = key
            .strip_prefix("WS90_STATION_")
            .and_then(|s| s.strip_suffix("_MAC"))
        else {
            continue;
        };
        if let Some(name) = vars.get(&format!("WS90_STATION_{}_NAME", index)) {
            stations.insert(mac.trim().to_uppercase(), name.trim().to_string());
        }
    }
    stations
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(None),
    }
}
