/// Bluetooth Low Energy scanning for WS90 BTHome advertisements
use futures_util::StreamExt;
use log::{debug, error, warn};
use std::collections::HashMap;
use tokio::time::{sleep, Duration, Instant};

use crate::bthome::BTHOME_SERVICE_UUID;
use crate::config::StationConfig;
use crate::models::Advertisement;
use crate::utils::unix_now;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Scan for configured WS90 stations and collect their BTHome service data
///
/// Discovery runs for `scan_duration`. Every distinct payload seen from a
/// configured station during that window is returned in arrival order.
/// Decoding is left to the caller.
///
/// # Arguments
/// * `config` - Configuration holding the station addresses to watch
/// * `scan_duration` - Length of the discovery window
///
/// # Returns
/// Advertisements stamped with their arrival time, or an error when the
/// adapter could not be set up
pub async fn scan_for_ws90(
    config: &StationConfig,
    scan_duration: Duration,
) -> Result<Vec<Advertisement>, Box<dyn std::error::Error>> {
    let mut adverts = Vec::new();

    // Initialize Bluetooth session
    let session = match bluer::Session::new().await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to create Bluetooth session: {}", e);
            return Err(e.into());
        }
    };

    // Get the default Bluetooth adapter
    let adapter = match session.default_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to get default Bluetooth adapter: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = adapter.set_powered(true).await {
        error!("Failed to power on adapter: {}", e);
        return Err(e.into());
    }

    // WS90 advertises passively; we need every repeat to see new packet ids
    let filter = bluer::DiscoveryFilter {
        transport: bluer::DiscoveryTransport::Le,
        duplicate_data: true,
        uuids: [BTHOME_SERVICE_UUID].into_iter().collect(),
        ..Default::default()
    };

    if let Err(e) = adapter.set_discovery_filter(filter).await {
        warn!("Failed to set discovery filter: {}", e);
    }

    let discovery_handle = match adapter.discover_devices().await {
        Ok(discovery_stream) => tokio::spawn(async move {
            let mut stream = discovery_stream;
            while let Some(event) = stream.next().await {
                debug!("Discovery event: {:?}", event);
            }
        }),
        Err(e) => {
            error!("Failed to start device discovery: {}", e);
            return Err(e.into());
        }
    };

    // Poll the configured stations while discovery runs; the WS90
    // alternates between two packet types so one snapshot is not enough
    let deadline = Instant::now() + scan_duration;
    let mut last_payloads: HashMap<String, Vec<u8>> = HashMap::new();
    while Instant::now() < deadline {
        for address in config.stations.keys() {
            let Some(advert) = read_advertisement(&adapter, address).await else {
                continue;
            };
            if last_payloads.get(address) == Some(&advert.payload) {
                continue;
            }
            last_payloads.insert(address.clone(), advert.payload.clone());
            adverts.push(advert);
        }
        sleep(POLL_INTERVAL).await;
    }

    discovery_handle.abort();

    Ok(adverts)
}

/// Current BTHome service data of one station, if BlueZ has any
async fn read_advertisement(adapter: &bluer::Adapter, address: &str) -> Option<Advertisement> {
    let addr: bluer::Address = match address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid station address {}: {}", address, e);
            return None;
        }
    };
    let device = adapter.device(addr).ok()?;

    let payload = match device.service_data().await {
        Ok(Some(mut service_data)) => service_data.remove(&BTHOME_SERVICE_UUID)?,
        Ok(None) => return None,
        Err(e) => {
            debug!("Failed to get service data for {}: {}", address, e);
            return None;
        }
    };

    let rssi = device.rssi().await.ok().flatten();
    debug!(
        "Received {} bytes from {} (rssi {:?})",
        payload.len(),
        address,
        rssi
    );

    Some(Advertisement {
        address: address.to_string(),
        payload,
        rssi,
        received_at: unix_now(),
    })
}
