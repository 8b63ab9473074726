/// Per-station processing: decode, dedupe, rain history and derived values
use log::{debug, info, warn};
use time::UtcOffset;

use crate::bthome::{decode, WS90_CATALOG};
use crate::comfort::feels_like;
use crate::models::{Advertisement, DecodedReading, StationReport};
use crate::rain::{local_offset_at, HistoryEntry, HistoryStore, RainTotals};

/// State for one physical WS90
///
/// Each station owns its own packet id tracker and rain history; nothing
/// is shared between stations.
#[derive(Debug)]
pub struct WeatherStation {
    name: String,
    address: String,
    last_packet_id: Option<u8>,
    history: HistoryStore,
    last_temperature: Option<f64>,
    last_wind_speed: Option<f64>,
    history_dirty: bool,
    /// False while the persisted history could not be loaded; saving an
    /// unrestored history would overwrite the stored one
    history_restored: bool,
    packets: u64,
    last_packet_at: Option<i64>,
}

/// Packet statistics for the periodic health summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationHealth {
    pub packets: u64,
    /// Seconds since the last accepted packet, if any arrived
    pub last_seen_secs: Option<i64>,
}

impl WeatherStation {
    pub fn new(name: &str, address: &str, history: Vec<HistoryEntry>) -> Self {
        WeatherStation {
            name: name.to_string(),
            address: address.to_string(),
            last_packet_id: None,
            history: HistoryStore::from_entries(history),
            last_temperature: None,
            last_wind_speed: None,
            history_dirty: false,
            history_restored: true,
            packets: 0,
            last_packet_at: None,
        }
    }

    /// Station whose persisted history is not known yet
    ///
    /// Readings are processed normally, but no history snapshot is handed
    /// out until `restore` succeeds.
    pub fn unrestored(name: &str, address: &str) -> Self {
        WeatherStation {
            history_restored: false,
            ..WeatherStation::new(name, address, Vec::new())
        }
    }

    pub fn needs_restore(&self) -> bool {
        !self.history_restored
    }

    /// Merge a late-loaded persisted history under the live samples
    pub fn restore(&mut self, entries: Vec<HistoryEntry>) {
        if self.history.merge_restored(entries) {
            self.history_dirty = true;
        }
        self.history_restored = true;
    }

    pub fn health(&self, now: i64) -> StationHealth {
        StationHealth {
            packets: self.packets,
            last_seen_secs: self.last_packet_at.map(|ts| (now - ts).max(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Hand out the rain history if it changed since the last call
    pub fn take_history_update(&mut self) -> Option<Vec<HistoryEntry>> {
        if !self.history_dirty || !self.history_restored {
            return None;
        }
        self.history_dirty = false;
        Some(self.history.entries().to_vec())
    }

    /// Process one advertisement received at `ts`
    ///
    /// Returns `None` when the envelope could not be decoded or repeats the
    /// previous packet id; in both cases no state is touched.
    pub fn process(
        &mut self,
        advertisement: &Advertisement,
        ts: i64,
        fallback_offset: UtcOffset,
    ) -> Option<StationReport> {
        let fields = match decode(&advertisement.payload, &WS90_CATALOG) {
            Ok(fields) => fields,
            Err(e) => {
                warn!("[{}] Dropping advertisement: {}", self.name, e);
                return None;
            }
        };
        if fields.truncated {
            debug!(
                "[{}] Advertisement decoded partially: {:02X?}",
                self.name, advertisement.payload
            );
        }

        let reading = DecodedReading {
            fields,
            rssi: advertisement.rssi,
            ts,
        };

        if let Some(pid) = reading.packet_id() {
            if self.last_packet_id == Some(pid) {
                debug!("[{}] Duplicate packet {}, skipping", self.name, pid);
                return None;
            }
            self.last_packet_id = Some(pid);
        }
        self.packets += 1;
        self.last_packet_at = Some(ts);

        Some(self.derive(reading, fallback_offset))
    }

    fn derive(&mut self, reading: DecodedReading, fallback_offset: UtcOffset) -> StationReport {
        let rain = reading
            .get("precipitation")
            .filter(|value| value.is_finite())
            .map(|precipitation| self.update_rain(reading.ts, precipitation, fallback_offset));

        // WS90 alternates wind and temperature packets, so fall back to the
        // last value seen for whichever one is missing
        if let Some(temperature) = reading.get("temperature") {
            self.last_temperature = Some(temperature);
        }
        if let Some(wind_speed) = reading.get("wind_speed") {
            self.last_wind_speed = Some(wind_speed);
        }

        StationReport {
            name: self.name.clone(),
            address: self.address.clone(),
            ts: reading.ts,
            rssi: reading.rssi,
            feels_like: feels_like(self.last_temperature, self.last_wind_speed),
            raining: reading.get("rain_status").map(|status| status == 1.0),
            rain,
            values: reading.fields.values,
        }
    }

    fn update_rain(&mut self, ts: i64, precipitation: f64, fallback_offset: UtcOffset) -> RainTotals {
        let previous = self.history.last_value();
        let outcome = self.history.ingest(ts, precipitation);

        if outcome.reset {
            warn!(
                "[{}] Rain counter reset detected ({:?} -> {}), clearing history",
                self.name, previous, precipitation
            );
        }
        if outcome.pruned > 0 {
            debug!("[{}] Pruned {} rain samples", self.name, outcome.pruned);
        }
        if outcome.changed() {
            self.history_dirty = true;
        }

        let offset = local_offset_at(ts, fallback_offset);
        let totals = RainTotals::compute(&self.history, ts, precipitation, offset);
        info!(
            "[{}] Rain: {:.1} mm last hour, {:.1} mm last 24h, {:.1} mm today ({} samples)",
            self.name,
            totals.last_hour,
            totals.last_24h,
            totals.today,
            self.history.len()
        );
        totals
    }
}
