use std::collections::BTreeMap;

use crate::bthome::DecodedFields;
use crate::rain::RainTotals;

/// Raw BTHome service data captured from one station during a scan
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub address: String,
    pub payload: Vec<u8>,
    pub rssi: Option<i16>,
    /// Unix seconds when the payload was read
    pub received_at: i64,
}

/// One decoded advertisement, stamped on arrival
#[derive(Debug, Clone)]
pub struct DecodedReading {
    pub fields: DecodedFields,
    pub rssi: Option<i16>,
    pub ts: i64,
}

impl DecodedReading {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name)
    }

    pub fn packet_id(&self) -> Option<u8> {
        self.fields.packet_id()
    }
}

/// Everything derived from one accepted reading
#[derive(Debug, Clone)]
pub struct StationReport {
    pub name: String,
    pub address: String,
    pub ts: i64,
    pub rssi: Option<i16>,
    pub values: BTreeMap<String, f64>,
    pub rain: Option<RainTotals>,
    pub feels_like: Option<f64>,
    pub raining: Option<bool>,
}

impl StationReport {
    /// Flat name -> value mapping handed to the output sink
    pub fn fields(&self) -> BTreeMap<String, f64> {
        let mut fields = self.values.clone();
        fields.insert("ts".to_string(), self.ts as f64);
        if let Some(rssi) = self.rssi {
            fields.insert("rssi".to_string(), f64::from(rssi));
        }
        if let Some(rain) = self.rain {
            fields.insert("rain_hour".to_string(), rain.last_hour);
            fields.insert("rain_24h".to_string(), rain.last_24h);
            fields.insert("rain_today".to_string(), rain.today);
        }
        if let Some(feels_like) = self.feels_like {
            fields.insert("apparent_temperature".to_string(), feels_like);
        }
        fields
    }
}
