/// Apparent ("feels like") temperature
use crate::utils::round_to_tenth;

/// Wind chill only applies above 1.3 m/s
const WIND_CHILL_MIN_KMH: f64 = 4.68;
/// and at or below 10 °C
const WIND_CHILL_MAX_TEMP_C: f64 = 10.0;

/// Apparent temperature in °C from air temperature (°C) and wind speed (m/s)
///
/// Uses the WMO / NOAA wind chill index when it applies, otherwise the air
/// temperature is returned unchanged. Missing or NaN inputs give `None`.
pub fn feels_like(temperature_c: Option<f64>, wind_speed_ms: Option<f64>) -> Option<f64> {
    let temperature = temperature_c.filter(|t| !t.is_nan())?;
    let wind_ms = wind_speed_ms.filter(|w| !w.is_nan())?;

    let wind_kmh = wind_ms * 3.6;
    if temperature <= WIND_CHILL_MAX_TEMP_C && wind_kmh > WIND_CHILL_MIN_KMH {
        let v = wind_kmh.powf(0.16);
        let chill = 13.12 + 0.6215 * temperature - 11.37 * v + 0.3965 * temperature * v;
        Some(round_to_tenth(chill))
    } else {
        Some(temperature)
    }
}
