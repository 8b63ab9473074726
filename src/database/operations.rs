/// Database operations for rain history and weather reports
use time::OffsetDateTime;
use tokio_postgres::types::Json;

use crate::database::connection::{with_retry, DatabaseTarget, RetryPolicy};
use crate::error::DatabaseError;
use crate::models::StationReport;
use crate::rain::HistoryEntry;

/// Load the persisted rain history blob for one station
///
/// A station that has never been stored yields an empty history.
///
/// # Arguments
/// * `sensor_mac` - Upper-case MAC address used as the row key
/// * `target` - Database to read from
/// * `policy` - How often to retry the connection
///
/// # Returns
/// The stored entries, `RetriesExhausted` when the database could not be
/// reached, or `InvalidHistory` when the blob does not parse
pub async fn load_rain_history(
    sensor_mac: &str,
    target: &DatabaseTarget,
    policy: RetryPolicy,
) -> Result<Vec<HistoryEntry>, DatabaseError> {
    let blob = with_retry(target, policy, |client| async move {
        let row = client
            .query_opt(
                "SELECT entries FROM rain_history WHERE sensor_mac = $1",
                &[&sensor_mac],
            )
            .await?;
        Ok::<_, tokio_postgres::Error>(row.map(|row| row.get::<_, serde_json::Value>(0)))
    })
    .await?;

    match blob {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(Vec::new()),
    }
}

/// Replace the stored rain history blob for one station
pub async fn save_rain_history(
    sensor_mac: &str,
    entries: &[HistoryEntry],
    target: &DatabaseTarget,
    policy: RetryPolicy,
) -> Result<(), DatabaseError> {
    with_retry(target, policy, |client| async move {
        client
            .execute(
                "INSERT INTO rain_history(sensor_mac, entries, updated_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (sensor_mac)
                 DO UPDATE SET entries = EXCLUDED.entries, updated_at = EXCLUDED.updated_at",
                &[&sensor_mac, &Json(entries)],
            )
            .await
    })
    .await?;
    Ok(())
}

/// Store one derived weather report in the weather_data table
pub async fn store_weather_report(
    report: &StationReport,
    target: &DatabaseTarget,
    policy: RetryPolicy,
) -> Result<(), DatabaseError> {
    let recorded_at = OffsetDateTime::from_unix_timestamp(report.ts)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    let fields = report.fields();

    with_retry(target, policy, |client| {
        let fields = &fields;
        async move {
            client
                .execute(
                    "INSERT INTO weather_data(sensor_mac, name, time, payload)
                     VALUES ($1, $2, $3, $4)",
                    &[&report.address, &report.name, &recorded_at, &Json(fields)],
                )
                .await
        }
    })
    .await?;
    Ok(())
}
