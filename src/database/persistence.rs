/// Background writers for rain history snapshots and weather reports
///
/// The processing loop hands work over and moves on; one task per writer
/// performs the inserts in order. When several history snapshots for the
/// same station queue up while a write is in flight, only the newest is
/// written.
use log::{debug, error, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::database::connection::{DatabaseTarget, RetryPolicy};
use crate::database::operations::{save_rain_history, store_weather_report};
use crate::models::StationReport;
use crate::rain::HistoryEntry;

/// Reports waiting for the database beyond this are dropped
const REPORT_QUEUE_CAPACITY: usize = 256;

type Snapshot = (String, Vec<HistoryEntry>);

#[derive(Debug, Clone)]
pub struct HistoryWriter {
    tx: mpsc::UnboundedSender<Snapshot>,
}

impl HistoryWriter {
    /// Start the writer task. It exits once every `HistoryWriter` clone is
    /// dropped and the queue is flushed.
    pub fn spawn(target: DatabaseTarget, policy: RetryPolicy) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Snapshot>();

        let handle = tokio::spawn(async move {
            while let Some(first) = rx.recv().await {
                for (sensor_mac, entries) in drain_latest(first, &mut rx) {
                    match save_rain_history(&sensor_mac, &entries, &target, policy).await {
                        Ok(()) => debug!(
                            "Saved {} rain samples for {}",
                            entries.len(),
                            sensor_mac
                        ),
                        // In-memory history stays authoritative
                        Err(e) => error!("Failed to save rain history for {}: {}", sensor_mac, e),
                    }
                }
            }
        });

        (HistoryWriter { tx }, handle)
    }

    /// Queue a snapshot without waiting for it to be written
    pub fn save(&self, sensor_mac: &str, entries: Vec<HistoryEntry>) {
        if self.tx.send((sensor_mac.to_string(), entries)).is_err() {
            error!("Rain history writer has stopped, dropping update for {}", sensor_mac);
        }
    }
}

/// Writer for weather reports with a bounded queue
#[derive(Debug, Clone)]
pub struct ReportWriter {
    tx: mpsc::Sender<StationReport>,
}

impl ReportWriter {
    /// Start the writer task. It exits once every `ReportWriter` clone is
    /// dropped and the queue is flushed.
    pub fn spawn(target: DatabaseTarget, policy: RetryPolicy) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<StationReport>(REPORT_QUEUE_CAPACITY);

        let handle = tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                match store_weather_report(&report, &target, policy).await {
                    Ok(()) => debug!("Stored weather report for {}", report.name),
                    Err(e) => error!("Failed to store weather report for {}: {}", report.name, e),
                }
            }
        });

        (ReportWriter { tx }, handle)
    }

    /// Queue a report without waiting for it to be written
    ///
    /// # Returns
    /// `false` when the report was dropped because the queue is full or the
    /// writer has stopped
    pub fn store(&self, report: StationReport) -> bool {
        match self.tx.try_send(report) {
            Ok(()) => true,
            Err(TrySendError::Full(report)) => {
                warn!("Report queue full, dropping report for {}", report.name);
                false
            }
            Err(TrySendError::Closed(report)) => {
                error!("Report writer has stopped, dropping report for {}", report.name);
                false
            }
        }
    }
}

/// Take everything already queued and keep the newest snapshot per station
fn drain_latest(first: Snapshot, rx: &mut mpsc::UnboundedReceiver<Snapshot>) -> Vec<Snapshot> {
    let mut order = vec![first.0.clone()];
    let mut latest: HashMap<String, Vec<HistoryEntry>> = HashMap::from([first]);

    while let Ok((sensor_mac, entries)) = rx.try_recv() {
        if !latest.contains_key(&sensor_mac) {
            order.push(sensor_mac.clone());
        }
        latest.insert(sensor_mac, entries);
    }

    order
        .into_iter()
        .filter_map(|mac| latest.remove(&mac).map(|entries| (mac, entries)))
        .collect()
}
