pub mod connection;
pub mod operations;
pub mod persistence;

pub use connection::{DatabaseTarget, RetryPolicy};
pub use operations::load_rain_history;
pub use persistence::{HistoryWriter, ReportWriter};
