pub mod aggregator;
pub mod history;

pub use aggregator::{local_offset_at, RainTotals};
pub use history::{HistoryEntry, HistoryStore};
