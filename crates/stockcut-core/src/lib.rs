//! One-dimensional cutting-stock optimizer.
//!
//! Assigns a demand of piece widths onto fixed-width stock sheets using
//! best-fit over several piece orderings, or a single first-fit-decreasing
//! pass. Results are memoized in a [`HistoryStore`] keyed by a canonical
//! signature of the demand and algorithm.

pub mod demand;
pub mod history;
mod optimizer;
pub mod order;
pub mod report;
pub mod types;

pub use demand::Demand;
pub use history::{HistoryRecord, HistoryStore, JsonFileStore, MemoryStore};
pub use optimizer::*;
pub use order::OrderLine;
pub use report::ReportOptions;
pub use types::*;
