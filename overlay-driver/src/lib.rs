//! Workload generation and hop-statistics aggregation for the Chord/Pastry
//! overlay study platform — the thin layer that exercises `overlay-proto`
//! and reports what it measured. Carries no argument parsing, config-file
//! loading, or dataset ingestion; a workload is always built in code.

pub mod observer;
pub mod workload;

pub mod prelude {
    pub use crate::observer::{AggregationObserver, HopStatsCollector, OperationSummary};
    pub use crate::workload::{run_concurrent_lookups, run_sequential, Operation, Workload};
}
