#![forbid(unsafe_code)]

mod aggregator;
mod histogram;
mod sample;
mod snapshot;

pub use aggregator::Aggregator;
pub use histogram::HistogramSummary;
pub use sample::{CheckOutcome, IterationResult};
pub use snapshot::{CheckSummary, MetricKind, MetricsSnapshot};
