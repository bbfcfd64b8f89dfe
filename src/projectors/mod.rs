//! Ready-made projections for hosts and tests.

mod collector;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
mod counts;
mod logging;

pub use collector::CollectorProjection;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub use counts::{EventTypeCounts, EVENT_TYPE_COUNTS_DDL};
pub use logging::LoggingProjection;
