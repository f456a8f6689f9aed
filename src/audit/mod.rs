//! Security event logging and aggregation.
//!
//! The guard hands every security event to its sinks; the aggregator
//! turns a recorded event list into report statistics.

pub mod aggregator;
pub mod log;

pub use aggregator::*;
pub use log::{EventLog, EventSink, TracingSink};
