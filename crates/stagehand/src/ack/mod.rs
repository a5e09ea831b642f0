//! Acknowledgement model, aggregation and collection.

mod acknowledgement;
mod aggregated;
mod aggregator;
mod collector;
mod filter;
mod label;

pub use acknowledgement::{Acknowledgement, TIMEOUT_ERROR_CODE};
pub use aggregated::Acknowledgements;
pub use aggregator::AcknowledgementAggregator;
pub use collector::{AckCollector, AckSender};
pub use filter::{HeaderFilter, InternalHeaderFilter, PassThrough, DEFAULT_INTERNAL_PREFIX};
pub use label::{AcknowledgementLabel, AcknowledgementRequest};
