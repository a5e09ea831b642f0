//! Async owner for an [`AcknowledgementAggregator`].
//!
//! Acknowledgements may arrive from many tasks at once. They are funneled
//! through one channel into the task that owns the aggregator, which also
//! owns the deadline.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ack::acknowledgement::Acknowledgement;
use crate::ack::aggregated::Acknowledgements;
use crate::ack::aggregator::AcknowledgementAggregator;
use crate::core::Headers;
use crate::error::{Error, Result};

/// Cloneable handle used by collaborators to deliver acknowledgements.
#[derive(Debug, Clone)]
pub struct AckSender {
    tx: mpsc::UnboundedSender<Acknowledgement>,
}

impl AckSender {
    /// Deliver an acknowledgement. Fails once the collection has finished.
    pub fn send(&self, acknowledgement: Acknowledgement) -> Result<()> {
        self.tx
            .send(acknowledgement)
            .map_err(|_| Error::ReplyChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drives one aggregation to completion or to its deadline.
#[derive(Debug)]
pub struct AckCollector {
    aggregator: AcknowledgementAggregator,
    rx: mpsc::UnboundedReceiver<Acknowledgement>,
}

impl AckCollector {
    pub fn new(aggregator: AcknowledgementAggregator) -> (Self, AckSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { aggregator, rx }, AckSender { tx })
    }

    /// Wait for acknowledgements and build the result.
    ///
    /// Returns as soon as every requested label has been answered, when the
    /// aggregator's timeout elapses, or when every sender is dropped. In the
    /// latter two cases missing labels are reported by their placeholders.
    pub async fn collect(mut self, result_headers: &Headers) -> Result<Acknowledgements> {
        let deadline = tokio::time::sleep(self.aggregator.timeout());
        tokio::pin!(deadline);

        while !self.aggregator.all_received() {
            tokio::select! {
                received = self.rx.recv() => match received {
                    Some(ack) => {
                        self.aggregator.add_received(ack);
                    }
                    None => {
                        debug!(
                            correlation_id = %self.aggregator.correlation_id(),
                            pending = self.aggregator.pending_count(),
                            "all acknowledgement senders dropped"
                        );
                        break;
                    }
                },
                _ = &mut deadline => {
                    warn!(
                        correlation_id = %self.aggregator.correlation_id(),
                        entity_id = %self.aggregator.entity_id(),
                        pending = self.aggregator.pending_count(),
                        timeout = ?self.aggregator.timeout(),
                        "acknowledgement timeout reached"
                    );
                    break;
                }
            }
        }

        self.rx.close();
        let result = self.aggregator.build_result(result_headers)?;
        debug!(
            correlation_id = %self.aggregator.correlation_id(),
            successful = self.aggregator.is_successful(),
            status = %result.status(),
            "acknowledgements aggregated"
        );
        Ok(result)
    }
}
