//! # Delivery Engine
//!
//! Store-and-forward pipeline for one measurement at a time.
//!
//! ```text
//! Normalize -> Serialize -> AttemptSend --ok--> Delivered (+ opportunistic drain)
//!                               |
//!                             fail
//!                               v
//!                            Enqueue --ok--> QueuedForRetry
//!                               |
//!                             fail
//!                               v
//!                          HardFailure
//! ```
//!
//! Transport failures never escape this module; only a failed enqueue does,
//! because at that point the sample exists nowhere else.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, Result, TransportError};
use crate::measurement::{DeviceInfo, MeasurementRecord, Normalizer, Position, RadioSnapshot};
use crate::queue::{DrainReport, DurableQueue, SequenceKey};
use crate::transport::Transport;
use crate::wire;

/// Terminal state of one submission
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The collector accepted the record
    Delivered,
    /// The send failed; the payload is on disk under `entry`
    QueuedForRetry {
        entry: SequenceKey,
        reason: TransportError,
    },
    /// The send failed and the payload could not be queued either
    HardFailure(RelayError),
}

impl SubmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered)
    }
}

/// Orchestrates normalize, send, enqueue and drain
pub struct DeliveryEngine<T> {
    transport: T,
    queue: Arc<DurableQueue>,
    normalizer: Normalizer,
    send_timeout: Duration,
}

impl<T: Transport> DeliveryEngine<T> {
    /// Create an engine around an injected transport and queue
    ///
    /// # Arguments
    ///
    /// * `transport` - Collector channel
    /// * `queue` - Backlog for failed sends (shared with diagnostics readers)
    /// * `normalizer` - Builds records from raw snapshots
    /// * `send_timeout` - Upper bound on one send; exceeding it counts as failure
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use std::time::Duration;
    /// use cellprobe::delivery::DeliveryEngine;
    /// use cellprobe::measurement::Normalizer;
    /// use cellprobe::queue::DurableQueue;
    /// use cellprobe::transport::HttpTransport;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let timeout = Duration::from_secs(5);
    ///     let transport = HttpTransport::new("http://localhost:5000", None, timeout)?;
    ///     let queue = Arc::new(DurableQueue::open("./queue").await?);
    ///     let engine = DeliveryEngine::new(transport, queue, Normalizer::default(), timeout);
    ///     let report = engine.drain().await?;
    ///     println!("{} delivered", report.delivered);
    ///     Ok(())
    /// }
    /// ```
    pub fn new(
        transport: T,
        queue: Arc<DurableQueue>,
        normalizer: Normalizer,
        send_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            queue,
            normalizer,
            send_timeout,
        }
    }

    /// Queue handle, for the diagnostics read path
    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.queue
    }

    /// Normalize a raw snapshot and deliver it
    pub async fn submit(
        &self,
        snapshot: &RadioSnapshot,
        position: Option<Position>,
        device: &DeviceInfo,
    ) -> SubmitOutcome {
        let record = self.normalizer.normalize(snapshot, position, device);
        self.submit_record(&record).await
    }

    /// Deliver an already normalized record
    pub async fn submit_record(&self, record: &MeasurementRecord) -> SubmitOutcome {
        let payload = wire::to_bytes(&record.to_value());
        debug!(
            "Submitting {} record captured {} ({} bytes)",
            record.technology.as_str(),
            record.timestamp_rfc3339(),
            payload.len()
        );

        match self.attempt_send(payload.clone()).await {
            Ok(()) => {
                info!("Measurement delivered");
                self.drain_opportunistically().await;
                SubmitOutcome::Delivered
            }
            Err(reason) => {
                warn!("Send failed ({}), queuing for retry", reason);
                match self.queue.enqueue(payload).await {
                    Ok(entry) => {
                        info!("Measurement queued as {}", entry.sequence_key);
                        SubmitOutcome::QueuedForRetry {
                            entry: entry.sequence_key,
                            reason,
                        }
                    }
                    Err(e) => {
                        error!("Measurement could not be queued: {}", e);
                        SubmitOutcome::HardFailure(e)
                    }
                }
            }
        }
    }

    /// Run one drain pass through the transport
    ///
    /// Waits for any pass already in progress.
    ///
    /// # Errors
    ///
    /// Returns error only if the queue directory cannot be listed.
    pub async fn drain(&self) -> Result<DrainReport> {
        self.queue
            .drain(|payload| async move { self.attempt_send(payload).await.is_ok() })
            .await
    }

    /// The current send just worked, so the collector is probably reachable
    async fn drain_opportunistically(&self) {
        let pass = self
            .queue
            .try_drain(|payload| async move { self.attempt_send(payload).await.is_ok() })
            .await;

        match pass {
            Ok(Some(report)) if report.delivered > 0 || report.remaining > 0 => {
                debug!(
                    "Opportunistic drain: {} delivered, {} remaining",
                    report.delivered, report.remaining
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Opportunistic drain failed: {}", e),
        }
    }

    async fn attempt_send(&self, payload: Bytes) -> std::result::Result<(), TransportError> {
        match tokio::time::timeout(self.send_timeout, self.transport.send(payload)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}
