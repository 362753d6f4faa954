//! Bounded hand-off queue between the capture and recognition stages.
//!
//! Capacity is fixed at construction. When the queue is full the configured
//! [`QueuePolicy`] decides whether the producer waits for the consumer or
//! evicts the oldest pending segment to make room for the newest.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::QueuePolicy;
use crate::pipeline::messages::AudioSegment;

use std::time::Duration;

const SEND_POLL: Duration = Duration::from_millis(100);

/// Result of offering a segment to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The segment was enqueued.
    Sent,
    /// The oldest pending segment was evicted to make room.
    SentAfterEvict,
    /// Shutdown was requested while waiting for space.
    Cancelled,
}

/// Producer half of the segment queue.
///
/// Holds its own receiver clone so the drop-oldest policy can evict without
/// involving the consumer.
pub struct SegmentSender {
    tx: Sender<AudioSegment>,
    rx: Receiver<AudioSegment>,
    policy: QueuePolicy,
}

/// Creates a bounded segment queue with the given capacity and policy.
pub fn segment_queue(
    capacity: usize,
    policy: QueuePolicy,
) -> (SegmentSender, Receiver<AudioSegment>) {
    let (tx, rx) = bounded(capacity.max(1));
    let sender = SegmentSender {
        tx,
        rx: rx.clone(),
        policy,
    };
    (sender, rx)
}

impl SegmentSender {
    /// Offers a segment, blocking only under [`QueuePolicy::Block`].
    ///
    /// A blocked send polls the cancellation token so shutdown never waits
    /// on a stalled consumer.
    pub fn send(&self, mut segment: AudioSegment, cancel: &CancellationToken) -> SendOutcome {
        match self.policy {
            QueuePolicy::Block => loop {
                if cancel.is_cancelled() {
                    return SendOutcome::Cancelled;
                }
                match self.tx.send_timeout(segment, SEND_POLL) {
                    Ok(()) => return SendOutcome::Sent,
                    Err(crossbeam_channel::SendTimeoutError::Timeout(back)) => segment = back,
                    Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => {
                        return SendOutcome::Cancelled
                    }
                }
            },
            QueuePolicy::DropOldest => {
                let mut evicted = false;
                loop {
                    match self.tx.try_send(segment) {
                        Ok(()) => {
                            return if evicted {
                                SendOutcome::SentAfterEvict
                            } else {
                                SendOutcome::Sent
                            }
                        }
                        Err(TrySendError::Full(back)) => {
                            if self.rx.try_recv().is_ok() {
                                evicted = true;
                                warn!("segment queue full, dropped oldest pending segment");
                            }
                            segment = back;
                            if cancel.is_cancelled() {
                                return SendOutcome::Cancelled;
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return SendOutcome::Cancelled,
                    }
                }
            }
        }
    }
}
