//! Bounded handoff of detection frames from a producer thread to the single tracker owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;
use crate::frame::Frame;
use crate::track::Track;
use crate::Tracking;

/// What a full queue does with the next frame.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait until the consumer makes room.
    #[default]
    Block,
    /// Discard the frame being sent.
    DropNewest,
    /// Discard the oldest queued frame to make room.
    DropOldest,
}

/// Outcome of [`FrameProducer::send`]; dropped frames carry their index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    DroppedNewest(u64),
    DroppedOldest(u64),
}

#[derive(Clone)]
pub struct FrameProducer {
    tx: Sender<Frame>,
    // only kept for DropOldest, to evict from the front of the queue
    rx: Option<Receiver<Frame>>,
    closed: Arc<AtomicBool>,
    policy: OverflowPolicy,
}

pub struct FrameConsumer {
    rx: Receiver<Frame>,
    closed: Arc<AtomicBool>,
}

/// Creates a queue holding at most `capacity` frames.
pub fn frame_queue(capacity: usize, policy: OverflowPolicy) -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = bounded(capacity.max(1));
    let closed = Arc::new(AtomicBool::new(false));

    let producer = FrameProducer {
        tx,
        rx: match policy {
            OverflowPolicy::DropOldest => Some(rx.clone()),
            _ => None,
        },
        closed: closed.clone(),
        policy,
    };

    (producer, FrameConsumer { rx, closed })
}

impl FrameProducer {
    #[inline]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn send(&self, frame: Frame) -> Result<Delivery, Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Disconnected);
        }

        match (self.policy, &self.rx) {
            (OverflowPolicy::DropOldest, Some(rx)) => self.send_evicting(rx, frame),
            (OverflowPolicy::Block, _) => self
                .tx
                .send(frame)
                .map(|_| Delivery::Queued)
                .map_err(|_| Error::Disconnected),
            _ => match self.tx.try_send(frame) {
                Ok(()) => Ok(Delivery::Queued),
                Err(TrySendError::Full(frame)) => {
                    warn!(frame = frame.index, "frame queue full, dropping newest frame");
                    Ok(Delivery::DroppedNewest(frame.index))
                }
                Err(TrySendError::Disconnected(_)) => Err(Error::Disconnected),
            },
        }
    }

    fn send_evicting(&self, rx: &Receiver<Frame>, frame: Frame) -> Result<Delivery, Error> {
        let mut frame = frame;
        let mut dropped = None;

        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return Ok(dropped.map_or(Delivery::Queued, Delivery::DroppedOldest)),
                Err(TrySendError::Full(back)) => {
                    frame = back;

                    if let Ok(old) = rx.try_recv() {
                        warn!(frame = old.index, "frame queue full, dropping oldest frame");
                        dropped.get_or_insert(old.index);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return Err(Error::Disconnected),
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl FrameConsumer {
    /// Blocks for the next frame, fails once every producer is gone and the queue is drained.
    pub fn recv(&self) -> Result<Frame, Error> {
        self.rx.recv().map_err(|_| Error::Disconnected)
    }

    pub fn try_recv(&self) -> Result<Option<Frame>, Error> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::Disconnected),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Frame> + '_ {
        self.rx.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Drop for FrameConsumer {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Feeds every queued frame of `src` to `tracker` in arrival order and hands each snapshot
/// to `sink`.
///
/// Rejected frames are logged and skipped. Returns the number of processed frames once all
/// producers are dropped.
pub fn run<T, F>(consumer: FrameConsumer, tracker: &mut T, src: &str, mut sink: F) -> usize
where
    T: Tracking,
    F: FnMut(u64, Arc<[Track]>),
{
    let mut processed = 0;

    for frame in consumer.iter() {
        match tracker.update(src, &frame) {
            Ok(tracks) => {
                processed += 1;
                sink(frame.index, tracks);
            }
            Err(err) => warn!(src, frame = frame.index, "frame rejected: {}", err),
        }
    }

    debug!(src, processed, "frame queue drained");

    processed
}
