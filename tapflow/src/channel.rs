use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Producer half of the event channel. Cheap to clone, one per source.
pub struct EventSender<T> {
    tx: Sender<T>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half of the event channel.
pub struct EventReceiver<T> {
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

/// Build a channel holding at most `capacity` undelivered events.
pub fn channel<T>(capacity: usize) -> (EventSender<T>, EventReceiver<T>) {
    let (tx, rx) = bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        EventSender {
            tx,
            dropped: Arc::clone(&dropped),
        },
        EventReceiver { rx, dropped },
    )
}

impl<T> EventSender<T> {
    /// Hand `event` to the consumer side. A full channel drops the event
    /// and counts it; the call never blocks the packet path.
    pub fn publish(&self, event: T) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Events lost to backpressure since the channel was built.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// Manual impl: derive would demand T: Clone.
impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> EventReceiver<T> {
    /// Next queued event, if any.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next event. Returns `None` once every sender is gone.
    /// Consumers live off the packet path and may block here.
    pub fn recv(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Events lost to backpressure since the channel was built.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
