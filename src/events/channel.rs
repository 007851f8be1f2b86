//! # Event Channel
//!
//! FIFO fan-in between producers (RPC handler, queue subscriber) and a single
//! consumer. A capacity of zero selects an unbounded channel; otherwise sends
//! wait for capacity.

use tokio::sync::mpsc;

use crate::models::{EventOutcome, EventRequest};

/// Returned when every receiver has been dropped; carries the unsent value
#[derive(Debug, thiserror::Error)]
#[error("Channel is closed")]
pub struct ChannelClosed<T>(pub T);

impl<T> ChannelClosed<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[derive(Debug)]
pub enum Sender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

impl<T> Sender<T> {
    /// Send a value, waiting for capacity on a bounded channel
    pub async fn send(&self, value: T) -> Result<(), ChannelClosed<T>> {
        match self {
            Self::Bounded(tx) => tx.send(value).await.map_err(|e| ChannelClosed(e.0)),
            Self::Unbounded(tx) => tx.send(value).map_err(|e| ChannelClosed(e.0)),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(tx) => tx.is_closed(),
            Self::Unbounded(tx) => tx.is_closed(),
        }
    }

    /// `None` for unbounded channels
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Bounded(tx) => Some(tx.max_capacity()),
            Self::Unbounded(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum Receiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> Receiver<T> {
    /// Next value in FIFO order; `None` once all senders are gone and the
    /// buffer is drained
    pub async fn recv(&mut self) -> Option<T> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Create a channel; `capacity == 0` means unbounded
///
/// ```rust
/// use statemachine::events::channel;
///
/// # tokio_test::block_on(async {
/// let (tx, mut rx) = channel::<u32>(0);
/// tx.send(1).await.unwrap();
/// tx.send(2).await.unwrap();
/// drop(tx);
///
/// assert_eq!(rx.recv().await, Some(1));
/// assert_eq!(rx.recv().await, Some(2));
/// assert_eq!(rx.recv().await, None);
/// # });
/// ```
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    if capacity == 0 {
        let (tx, rx) = mpsc::unbounded_channel();
        (Sender::Unbounded(tx), Receiver::Unbounded(rx))
    } else {
        let (tx, rx) = mpsc::channel(capacity);
        (Sender::Bounded(tx), Receiver::Bounded(rx))
    }
}

/// Ingress requests bound for the listener
pub type EventSender = Sender<EventRequest>;
pub type EventReceiver = Receiver<EventRequest>;

/// Non-Ok outcomes bound for the error publisher
pub type NotificationSender = Sender<EventOutcome>;
pub type NotificationReceiver = Receiver<EventOutcome>;
