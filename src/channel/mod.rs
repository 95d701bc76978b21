//! Single-producer/single-consumer links between node endpoints.
//!
//! A link is a tokio mpsc queue plus a callback slot shared by both ends.
//! The receiving end works either in polling mode (`recv`) or, after
//! [`Receiver::into_callback`], in callback mode where whoever drains the
//! queue (`dispatch`/`dispatch_next`) invokes the registered function.
//! The sending end can likewise become demand-driven with
//! [`Sender::into_callback`] and [`Sender::call_tx`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;

pub type ReceiveCallback<T> = Arc<dyn Fn(T) + Send + Sync>;
pub type ProduceCallback<T> = Arc<dyn Fn() -> T + Send + Sync>;

#[derive(Error)]
pub enum SendError<T> {
    #[error("receiving end of the channel is gone")]
    Disconnected(T),
    #[error("sender is in callback mode, use call_tx")]
    CallbackMode(T),
    #[error("sender has no production callback")]
    NoCallback,
}

impl<T> SendError<T> {
    /// Recover the value that could not be sent, if any.
    pub fn into_inner(self) -> Option<T> {
        match self {
            Self::Disconnected(v) | Self::CallbackMode(v) => Some(v),
            Self::NoCallback => None,
        }
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected(_) => f.write_str("Disconnected(..)"),
            Self::CallbackMode(_) => f.write_str("CallbackMode(..)"),
            Self::NoCallback => f.write_str("NoCallback"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    #[error("all senders of the channel are gone")]
    Disconnected,
    /// `recv` is inapplicable once the receiver delivers through a callback.
    #[error("receiver is in callback mode")]
    CallbackMode,
    #[error("receiver has no callback to dispatch to")]
    NoCallback,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("channel is empty")]
    Empty,
    #[error("all senders of the channel are gone")]
    Disconnected,
    #[error("receiver is in callback mode")]
    CallbackMode,
}

enum QueueTx<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

enum QueueRx<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

struct Shared<T> {
    receiver_callback: Mutex<Option<ReceiveCallback<T>>>,
}

impl<T> Shared<T> {
    fn receiver_callback(&self) -> MutexGuard<'_, Option<ReceiveCallback<T>>> {
        self.receiver_callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Create a linked pair. `None` gives an unbounded queue; a bounded queue holds at least one value.
pub fn new<T>(capacity: Option<usize>) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (QueueTx::Bounded(tx), QueueRx::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueTx::Unbounded(tx), QueueRx::Unbounded(rx))
        }
    };

    let shared = Arc::new(Shared {
        receiver_callback: Mutex::new(None),
    });

    (
        Sender {
            tx,
            shared: shared.clone(),
            callback: None,
        },
        Receiver {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            shared,
        },
    )
}

pub struct Sender<T> {
    tx: QueueTx<T>,
    shared: Arc<Shared<T>>,
    callback: Option<ProduceCallback<T>>,
}

impl<T: Send + 'static> Sender<T> {
    /// Enqueue `value`, waiting for room if the queue is bounded and full.
    pub async fn send(&self, value: T) -> Result<(), SendError<T>> {
        if self.callback.is_some() {
            return Err(SendError::CallbackMode(value));
        }
        self.enqueue(value).await
    }

    async fn enqueue(&self, value: T) -> Result<(), SendError<T>> {
        match &self.tx {
            QueueTx::Bounded(tx) => tx
                .send(value)
                .await
                .map_err(|e| SendError::Disconnected(e.0)),
            QueueTx::Unbounded(tx) => tx.send(value).map_err(|e| SendError::Disconnected(e.0)),
        }
    }

    /// Switch to demand-driven production. There is no way back.
    pub fn into_callback(&mut self, callback: impl Fn() -> T + Send + Sync + 'static) {
        self.callback = Some(Arc::new(callback));
    }

    pub fn is_callback_mode(&self) -> bool {
        self.callback.is_some()
    }

    /// Produce one value through the callback and hand it straight to the
    /// receiver's callback. A receiver still in polling mode gets it queued.
    pub async fn call_tx(&self) -> Result<(), SendError<T>> {
        let callback = self.callback.clone().ok_or(SendError::NoCallback)?;
        let value = callback();
        self.forward(value).await
    }

    /// Deliver through the receiver callback when there is one, otherwise enqueue.
    pub(crate) async fn forward(&self, value: T) -> Result<(), SendError<T>> {
        if self.is_closed() {
            return Err(SendError::Disconnected(value));
        }
        let receiver_callback = self.shared.receiver_callback().clone();
        match receiver_callback {
            Some(callback) => {
                callback(value);
                Ok(())
            }
            None => self.enqueue(value).await,
        }
    }

    /// True once the receiving end is dropped.
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            QueueTx::Bounded(tx) => tx.is_closed(),
            QueueTx::Unbounded(tx) => tx.is_closed(),
        }
    }
}

pub struct Receiver<T> {
    rx: Arc<tokio::sync::Mutex<QueueRx<T>>>,
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Receiver<T> {
    /// Wait for the next value. Returns [`RecvError::CallbackMode`] immediately
    /// once the receiver has been converted.
    pub async fn recv(&self) -> Result<T, RecvError> {
        if self.is_callback_mode() {
            return Err(RecvError::CallbackMode);
        }
        self.next().await
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        if self.is_callback_mode() {
            return Err(TryRecvError::CallbackMode);
        }
        self.try_next()
    }

    async fn next(&self) -> Result<T, RecvError> {
        let mut rx = self.rx.lock().await;
        let value = match &mut *rx {
            QueueRx::Bounded(rx) => rx.recv().await,
            QueueRx::Unbounded(rx) => rx.recv().await,
        };
        value.ok_or(RecvError::Disconnected)
    }

    fn try_next(&self) -> Result<T, TryRecvError> {
        let Ok(mut rx) = self.rx.try_lock() else {
            return Err(TryRecvError::Empty);
        };
        let value = match &mut *rx {
            QueueRx::Bounded(rx) => rx.try_recv(),
            QueueRx::Unbounded(rx) => rx.try_recv(),
        };
        value.map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
            mpsc::error::TryRecvError::Disconnected => TryRecvError::Disconnected,
        })
    }

    /// Switch to callback delivery. Converting again replaces the single
    /// callback slot, so a queued value is never delivered twice.
    pub fn into_callback(&self, callback: impl Fn(T) + Send + Sync + 'static) {
        *self.shared.receiver_callback() = Some(Arc::new(callback));
    }

    pub fn is_callback_mode(&self) -> bool {
        self.shared.receiver_callback().is_some()
    }

    /// Deliver every value currently queued to the callback. Returns how many were delivered.
    pub fn dispatch(&self) -> usize {
        let Some(callback) = self.shared.receiver_callback().clone() else {
            return 0;
        };
        let mut delivered = 0;
        while let Ok(value) = self.try_next() {
            callback(value);
            delivered += 1;
        }
        delivered
    }

    /// Wait for one value and deliver it to the callback.
    pub async fn dispatch_next(&self) -> Result<(), RecvError> {
        if !self.is_callback_mode() {
            return Err(RecvError::NoCallback);
        }
        let value = self.next().await?;
        let callback = self
            .shared
            .receiver_callback()
            .clone()
            .ok_or(RecvError::NoCallback)?;
        callback(value);
        Ok(())
    }

    /// Second handle on the same queue, used by the runner to drive callbacks.
    pub(crate) fn handle(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            shared: self.shared.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_fifo() {
        let (tx, rx) = new::<u32>(None);
        for i in 0..100 {
            tx.send(i).await.unwrap();
        }
        for i in 0..100 {
            assert_eq!(rx.recv().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn test_zero_capacity_acts_as_one() {
        let (tx, rx) = new::<u32>(Some(0));
        tx.send(1).await.unwrap();
        assert_eq!(rx.try_recv(), Ok(1));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_disconnected_both_ways() {
        let (tx, rx) = new::<u32>(Some(4));
        drop(rx);
        assert!(tx.is_closed());
        let err = tx.send(7).await.unwrap_err();
        assert_eq!(err.into_inner(), Some(7));

        let (tx, rx) = new::<u32>(Some(4));
        drop(tx);
        assert_eq!(rx.recv().await, Err(RecvError::Disconnected));
    }
}
