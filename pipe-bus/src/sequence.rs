use std::{
    pin::Pin,
    sync::{Arc, OnceLock},
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::error::{PipeError, PipeResult};

struct Envelope<T> {
    value: T,
    ack: Option<oneshot::Sender<()>>,
}

/// Creates a sequence. `capacity == 0` gives rendezvous semantics: `send`
/// returns only once the consumer has taken the item.
pub fn channel<T>(capacity: usize) -> (SequenceSender<T>, Sequence<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let fault = Arc::new(OnceLock::new());
    (
        SequenceSender {
            tx,
            fault: Arc::clone(&fault),
            rendezvous: capacity == 0,
        },
        Sequence {
            rx,
            fault,
            done: false,
        },
    )
}

/// Producing end of a [`Sequence`].
///
/// The sequence completes when the last sender is dropped. If any sender was
/// consumed by [`SequenceSender::close_with`], completion carries that fault.
pub struct SequenceSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
    fault: Arc<OnceLock<PipeError>>,
    rendezvous: bool,
}

impl<T> Clone for SequenceSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            fault: Arc::clone(&self.fault),
            rendezvous: self.rendezvous,
        }
    }
}

impl<T> SequenceSender<T> {
    /// Hands `value` to the consumer. Fails with [`PipeError::Disconnected`]
    /// once the consumer is gone.
    pub async fn send(&self, value: T) -> PipeResult<()> {
        if !self.rendezvous {
            return self
                .tx
                .send(Envelope { value, ack: None })
                .await
                .map_err(|_| PipeError::Disconnected);
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                value,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| PipeError::Disconnected)?;
        ack_rx.await.map_err(|_| PipeError::Disconnected)
    }

    /// Drops this sender and marks the sequence as faulted. The consumer sees
    /// `fault` after the remaining items, once every sender is gone. The first
    /// fault wins. Never blocks.
    pub fn close_with(self, fault: PipeError) {
        if let Err(fault) = self.fault.set(fault) {
            log::trace!("sequence already faulted, dropping {}", fault);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the consumer has dropped its end.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Ordered, finite, single-consumer stream of items.
///
/// `recv` yields `Some(Ok(item))` per item, `Some(Err(fault))` at most once
/// as the last item of a faulted sequence, then `None` forever.
pub struct Sequence<T> {
    rx: mpsc::Receiver<Envelope<T>>,
    fault: Arc<OnceLock<PipeError>>,
    done: bool,
}

impl<T> Sequence<T> {
    pub async fn recv(&mut self) -> Option<PipeResult<T>> {
        if self.done {
            return None;
        }
        let envelope = self.rx.recv().await;
        self.open(envelope)
    }

    /// Blocking variant of [`Sequence::recv`] for consumers outside the
    /// runtime. Panics if called from within an async context.
    pub fn blocking_recv(&mut self) -> Option<PipeResult<T>> {
        if self.done {
            return None;
        }
        let envelope = self.rx.blocking_recv();
        self.open(envelope)
    }

    /// Collects every remaining item. Returns the fault if the sequence
    /// ended with one.
    pub async fn drain(mut self) -> PipeResult<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.recv().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// True once completion (clean or faulted) has been observed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Wraps this sequence so several consumers can pull from it.
    pub fn share(self) -> SharedSequence<T> {
        SharedSequence {
            inner: Arc::new(Mutex::new(self)),
        }
    }

    fn open(&mut self, envelope: Option<Envelope<T>>) -> Option<PipeResult<T>> {
        match envelope {
            Some(Envelope { value, ack }) => {
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
                Some(Ok(value))
            }
            None => {
                self.done = true;
                self.fault.get().cloned().map(Err)
            }
        }
    }
}

impl<T> Stream for Sequence<T> {
    type Item = PipeResult<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        this.rx.poll_recv(cx).map(|envelope| this.open(envelope))
    }
}

/// A [`Sequence`] shared by several consumers. Each item is delivered to
/// exactly one of them.
pub struct SharedSequence<T> {
    inner: Arc<Mutex<Sequence<T>>>,
}

impl<T> Clone for SharedSequence<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedSequence<T> {
    pub async fn recv(&self) -> Option<PipeResult<T>> {
        self.inner.lock().await.recv().await
    }
}

/// Anything a stage can pull its input from.
#[async_trait]
pub trait Inlet: Send {
    type Item: Send;

    async fn pull(&mut self) -> Option<PipeResult<Self::Item>>;
}

#[async_trait]
impl<T: Send> Inlet for Sequence<T> {
    type Item = T;

    async fn pull(&mut self) -> Option<PipeResult<T>> {
        self.recv().await
    }
}

#[async_trait]
impl<T: Send> Inlet for SharedSequence<T> {
    type Item = T;

    async fn pull(&mut self) -> Option<PipeResult<T>> {
        self.recv().await
    }
}

#[cfg(test)]
#[path = "sequence_test.rs"]
mod sequence_test;
