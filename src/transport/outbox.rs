//! Per-connection ordered outbound channel.
//!
//! Every byte a connection sends goes through its [`Outbox`]: handshake replies from the
//! session, arena flushes from the tick scheduler. The connection task owns the matching
//! [`OutboxReceiver`] and writes chunks to the socket in the order they were sent, one socket
//! write per chunk.

use crate::error::{ProtocolError, Result};
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Bytes>,
    overflow: CancellationToken,
}

#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::Receiver<Bytes>,
    overflow: CancellationToken,
}

/// Create an outbox holding at most `capacity` unwritten chunks.
///
/// A send into a full outbox fails with [`ProtocolError::OutboxFull`] and trips the receiver's
/// overflow signal; the connection owning the receiver is expected to close.
pub fn channel(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let overflow = CancellationToken::new();
    (
        Outbox {
            tx,
            overflow: overflow.clone(),
        },
        OutboxReceiver { rx, overflow },
    )
}

impl Outbox {
    /// Queue one chunk for the socket. Empty chunks are ignored.
    pub fn send(&self, chunk: impl Into<Bytes>) -> Result<()> {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return Ok(());
        }
        match self.tx.try_send(chunk) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                if !self.overflow.is_cancelled() {
                    warn!(capacity = self.tx.max_capacity(), "Outbox full, peer is not reading");
                    self.overflow.cancel();
                }
                Err(ProtocolError::OutboxFull)
            }
            Err(TrySendError::Closed(_)) => Err(ProtocolError::ConnectionClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl OutboxReceiver {
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Next chunk if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Refuse further chunks; already queued ones can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Signal tripped by the first send that found the outbox full.
    pub fn overflow(&self) -> CancellationToken {
        self.overflow.clone()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn chunks_arrive_in_order() {
        let (outbox, mut rx) = channel(4);
        outbox.send(vec![1]).unwrap();
        outbox.send(Vec::new()).unwrap();
        outbox.send(Bytes::from_static(&[2, 3])).unwrap();

        assert_eq!(rx.try_recv().unwrap().as_ref(), &[1]);
        assert_eq!(rx.try_recv().unwrap().as_ref(), &[2, 3]);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn closed_receiver_rejects_sends() {
        let (outbox, mut rx) = channel(4);
        rx.close();
        assert!(outbox.is_closed());
        assert!(matches!(
            outbox.send(vec![1]),
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[test]
    fn full_outbox_trips_overflow() {
        let (outbox, mut rx) = channel(2);
        let overflow = rx.overflow();
        outbox.send(vec![1]).unwrap();
        outbox.send(vec![2]).unwrap();
        assert!(!overflow.is_cancelled());

        assert!(matches!(outbox.send(vec![3]), Err(ProtocolError::OutboxFull)));
        assert!(overflow.is_cancelled());

        // Draining makes room again, but the signal stays tripped.
        assert_eq!(rx.try_recv().unwrap().as_ref(), &[1]);
        outbox.send(vec![4]).unwrap();
        assert!(rx.overflow().is_cancelled());
    }
}
