//! Transport boundary
//!
//! The session never talks to sockets directly. Outbound bytes go through a
//! `Transport` implementation (fire-and-forget, per lane); inbound bytes are
//! pushed by the transport's receive callback into an `InboxSender` from
//! whatever thread it runs on, and the session drains the matching `Inbox`
//! at the start of each network tick.

use crate::Lane;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use thiserror::Error;

/// Outbound transport trait
///
/// Implementations own retransmission for `Lane::ReliableOrdered`; the
/// sync core never retries.
pub trait Transport: Send + Sync {
    /// Error type for this transport
    type Error: std::error::Error + Send + Sync + 'static;

    /// Send a datagram on a lane (fire-and-forget)
    fn send(&self, lane: Lane, data: &[u8]) -> Result<(), Self::Error>;

    /// Check if the transport is still connected
    fn is_connected(&self) -> bool;

    /// Close the transport and release its channels
    fn close(&self) -> Result<(), Self::Error>;
}

/// Create a connected inbox pair
pub fn inbox() -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::channel();
    (InboxSender(tx), Inbox(rx))
}

/// Producer side of an inbox; cheap to clone and `Send`
#[derive(Debug, Clone)]
pub struct InboxSender(Sender<Vec<u8>>);

impl InboxSender {
    /// Queue inbound bytes; returns false if the inbox was dropped
    pub fn push(&self, bytes: Vec<u8>) -> bool {
        self.0.send(bytes).is_ok()
    }
}

/// Consumer side of an inbox, owned by the session
#[derive(Debug)]
pub struct Inbox(Receiver<Vec<u8>>);

impl Inbox {
    /// Drain every datagram queued so far, without blocking
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.0.try_iter().collect()
    }
}

/// Loopback transport errors
#[derive(Debug, Error)]
pub enum LoopbackError {
    #[error("transport closed")]
    Closed,
    #[error("peer inbox dropped")]
    PeerGone,
}

/// In-process transport delivering straight into a peer's inbox
///
/// Can simulate loss on the unreliable lane by dropping every n-th datagram.
#[derive(Debug, Clone)]
pub struct LoopbackTransport {
    peer: InboxSender,
    closed: Arc<AtomicBool>,
    drop_every: Option<u64>,
    unreliable_sent: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl LoopbackTransport {
    /// Create a transport that delivers into `peer`
    pub fn new(peer: InboxSender) -> Self {
        Self {
            peer,
            closed: Arc::new(AtomicBool::new(false)),
            drop_every: None,
            unreliable_sent: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drop every `n`-th unreliable datagram
    pub fn with_unreliable_loss(mut self, every: u64) -> Self {
        self.drop_every = Some(every.max(1));
        self
    }

    /// Number of datagrams dropped by simulated loss
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Transport for LoopbackTransport {
    type Error = LoopbackError;

    fn send(&self, lane: Lane, data: &[u8]) -> Result<(), Self::Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoopbackError::Closed);
        }
        if lane == Lane::UnreliableUnordered {
            let n = self.unreliable_sent.fetch_add(1, Ordering::Relaxed) + 1;
            if self.drop_every.is_some_and(|every| n % every == 0) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }
        if self.peer.push(data.to_vec()) {
            Ok(())
        } else {
            Err(LoopbackError::PeerGone)
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<(), Self::Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
