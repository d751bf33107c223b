//! Channel router
//!
//! Classifies outbound traffic onto the two lanes, batches medium and low
//! priority events until the next network tick, and filters duplicate
//! inbound events before queueing them for the host.

use crate::wire::{Message, MessageKind};
use crate::{Event, Lane, Priority, Transport};
use indexmap::IndexSet;
use slipstream_core::{EntityId, Millis};
use std::collections::VecDeque;

/// Result of handing an event to the router
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Sent right away, bypassing the queue
    Immediate,
    /// Appended to the outbound queue
    Queued,
    /// Appended after evicting a queued event to make room
    QueuedWithDrop(Event),
}

/// Connection-level notifications for the host
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The transport rejected a datagram; it is not retried
    SendFailed {
        kind: MessageKind,
        lane: Lane,
        reason: String,
    },
    /// The transport reports it is no longer connected
    Disconnected,
    /// The peer announced a quantization table different from the adopted one
    ThresholdMismatch,
    /// The local state no longer matches the declared channel layout;
    /// it is sent zero-filled or truncated until it matches again
    LayoutMismatch { reason: String },
}

/// Router counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub sent: u64,
    pub send_failures: u64,
    pub queued: u64,
    pub dropped_backpressure: u64,
    pub received: u64,
    pub duplicates: u64,
}

/// Outbound lane policy plus inbound dedup
pub struct ChannelRouter<T: Transport> {
    transport: T,
    outbound: VecDeque<Event>,
    inbound: VecDeque<Event>,
    seen: IndexSet<(EntityId, Millis)>,
    link_events: VecDeque<LinkEvent>,
    max_queue_size: usize,
    disconnect_reported: bool,
    stats: RouterStats,
}

impl<T: Transport> ChannelRouter<T> {
    /// Create a router over `transport`
    ///
    /// `max_queue_size` bounds both the outbound queue and the dedup set.
    pub fn new(transport: T, max_queue_size: usize) -> Self {
        let max_queue_size = max_queue_size.max(1);
        Self {
            transport,
            outbound: VecDeque::with_capacity(max_queue_size),
            inbound: VecDeque::new(),
            seen: IndexSet::with_capacity(max_queue_size),
            link_events: VecDeque::new(),
            max_queue_size,
            disconnect_reported: false,
            stats: RouterStats::default(),
        }
    }

    /// Send or queue an event according to its priority
    ///
    /// High priority goes out immediately. Everything else waits for
    /// `flush`; when the queue is full the oldest queued low-priority event
    /// is evicted, or the oldest event of any priority if none is low.
    pub fn send(&mut self, event: Event) -> SendOutcome {
        if event.priority == Priority::High {
            self.send_message(&Message::Event(event));
            return SendOutcome::Immediate;
        }

        let evicted = if self.outbound.len() >= self.max_queue_size {
            let victim = self
                .outbound
                .iter()
                .position(|queued| queued.priority == Priority::Low)
                .unwrap_or(0);
            self.outbound.remove(victim)
        } else {
            None
        };

        self.outbound.push_back(event);
        self.stats.queued += 1;

        match evicted {
            Some(dropped) => {
                self.stats.dropped_backpressure += 1;
                log::debug!(
                    "outbound queue full, dropped {:?} event from {} at {}",
                    dropped.kind(),
                    dropped.source,
                    dropped.timestamp
                );
                SendOutcome::QueuedWithDrop(dropped)
            }
            None => SendOutcome::Queued,
        }
    }

    /// Encode and send a message on its lane right away
    ///
    /// Returns whether the transport accepted it. Failures become
    /// `LinkEvent`s and are never retried.
    pub fn send_message(&mut self, message: &Message) -> bool {
        let lane = message.lane();
        let kind = message.kind();

        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(kind, lane, e.to_string());
                return false;
            }
        };

        match self.transport.send(lane, &bytes) {
            Ok(()) => {
                self.stats.sent += 1;
                true
            }
            Err(e) => {
                self.fail(kind, lane, e.to_string());
                self.check_connection();
                false
            }
        }
    }

    fn fail(&mut self, kind: MessageKind, lane: Lane, reason: String) {
        log::warn!("send of {:?} on {} lane failed: {}", kind, lane, reason);
        self.stats.send_failures += 1;
        self.link_events.push_back(LinkEvent::SendFailed { kind, lane, reason });
    }

    /// Send every queued event in FIFO order; returns how many were accepted
    pub fn flush(&mut self) -> usize {
        let mut accepted = 0;
        while let Some(event) = self.outbound.pop_front() {
            if self.send_message(&Message::Event(event)) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Accept an inbound event
    ///
    /// Returns false for a duplicate. The recently-seen set holds at most
    /// `max_queue_size` keys, oldest evicted first, so a duplicate arriving
    /// after that many newer events slips through.
    pub fn receive(&mut self, event: Event) -> bool {
        let key = (event.source, event.timestamp);
        if self.seen.contains(&key) {
            self.stats.duplicates += 1;
            log::trace!("duplicate event from {} at {}", event.source, event.timestamp);
            return false;
        }

        if self.seen.len() >= self.max_queue_size {
            self.seen.shift_remove_index(0);
        }
        self.seen.insert(key);
        self.stats.received += 1;
        self.inbound.push_back(event);
        true
    }

    /// Pop the next inbound event
    pub fn poll_event(&mut self) -> Option<Event> {
        self.inbound.pop_front()
    }

    /// Take every pending inbound event
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.inbound.drain(..).collect()
    }

    /// Queue a link event for the host
    pub fn push_link_event(&mut self, event: LinkEvent) {
        self.link_events.push_back(event);
    }

    /// Take every pending link event
    pub fn drain_link_events(&mut self) -> Vec<LinkEvent> {
        self.link_events.drain(..).collect()
    }

    /// Report a disconnect once if the transport has gone away
    ///
    /// Returns the transport's connection state.
    pub fn check_connection(&mut self) -> bool {
        let connected = self.transport.is_connected();
        if !connected && !self.disconnect_reported {
            self.disconnect_reported = true;
            log::warn!("transport disconnected");
            self.link_events.push_back(LinkEvent::Disconnected);
        }
        connected
    }

    /// Events waiting for the next flush
    pub fn queued(&self) -> impl Iterator<Item = &Event> {
        self.outbound.iter()
    }

    /// Number of events waiting for the next flush
    pub fn queue_len(&self) -> usize {
        self.outbound.len()
    }

    /// Get the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Drop all queued outbound events
    pub fn clear_queue(&mut self) {
        self.outbound.clear();
    }

    /// Close the underlying transport
    pub fn close(&mut self) -> Result<(), T::Error> {
        self.outbound.clear();
        self.transport.close()
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }
}

impl<T: Transport> std::fmt::Debug for ChannelRouter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRouter")
            .field("queued", &self.outbound.len())
            .field("inbound", &self.inbound.len())
            .field("max_queue_size", &self.max_queue_size)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{inbox, Inbox};
    use crate::{EventPayload, LoopbackTransport};

    fn router(capacity: usize) -> (ChannelRouter<LoopbackTransport>, Inbox) {
        let (tx, rx) = inbox();
        (ChannelRouter::new(LoopbackTransport::new(tx), capacity), rx)
    }

    fn pickup(t: Millis) -> Event {
        Event::new(EntityId(1), t, EventPayload::Pickup { item_id: t as u32 })
    }

    fn chat(t: Millis) -> Event {
        Event::new(EntityId(1), t, EventPayload::Chat { text: format!("gg {t}") })
    }

    fn delivered(rx: &Inbox) -> Vec<Message> {
        rx.drain()
            .iter()
            .map(|bytes| Message::decode(bytes).unwrap())
            .collect()
    }

    #[test]
    fn test_high_priority_bypasses_queue() {
        let (mut router, rx) = router(4);
        let impact = Event::new(
            EntityId(1),
            10,
            EventPayload::Impact {
                other: EntityId(2),
                impulse: Default::default(),
            },
        );
        assert_eq!(router.send(impact.clone()), SendOutcome::Immediate);
        assert_eq!(router.queue_len(), 0);
        assert_eq!(delivered(&rx), vec![Message::Event(impact)]);
    }

    #[test]
    fn test_queue_flushes_fifo() {
        let (mut router, rx) = router(4);
        router.send(pickup(1));
        router.send(chat(2));
        router.send(pickup(3));
        assert!(rx.drain().is_empty());

        assert_eq!(router.flush(), 3);
        let timestamps: Vec<_> = delivered(&rx)
            .into_iter()
            .map(|m| match m {
                Message::Event(e) => e.timestamp,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(timestamps, vec![1, 2, 3]);
    }

    #[test]
    fn test_backpressure_prefers_low_priority() {
        let (mut router, _rx) = router(3);
        router.send(pickup(1));
        router.send(chat(2));
        router.send(pickup(3));

        match router.send(pickup(4)) {
            SendOutcome::QueuedWithDrop(dropped) => assert_eq!(dropped.timestamp, 2),
            other => panic!("expected drop, got {other:?}"),
        }
        let queued: Vec<_> = router.queued().map(|e| e.timestamp).collect();
        assert_eq!(queued, vec![1, 3, 4]);
        assert_eq!(router.stats().dropped_backpressure, 1);
    }

    #[test]
    fn test_receive_dedups() {
        let (mut router, _rx) = router(4);
        assert!(router.receive(chat(5)));
        assert!(!router.receive(chat(5)));
        // Same timestamp from another source is a different event
        assert!(router.receive(Event::new(EntityId(2), 5, EventPayload::Pickup { item_id: 1 })));

        assert_eq!(router.drain_events().len(), 2);
        assert_eq!(router.stats().duplicates, 1);
    }

    #[test]
    fn test_dedup_set_is_bounded() {
        let (mut router, _rx) = router(2);
        assert!(router.receive(chat(1)));
        assert!(router.receive(chat(2)));
        assert!(router.receive(chat(3)));
        // Key for t=1 was evicted
        assert!(router.receive(chat(1)));
        assert!(!router.receive(chat(3)));
    }

    #[test]
    fn test_send_failure_becomes_link_event() {
        let (mut router, _rx) = router(4);
        router.transport().close().unwrap();

        assert!(!router.send_message(&Message::Ping { timestamp: 1 }));
        let events = router.drain_link_events();
        assert!(matches!(
            events[0],
            LinkEvent::SendFailed {
                kind: MessageKind::Ping,
                lane: Lane::UnreliableUnordered,
                ..
            }
        ));
        assert_eq!(events[1], LinkEvent::Disconnected);

        // Disconnect is reported once
        router.send_message(&Message::Ping { timestamp: 2 });
        assert_eq!(router.drain_link_events().len(), 1);
    }
}
