//! Per-connection synchronization session
//!
//! A `SyncSession` owns everything one participant needs: the local
//! predictor and its reconciler, one snapshot history per remote entity,
//! the channel router and the connection monitor. There is no global
//! state; the host constructs one session per connection and drives it
//! from two cadences:
//!
//! - the network tick (`network_tick`), at `tick_rate_hz`
//! - the render tick (`render` / `resolve`), once per frame
//!
//! Inbound datagrams are queued in an `Inbox` by the transport and only
//! applied at the start of a network tick.

use crate::codec::Codec;
use crate::monitor::{ConnectionMonitor, ConnectionStats};
use crate::prediction::LocalPredictor;
use crate::reconciliation::{Correction, ReconcileOutcome, ReconcileStats, Reconciler};
use crate::resolver::{Pose, PoseSource, RemoteStateResolver};
use crate::router::{ChannelRouter, LinkEvent, RouterStats, SendOutcome};
use crate::transport::{Inbox, Transport};
use crate::wire::Message;
use crate::{Error, Event, Result};
use indexmap::IndexMap;
use slipstream_core::{
    Cadence, EntityId, EntityState, Millis, Snapshot, StepFunction, SyncConfig,
};

/// Aggregated session counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub connection: ConnectionStats,
    pub router: RouterStats,
    pub reconcile: ReconcileStats,
    /// Local inputs not yet acknowledged
    pub pending_inputs: usize,
    /// Local inputs evicted because the log was full
    pub input_overflow: u64,
    /// Remote entities with at least one sample
    pub remote_entities: usize,
    /// Inbound datagrams dropped as undecodable
    pub undecodable: u64,
    /// Remote samples dropped as out of order
    pub stale_samples: u64,
    /// Whether the peer's quantization table has arrived
    pub handshake_complete: bool,
}

/// Synchronization session for one connection
///
/// Generic over the input type `I`, the step function `S` and the
/// transport `T`.
pub struct SyncSession<I, S, T: Transport> {
    config: SyncConfig,
    codec: Codec,
    peer_codec: Option<Codec>,
    predictor: LocalPredictor<I, S>,
    reconciler: Reconciler,
    pending_correction: Option<Correction>,
    resolver: RemoteStateResolver,
    router: ChannelRouter<T>,
    monitor: ConnectionMonitor,
    inbox: Inbox,
    cadence: Cadence,
    /// Local-clock offset per remote entity, anchored at first receipt
    clock_offsets: IndexMap<EntityId, i64>,
    /// Newest sender timestamp and input sequence per remote entity
    remote_progress: IndexMap<EntityId, (Millis, u64)>,
    undecodable: u64,
    stale_samples: u64,
    /// Set while the local state deviates from the declared channel layout
    layout_mismatch: bool,
    closed: bool,
}

impl<I, S, T> SyncSession<I, S, T>
where
    S: StepFunction<I>,
    T: Transport,
{
    /// Open a session
    ///
    /// Validates `config` and the channel layout of `initial`, builds the
    /// codec and announces the quantization table to the peer on the
    /// reliable lane.
    pub fn open(
        config: SyncConfig,
        local_id: EntityId,
        initial: EntityState,
        step: S,
        transport: T,
        inbox: Inbox,
    ) -> Result<Self> {
        config.validate()?;
        let codec = Codec::new(&config)?;
        codec.check_layout(&initial)?;
        let resolver = RemoteStateResolver::from_config(&config)?;

        let mut session = Self {
            codec,
            peer_codec: None,
            predictor: LocalPredictor::new(local_id, initial, step, config.input_log_capacity),
            reconciler: Reconciler::new(config.divergence_tolerance),
            pending_correction: None,
            resolver,
            router: ChannelRouter::new(transport, config.max_queue_size),
            monitor: ConnectionMonitor::new(&config),
            inbox,
            cadence: Cadence::from_hz(config.tick_rate_hz),
            clock_offsets: IndexMap::new(),
            remote_progress: IndexMap::new(),
            undecodable: 0,
            stale_samples: 0,
            layout_mismatch: false,
            closed: false,
            config,
        };

        let handshake = Message::Thresholds(session.codec.table().clone());
        session.router.send_message(&handshake);
        log::info!(
            "session opened for {} at {} Hz ({} channels)",
            local_id,
            session.config.tick_rate_hz,
            session.config.channels.len()
        );
        Ok(session)
    }

    /// Run one network tick
    ///
    /// Applies queued inbound traffic and the newest pending correction,
    /// predicts the local entity, sends its state, pings the peer when due
    /// and flushes the event queue. Returns the local pose for rendering.
    pub fn network_tick(&mut self, input: I, dt: f32, now: Millis) -> Result<Pose> {
        if self.closed {
            return Err(Error::SessionClosed);
        }

        for datagram in self.inbox.drain() {
            self.handle_datagram(&datagram, now);
        }

        if let Some(correction) = self.pending_correction.take() {
            if let ReconcileOutcome::Applied { replayed, .. } =
                self.reconciler.reconcile(&mut self.predictor, correction)
            {
                log::trace!("reconciled, replayed {} inputs", replayed);
            }
        }

        self.predictor.tick(input, dt, now);
        self.check_local_layout();

        let state = Message::State {
            entity_id: self.predictor.entity_id(),
            timestamp: now,
            sequence: self.predictor.newest_sequence().unwrap_or(0),
            state: self.codec.quantize(self.predictor.state()),
        };
        self.router.send_message(&state);

        if let Some(sent) = self.monitor.ping_due(now) {
            self.router.send_message(&Message::Ping { timestamp: sent });
        }

        self.router.flush();
        self.router.check_connection();

        Ok(self.local_pose(now))
    }

    fn check_local_layout(&mut self) {
        match self.codec.check_layout(self.predictor.state()) {
            Ok(()) => self.layout_mismatch = false,
            Err(e) if !self.layout_mismatch => {
                self.layout_mismatch = true;
                log::warn!("local state does not match the channel layout: {}", e);
                self.router.push_link_event(LinkEvent::LayoutMismatch {
                    reason: e.to_string(),
                });
            }
            Err(_) => {}
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], now: Millis) {
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                self.undecodable += 1;
                log::debug!("dropping undecodable datagram ({} bytes): {}", bytes.len(), e);
                return;
            }
        };

        match message {
            Message::Thresholds(table) => match &self.peer_codec {
                None => {
                    log::info!("adopted peer quantization table ({} channels)", table.channels.len());
                    self.peer_codec = Some(Codec::from_table(table));
                }
                Some(adopted) if adopted.table() == &table => {}
                Some(_) => {
                    log::warn!("peer announced a different quantization table; keeping the first");
                    self.router.push_link_event(LinkEvent::ThresholdMismatch);
                }
            },
            Message::State {
                entity_id,
                timestamp,
                sequence,
                state,
            } => {
                if entity_id == self.predictor.entity_id() {
                    log::debug!("ignoring echoed state for local {}", entity_id);
                    return;
                }
                let Some(state) = self.decode_remote(&state) else {
                    return;
                };
                self.ingest_remote(entity_id, timestamp, sequence, state, now);
            }
            Message::Event(event) => {
                self.router.receive(event);
            }
            Message::Ping { timestamp } => {
                self.router.send_message(&Message::Pong { timestamp });
            }
            Message::Pong { timestamp } => {
                self.monitor.on_pong(timestamp, now);
            }
            Message::Correction {
                entity_id,
                last_processed,
                state,
            } => {
                if entity_id != self.predictor.entity_id() {
                    log::debug!("ignoring correction addressed to {}", entity_id);
                    return;
                }
                let Some(state) = self.decode_remote(&state) else {
                    return;
                };
                // Only the newest correction matters
                if self
                    .pending_correction
                    .as_ref()
                    .map_or(true, |pending| last_processed > pending.last_processed)
                {
                    self.pending_correction = Some(Correction::new(last_processed, state));
                }
            }
        }
    }

    fn decode_remote(&mut self, compact: &crate::CompactState) -> Option<EntityState> {
        let Some(codec) = &self.peer_codec else {
            self.undecodable += 1;
            log::debug!("dropping state received before the quantization table");
            return None;
        };
        match codec.dequantize(compact) {
            Ok(state) => Some(state),
            Err(e) => {
                self.undecodable += 1;
                log::debug!("dropping undecodable state: {}", e);
                None
            }
        }
    }

    fn ingest_remote(
        &mut self,
        entity_id: EntityId,
        timestamp: Millis,
        sequence: u64,
        state: EntityState,
        now: Millis,
    ) {
        if let Some((newest, _)) = self.remote_progress.get(&entity_id) {
            if timestamp <= *newest {
                self.stale_samples += 1;
                log::debug!("dropping stale sample from {} at {}", entity_id, timestamp);
                return;
            }
        }
        self.remote_progress.insert(entity_id, (timestamp, sequence));
        self.monitor.record_sample(entity_id, now);

        // Remote clocks are unrelated to ours; the first receipt fixes the offset
        let offset = *self
            .clock_offsets
            .entry(entity_id)
            .or_insert_with(|| now as i64 - timestamp as i64);
        let local_time = (timestamp as i64 + offset).max(0) as Millis;

        if !self
            .resolver
            .ingest(Snapshot::new(entity_id, local_time, state))
            .is_stored()
        {
            self.stale_samples += 1;
        }
    }

    fn local_pose(&self, now: Millis) -> Pose {
        Pose {
            entity_id: self.predictor.entity_id(),
            render_time: now,
            state: self.predictor.state().clone(),
            source: PoseSource::Predicted,
        }
    }

    /// Resolve one entity for rendering at wall time `now`
    ///
    /// The local entity resolves to its predicted state. Remote entities
    /// are drawn `interpolation_delay_ms` in the past with an extrapolation
    /// horizon adapted to measured loss.
    pub fn resolve(&self, entity_id: EntityId, now: Millis) -> Option<Pose> {
        if entity_id == self.predictor.entity_id() {
            return Some(self.local_pose(now));
        }
        let horizon = self.extrapolation_horizon(now);
        self.resolver
            .resolve(entity_id, self.resolver.render_time(now), horizon)
    }

    /// Resolve every entity for rendering, local entity first
    pub fn render(&self, now: Millis) -> Vec<Pose> {
        let mut poses = vec![self.local_pose(now)];
        poses.extend(self.resolver.resolve_all(now, self.extrapolation_horizon(now)));
        poses
    }

    /// Extrapolation horizon currently in effect
    pub fn extrapolation_horizon(&self, now: Millis) -> Millis {
        self.monitor
            .extrapolation_horizon(self.config.extrapolation_horizon_ms, now)
    }

    /// Hand a gameplay event to the router
    pub fn send_event(&mut self, event: Event) -> Result<SendOutcome> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok(self.router.send(event))
    }

    /// Send an authoritative correction for a remote entity
    ///
    /// Used by the participant acting as authority; `acknowledged_input`
    /// tells it which input sequence the state reflects.
    pub fn send_correction(&mut self, entity_id: EntityId, correction: &Correction) -> Result<bool> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok(self.router.send_message(&Message::Correction {
            entity_id,
            last_processed: correction.last_processed,
            state: self.codec.quantize(&correction.state),
        }))
    }

    /// Newest input sequence reported by a remote entity's state messages
    pub fn acknowledged_input(&self, entity_id: EntityId) -> Option<u64> {
        self.remote_progress.get(&entity_id).map(|(_, sequence)| *sequence)
    }

    /// Pop the next inbound gameplay event
    pub fn poll_event(&mut self) -> Option<Event> {
        self.router.poll_event()
    }

    /// Take every pending inbound gameplay event
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.router.drain_events()
    }

    /// Take every pending link event
    pub fn drain_link_events(&mut self) -> Vec<LinkEvent> {
        self.router.drain_link_events()
    }

    /// Drop all bookkeeping for a departed remote entity
    pub fn forget_entity(&mut self, entity_id: EntityId) {
        self.resolver.remove(entity_id);
        self.monitor.forget(entity_id);
        self.clock_offsets.shift_remove(&entity_id);
        self.remote_progress.shift_remove(&entity_id);
        log::debug!("forgot {}", entity_id);
    }

    /// Number of network ticks due at `now`
    pub fn ticks_due(&mut self, now: Millis) -> u32 {
        self.cadence.ticks_due(now)
    }

    /// Tear the session down
    ///
    /// Stops the network cadence, closes the transport and discards every
    /// unacknowledged input. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cadence.stop();
        self.pending_correction = None;
        self.predictor.discard_pending();
        log::info!("session for {} closed", self.predictor.entity_id());
        self.router
            .close()
            .map_err(|e| Error::Transport(e.to_string()))
    }

    pub fn stats(&self, now: Millis) -> SessionStats {
        SessionStats {
            connection: self.monitor.stats(now),
            router: self.router.stats(),
            reconcile: self.reconciler.stats(),
            pending_inputs: self.predictor.pending_inputs(),
            input_overflow: self.predictor.log().overflowed(),
            remote_entities: self.resolver.len(),
            undecodable: self.undecodable,
            stale_samples: self.stale_samples,
            handshake_complete: self.peer_codec.is_some(),
        }
    }

    /// The locally controlled entity
    pub fn local_id(&self) -> EntityId {
        self.predictor.entity_id()
    }

    /// Current predicted local state
    pub fn local_state(&self) -> &EntityState {
        self.predictor.state()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Get the transport
    pub fn transport(&self) -> &T {
        self.router.transport()
    }
}

impl<I, S, T: Transport> std::fmt::Debug for SyncSession<I, S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("local_id", &self.predictor.entity_id())
            .field("remote_entities", &self.resolver.len())
            .field("router", &self.router)
            .field("closed", &self.closed)
            .finish()
    }
}
