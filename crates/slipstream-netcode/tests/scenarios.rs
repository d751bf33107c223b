//! End-to-end scenarios: resolver edge cases, router policy, and two
//! sessions talking over loopback transports.

use slipstream_core::{DriveInput, EntityId, EntityState, KinematicStep, Snapshot, SyncConfig, Vec3};
use slipstream_netcode::{
    inbox, ChannelRouter, Correction, Event, EventPayload, LoopbackTransport, Message, PoseSource,
    RemoteStateResolver, SendOutcome, SyncSession,
};

type Session = SyncSession<DriveInput, KinematicStep, LoopbackTransport>;

const DT: f32 = 1.0 / 60.0;
const TICK_MS: u64 = 16;

fn moving(t: u64, x: f32) -> Snapshot {
    Snapshot::new(
        EntityId(9),
        t,
        EntityState::at(Vec3::new(x, 0.0, 0.0)).with_velocity(Vec3::new(100.0, 0.0, 0.0)),
    )
}

/// Two sessions wired to each other; `a_loss` drops every n-th unreliable
/// datagram A sends
fn connected_pair(a_loss: Option<u64>) -> (Session, Session) {
    let (a_tx, a_rx) = inbox();
    let (b_tx, b_rx) = inbox();

    let mut a_transport = LoopbackTransport::new(b_tx);
    if let Some(every) = a_loss {
        a_transport = a_transport.with_unreliable_loss(every);
    }

    let a = Session::open(
        SyncConfig::default(),
        EntityId(1),
        EntityState::default(),
        KinematicStep::default(),
        a_transport,
        a_rx,
    )
    .unwrap();
    let b = Session::open(
        SyncConfig::default(),
        EntityId(2),
        EntityState::at(Vec3::new(0.0, 20.0, 0.0)),
        KinematicStep::default(),
        LoopbackTransport::new(a_tx),
        b_rx,
    )
    .unwrap();
    (a, b)
}

#[test]
fn extrapolation_freezes_one_past_horizon() {
    let config = SyncConfig::default();
    let horizon = config.extrapolation_horizon_ms;
    let mut resolver = RemoteStateResolver::from_config(&config).unwrap();
    resolver.ingest(moving(0, 0.0));
    resolver.ingest(moving(100, 10.0));

    let at_horizon = resolver.resolve(EntityId(9), 100 + horizon, horizon).unwrap();
    assert_eq!(at_horizon.source, PoseSource::Extrapolated { ahead_ms: horizon });

    let past = resolver.resolve(EntityId(9), 100 + horizon + 1, horizon).unwrap();
    assert_eq!(past.source, PoseSource::Frozen { stale_ms: horizon + 1 });
    assert_eq!(past.state, moving(100, 10.0).state);
}

#[test]
fn interpolation_exact_at_sample_points() {
    let mut resolver = RemoteStateResolver::from_config(&SyncConfig::default()).unwrap();
    let samples = [moving(0, 0.0), moving(40, 3.3), moving(90, 7.7)];
    for sample in &samples {
        resolver.ingest(sample.clone());
    }

    for sample in &samples {
        let pose = resolver.resolve(EntityId(9), sample.timestamp, 250).unwrap();
        assert_eq!(pose.state, sample.state);
    }
}

#[test]
fn duplicate_event_dispatched_once() {
    let (tx, _rx) = inbox();
    let mut router = ChannelRouter::new(LoopbackTransport::new(tx), 64);
    let pickup = Event::new(EntityId(4), 1234, EventPayload::Pickup { item_id: 3 });

    router.receive(pickup.clone());
    router.receive(pickup.clone());

    assert_eq!(router.drain_events(), vec![pickup]);
}

#[test]
fn midpoint_with_zero_delay() {
    let config = SyncConfig::default().with_interpolation_delay(0);
    let mut resolver = RemoteStateResolver::from_config(&config).unwrap();
    resolver.ingest(Snapshot::new(EntityId(9), 0, EntityState::at(Vec3::ZERO)));
    resolver.ingest(Snapshot::new(EntityId(9), 100, EntityState::at(Vec3::new(10.0, 0.0, 0.0))));

    let pose = resolver.resolve_at(EntityId(9), 50).unwrap();
    assert_eq!(pose.state.position, Vec3::new(5.0, 0.0, 0.0));
}

#[test]
fn backpressure_drops_oldest() {
    let (tx, rx) = inbox();
    let mut router = ChannelRouter::new(LoopbackTransport::new(tx), 3);
    let events: Vec<_> = (0..4)
        .map(|i| Event::new(EntityId(1), i, EventPayload::LapCompleted { lap: i as u16, lap_time_ms: 60_000 }))
        .collect();

    assert_eq!(router.send(events[0].clone()), SendOutcome::Queued);
    router.send(events[1].clone());
    router.send(events[2].clone());
    assert_eq!(router.send(events[3].clone()), SendOutcome::QueuedWithDrop(events[0].clone()));

    assert_eq!(router.flush(), 3);
    let flushed: Vec<_> = rx
        .drain()
        .iter()
        .map(|bytes| Message::decode(bytes).unwrap())
        .collect();
    assert_eq!(
        flushed,
        events[1..].iter().cloned().map(Message::Event).collect::<Vec<_>>()
    );
}

#[test]
fn sessions_exchange_state() {
    let (mut a, mut b) = connected_pair(None);

    let mut now = 0;
    for _ in 0..60 {
        a.network_tick(DriveInput::new(1.0, 0.0), DT, now).unwrap();
        b.network_tick(DriveInput::default(), DT, now).unwrap();
        now += TICK_MS;
    }
    let now = now - TICK_MS;

    let seen_by_b = b.resolve(EntityId(1), now).unwrap();
    assert!(matches!(seen_by_b.source, PoseSource::Interpolated { .. }));
    assert!(seen_by_b.state.position.x > 0.0);
    assert!(seen_by_b.state.position.x < a.local_state().position.x);

    let seen_by_a = a.resolve(EntityId(2), now).unwrap();
    assert!((seen_by_a.state.position.y - 20.0).abs() < 0.01);

    let stats = b.stats(now);
    assert!(stats.handshake_complete);
    assert_eq!(stats.remote_entities, 1);
    assert!(stats.connection.packet_loss < 0.05);

    // A's first ping went out at 0 and came back on its next tick
    assert_eq!(a.stats(now).connection.last_latency_ms, Some(8.0));
    assert_eq!(b.render(now).len(), 2);
}

#[test]
fn events_cross_the_link() {
    let (mut a, mut b) = connected_pair(None);

    let chat = Event::new(EntityId(1), 5, EventPayload::Chat { text: "go".into() });
    let impact = Event::new(
        EntityId(1),
        6,
        EventPayload::Impact { other: EntityId(2), impulse: Vec3::new(0.0, 1.0, 0.0) },
    );
    assert_eq!(a.send_event(chat.clone()).unwrap(), SendOutcome::Queued);
    assert_eq!(a.send_event(impact.clone()).unwrap(), SendOutcome::Immediate);

    a.network_tick(DriveInput::default(), DT, 0).unwrap();
    b.network_tick(DriveInput::default(), DT, 0).unwrap();

    // Immediate traffic arrives ahead of the flushed queue
    assert_eq!(b.drain_events(), vec![impact, chat]);
}

#[test]
fn authority_correction_reconciles_client() {
    let (mut a, mut b) = connected_pair(None);

    let mut now = 0;
    for _ in 0..11 {
        a.network_tick(DriveInput::new(1.0, 0.0), DT, now).unwrap();
        b.network_tick(DriveInput::default(), DT, now).unwrap();
        now += TICK_MS;
    }

    // B acts as authority and moves A sideways
    let acked = b.acknowledged_input(EntityId(1)).unwrap();
    assert_eq!(acked, 11);
    let authoritative = EntityState::at(Vec3::new(0.0, 5.0, 0.0));
    assert!(b.send_correction(EntityId(1), &Correction::new(acked, authoritative)).unwrap());

    a.network_tick(DriveInput::new(1.0, 0.0), DT, now).unwrap();

    let stats = a.stats(now).reconcile;
    assert_eq!(stats.applied, 1);
    assert_eq!(stats.divergences, 1);
    assert!((a.local_state().position.y - 5.0).abs() < 1e-4);
    assert!(a.local_state().position.x > 0.0);
    assert_eq!(a.stats(now).pending_inputs, 1);
}

#[test]
fn lossy_link_raises_loss_and_shrinks_horizon() {
    let (mut a, mut b) = connected_pair(Some(2));

    let mut now = 0;
    for _ in 0..120 {
        a.network_tick(DriveInput::new(1.0, 0.0), DT, now).unwrap();
        b.network_tick(DriveInput::default(), DT, now).unwrap();
        now += TICK_MS;
    }
    let now = now - TICK_MS;

    let loss = b.stats(now).connection.packet_loss;
    assert!(loss > 0.35 && loss < 0.6, "loss was {loss}");
    assert!(b.extrapolation_horizon(now) < b.config().extrapolation_horizon_ms);
}

#[test]
fn silent_peer_saturates_outputs() {
    let (mut a, mut b) = connected_pair(None);

    let mut now = 0;
    for _ in 0..30 {
        a.network_tick(DriveInput::default(), DT, now).unwrap();
        b.network_tick(DriveInput::default(), DT, now).unwrap();
        now += TICK_MS;
    }

    // A goes away; B keeps ticking
    a.close().unwrap();
    for _ in 0..200 {
        b.network_tick(DriveInput::default(), DT, now).unwrap();
        now += TICK_MS;
    }

    let stats = b.stats(now);
    assert_eq!(stats.connection.packet_loss, 1.0);
    assert!(stats.connection.latency_ms.unwrap() > 1000.0);

    let frozen = b.resolve(EntityId(1), now).unwrap();
    assert!(matches!(frozen.source, PoseSource::Frozen { .. }));
}
