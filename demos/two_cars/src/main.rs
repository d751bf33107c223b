//! Two Cars Demo
//!
//! Runs two sync sessions in one process, connected by loopback transports.
//! Car 1 accelerates through a turn while car 2 idles; every tenth
//! unreliable datagram from car 1 is dropped. Halfway through, car 2 acts
//! as authority and nudges car 1 back onto the racing line. Ticks are paced
//! in real time by a monotonic clock at the configured rate.

use slipstream_core::{
    ChannelValue, DriveInput, EntityId, EntityState, KinematicStep, Millis, MonotonicClock,
    SyncConfig, Vec3,
};
use std::thread;
use std::time::Duration;
use slipstream_netcode::{
    inbox, Correction, Event, EventPayload, LoopbackTransport, PoseSource, SyncSession,
};

const CONFIG: &str = r#"(
    tick_rate_hz: 60,
    interpolation_delay_ms: 100,
    extrapolation_horizon_ms: 250,
    channels: [
        (name: "suspension", kind: Scalar, threshold: Some(0.001)),
    ],
)"#;

const TICKS: u32 = 180;
const DT: f32 = 1.0 / 60.0;

fn main() {
    println!("=== Slipstream Two Cars Demo ===\n");

    let config = SyncConfig::from_ron_str(CONFIG).expect("demo config is valid");
    for channel in &config.channels {
        println!("Channel '{}' quantized to {:?}", channel.name, channel.threshold);
    }
    println!();

    let car1 = EntityId(1);
    let car2 = EntityId(2);

    // Each session delivers into the other's inbox
    let (to_car1, car1_inbox) = inbox();
    let (to_car2, car2_inbox) = inbox();
    let suspension = vec![ChannelValue::Scalar(0.25)];

    let mut driver = Car::open(
        config.clone(),
        car1,
        EntityState::default().with_channels(suspension.clone()),
        KinematicStep::default(),
        LoopbackTransport::new(to_car2).with_unreliable_loss(10),
        car1_inbox,
    )
    .expect("open car 1");

    let mut observer = Car::open(
        config,
        car2,
        EntityState::at(Vec3::new(0.0, 8.0, 0.0)).with_channels(suspension),
        KinematicStep::default(),
        LoopbackTransport::new(to_car1),
        car2_inbox,
    )
    .expect("open car 2");

    let steer = DriveInput::new(1.0, 0.3);
    let idle = DriveInput::default();
    let clock = MonotonicClock::new();
    let mut tick = 0;
    let mut now: Millis = 0;

    while tick < TICKS {
        now = clock.now();
        for _ in 0..driver.ticks_due(now) {
            if tick == TICKS {
                break;
            }
            driver.network_tick(steer, DT, now).expect("car 1 tick");
            observer.network_tick(idle, DT, now).expect("car 2 tick");

            if tick == 90 {
                if let Some(acked) = observer.acknowledged_input(car1) {
                    let line = EntityState::at(Vec3::new(10.0, 0.0, 0.0))
                        .with_channels(vec![ChannelValue::Scalar(0.25)]);
                    observer
                        .send_correction(car1, &Correction::new(acked, line))
                        .expect("send correction");
                    observer
                        .send_event(Event::new(
                            car2,
                            now,
                            EventPayload::Chat { text: "back on the line".into() },
                        ))
                        .expect("send chat");
                    println!("[tick {:>3}] car 2 corrects car 1 at input #{}", tick, acked);
                }
            }

            for event in driver.drain_events() {
                println!("[tick {:>3}] car 1 received {:?}", tick, event.payload);
            }

            if tick % 30 == 0 {
                report(&observer, car1, driver.local_state().position, tick, now);
            }
            tick += 1;
        }
        thread::sleep(Duration::from_millis(2));
    }

    let stats = observer.stats(now);
    println!("\nCar 2 link stats:");
    println!("  latency:      {:?} ms", stats.connection.latency_ms);
    println!("  packet loss:  {:.1}%", stats.connection.packet_loss * 100.0);
    println!("  horizon:      {} ms", observer.extrapolation_horizon(now));

    let stats = driver.stats(now);
    println!("\nCar 1 reconciliation:");
    println!("  corrections:  {}", stats.reconcile.applied);
    println!("  divergences:  {}", stats.reconcile.divergences);
    println!("  pending:      {}", stats.pending_inputs);

    driver.close().expect("close car 1");
    observer.close().expect("close car 2");
    println!("\n=== Demo Complete ===");
}

type Car = SyncSession<DriveInput, KinematicStep, LoopbackTransport>;

fn report(observer: &Car, car: EntityId, local: Vec3, tick: u32, now: Millis) {
    match observer.resolve(car, now) {
        Some(pose) => println!(
            "[tick {:>3}] car 1 at ({:>6.2}, {:>6.2}), car 2 sees ({:>6.2}, {:>6.2}) {}",
            tick,
            local.x,
            local.y,
            pose.state.position.x,
            pose.state.position.y,
            describe(pose.source),
        ),
        None => println!("[tick {:>3}] car 1 not yet visible to car 2", tick),
    }
}

fn describe(source: PoseSource) -> String {
    match source {
        PoseSource::Interpolated { alpha } => format!("(interpolated, alpha {:.2})", alpha),
        PoseSource::Extrapolated { ahead_ms } => format!("(extrapolated {} ms)", ahead_ms),
        PoseSource::Frozen { stale_ms } => format!("(frozen, {} ms stale)", stale_ms),
        PoseSource::Sample => "(sample)".to_string(),
        PoseSource::Predicted => "(predicted)".to_string(),
    }
}
