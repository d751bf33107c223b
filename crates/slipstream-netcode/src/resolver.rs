//! Remote state resolution for rendering
//!
//! Each remote entity is drawn `interpolation_delay` behind real time so a
//! bracketing pair of samples is normally available. When the buffer runs
//! dry the newest sample is projected along its velocities, but only up to
//! the extrapolation horizon; past that the pose freezes instead of
//! drifting away.

use crate::Result;
use indexmap::IndexMap;
use slipstream_core::{
    math, Bracket, EntityId, EntityState, Ingest, Millis, Snapshot, SnapshotHistory,
    SnapshotInterpolation, SyncConfig,
};
use slipstream_snapshot_buffer::SnapshotBuffer;

/// How a pose was produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseSource {
    /// Blend of two bracketing samples
    Interpolated { alpha: f32 },
    /// A buffered sample returned unmodified
    Sample,
    /// Projection past the newest sample
    Extrapolated { ahead_ms: Millis },
    /// Newest sample held because the horizon was exceeded
    Frozen { stale_ms: Millis },
    /// Locally predicted state
    Predicted,
}

/// A renderable entity state
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub entity_id: EntityId,
    /// The time this pose represents
    pub render_time: Millis,
    pub state: EntityState,
    pub source: PoseSource,
}

/// Resolver for every remote entity
///
/// Owns one history per remote entity; generic over the storage backend.
#[derive(Debug)]
pub struct RemoteStateResolver<H = SnapshotBuffer> {
    histories: IndexMap<EntityId, H>,
    make_history: fn(usize) -> H,
    capacity: usize,
    interpolation_delay_ms: Millis,
    extrapolation_horizon_ms: Millis,
}

impl RemoteStateResolver<SnapshotBuffer> {
    /// Create a resolver backed by `SnapshotBuffer`s sized from `config`
    ///
    /// Fails when `config` does not validate.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_history(
            config.snapshot_capacity,
            config.interpolation_delay_ms,
            config.extrapolation_horizon_ms,
            SnapshotBuffer::new,
        ))
    }
}

impl<H: SnapshotHistory> RemoteStateResolver<H> {
    /// Create a resolver with a custom history constructor
    pub fn with_history(
        capacity: usize,
        interpolation_delay_ms: Millis,
        extrapolation_horizon_ms: Millis,
        make_history: fn(usize) -> H,
    ) -> Self {
        Self {
            histories: IndexMap::new(),
            make_history,
            capacity,
            interpolation_delay_ms,
            extrapolation_horizon_ms,
        }
    }

    /// Push a received sample into its entity's history
    pub fn ingest(&mut self, snapshot: Snapshot) -> Ingest {
        let (make, capacity) = (self.make_history, self.capacity);
        self.histories
            .entry(snapshot.entity_id)
            .or_insert_with(|| make(capacity))
            .ingest(snapshot)
    }

    /// Render time for wall time `now`
    pub fn render_time(&self, now: Millis) -> Millis {
        now.saturating_sub(self.interpolation_delay_ms)
    }

    /// Resolve a pose at `now - interpolation_delay` with the configured horizon
    pub fn resolve_at(&self, entity_id: EntityId, now: Millis) -> Option<Pose> {
        self.resolve(entity_id, self.render_time(now), self.extrapolation_horizon_ms)
    }

    /// Resolve a pose for `entity_id` at `render_time`
    ///
    /// Returns `None` while the entity has no samples (not yet visible).
    pub fn resolve(&self, entity_id: EntityId, render_time: Millis, horizon_ms: Millis) -> Option<Pose> {
        let history = self.histories.get(&entity_id)?;
        let (state, source) = match history.bracket(render_time) {
            Bracket::Empty => return None,
            Bracket::Single(s) | Bracket::BeforeWindow(s) | Bracket::Exact(s) => {
                (s.state.clone(), PoseSource::Sample)
            }
            Bracket::Between { before, after, alpha } => (
                interpolate(&before.state, &after.state, alpha),
                PoseSource::Interpolated { alpha },
            ),
            Bracket::AfterWindow(newest) => {
                let ahead_ms = render_time - newest.timestamp;
                if ahead_ms <= horizon_ms {
                    (
                        newest.state.extrapolate(ahead_ms as f32 / 1000.0),
                        PoseSource::Extrapolated { ahead_ms },
                    )
                } else {
                    (newest.state.clone(), PoseSource::Frozen { stale_ms: ahead_ms })
                }
            }
        };

        Some(Pose {
            entity_id,
            render_time,
            state,
            source,
        })
    }

    /// Resolve every known entity at `now`, using `horizon_ms`
    pub fn resolve_all(&self, now: Millis, horizon_ms: Millis) -> Vec<Pose> {
        let render_time = self.render_time(now);
        self.histories
            .keys()
            .filter_map(|id| self.resolve(*id, render_time, horizon_ms))
            .collect()
    }

    /// Drop an entity's history
    pub fn remove(&mut self, entity_id: EntityId) -> Option<H> {
        self.histories.shift_remove(&entity_id)
    }

    /// Get an entity's history
    pub fn history(&self, entity_id: EntityId) -> Option<&H> {
        self.histories.get(&entity_id)
    }

    /// Known remote entities, in first-seen order
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.histories.keys().copied()
    }

    /// Number of known remote entities
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    /// Check if no remote entity is known
    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Configured interpolation delay
    pub fn interpolation_delay_ms(&self) -> Millis {
        self.interpolation_delay_ms
    }

    /// Configured extrapolation horizon
    pub fn extrapolation_horizon_ms(&self) -> Millis {
        self.extrapolation_horizon_ms
    }

    /// Drop every history
    pub fn clear(&mut self) {
        self.histories.clear();
    }
}

/// Blend two states
///
/// Position, velocities and channels are linear; orientation is blended
/// spherically along the shortest arc.
pub fn interpolate(from: &EntityState, to: &EntityState, alpha: f32) -> EntityState {
    if alpha <= 0.0 {
        return from.clone();
    }
    if alpha >= 1.0 {
        return to.clone();
    }

    let rotation = math::slerp_euler(from.rotation, to.rotation, alpha);

    let channels = if from.channels.len() == to.channels.len() {
        from.channels
            .iter()
            .zip(to.channels.iter())
            .map(|(a, b)| a.lerp(b, alpha))
            .collect()
    } else {
        to.channels.clone()
    };

    EntityState {
        position: from.position.lerp(to.position, alpha),
        rotation,
        linear_velocity: from.linear_velocity.lerp(to.linear_velocity, alpha),
        angular_velocity: from.angular_velocity.lerp(to.angular_velocity, alpha),
        channels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipstream_core::{ChannelValue, Vec3};

    const CAR: EntityId = EntityId(3);

    fn resolver() -> RemoteStateResolver {
        RemoteStateResolver::from_config(&SyncConfig::default()).unwrap()
    }

    #[test]
    fn test_from_config_rejects_invalid_capacity() {
        let config = SyncConfig::default().with_snapshot_capacity(1);
        assert!(matches!(
            RemoteStateResolver::from_config(&config),
            Err(crate::Error::Config(_))
        ));
    }

    fn sample(t: Millis, x: f32) -> Snapshot {
        Snapshot::new(
            CAR,
            t,
            EntityState::at(Vec3::new(x, 0.0, 0.0)).with_velocity(Vec3::new(100.0, 0.0, 0.0)),
        )
    }

    #[test]
    fn test_not_visible_until_first_sample() {
        let resolver = resolver();
        assert!(resolver.resolve(CAR, 0, 250).is_none());
    }

    #[test]
    fn test_single_sample_verbatim() {
        let mut resolver = resolver();
        resolver.ingest(sample(100, 1.0));
        let pose = resolver.resolve(CAR, 5_000, 250).unwrap();
        assert_eq!(pose.state, sample(100, 1.0).state);
        assert_eq!(pose.source, PoseSource::Sample);
    }

    #[test]
    fn test_interpolates_between_pair() {
        let mut resolver = resolver();
        resolver.ingest(sample(0, 0.0));
        resolver.ingest(sample(100, 10.0));

        let pose = resolver.resolve(CAR, 25, 250).unwrap();
        assert_eq!(pose.state.position, Vec3::new(2.5, 0.0, 0.0));
        assert_eq!(pose.source, PoseSource::Interpolated { alpha: 0.25 });
    }

    #[test]
    fn test_exact_sample_unmodified() {
        let mut resolver = resolver();
        resolver.ingest(sample(0, 0.0));
        resolver.ingest(sample(100, 10.0));
        resolver.ingest(sample(200, 20.0));

        for (t, x) in [(0, 0.0), (100, 10.0), (200, 20.0)] {
            let pose = resolver.resolve(CAR, t, 250).unwrap();
            assert_eq!(pose.state, sample(t, x).state);
        }
    }

    #[test]
    fn test_before_window_holds_oldest() {
        let mut resolver = resolver();
        resolver.ingest(sample(100, 1.0));
        resolver.ingest(sample(200, 2.0));
        let pose = resolver.resolve(CAR, 50, 250).unwrap();
        assert_eq!(pose.state.position.x, 1.0);
    }

    #[test]
    fn test_extrapolates_within_horizon() {
        let mut resolver = resolver();
        resolver.ingest(sample(0, 0.0));
        resolver.ingest(sample(100, 10.0));

        let pose = resolver.resolve(CAR, 200, 250).unwrap();
        assert_eq!(pose.source, PoseSource::Extrapolated { ahead_ms: 100 });
        assert!((pose.state.position.x - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_freezes_past_horizon() {
        let mut resolver = resolver();
        resolver.ingest(sample(0, 0.0));
        resolver.ingest(sample(100, 10.0));

        let pose = resolver.resolve(CAR, 351, 250).unwrap();
        assert_eq!(pose.source, PoseSource::Frozen { stale_ms: 251 });
        assert_eq!(pose.state, sample(100, 10.0).state);
    }

    #[test]
    fn test_render_time_applies_delay() {
        let mut resolver = resolver();
        resolver.ingest(sample(0, 0.0));
        resolver.ingest(sample(100, 10.0));

        // 150 - 100ms delay = 50
        let pose = resolver.resolve_at(CAR, 150).unwrap();
        assert_eq!(pose.render_time, 50);
        assert_eq!(pose.state.position.x, 5.0);
        assert_eq!(resolver.render_time(40), 0);
    }

    #[test]
    fn test_interpolate_channels_and_rotation() {
        let from = EntityState::default()
            .with_rotation(Vec3::new(0.0, 0.0, 0.0))
            .with_channels(vec![ChannelValue::Scalar(0.0), ChannelValue::Array(vec![0.0, 2.0])]);
        let to = EntityState::default()
            .with_rotation(Vec3::new(0.0, 0.0, 1.0))
            .with_channels(vec![ChannelValue::Scalar(1.0), ChannelValue::Array(vec![4.0, 2.0])]);

        let mid = interpolate(&from, &to, 0.5);
        assert!((mid.rotation.z - 0.5).abs() < 1e-4);
        assert_eq!(mid.channels[0], ChannelValue::Scalar(0.5));
        assert_eq!(mid.channels[1], ChannelValue::Array(vec![2.0, 2.0]));
    }

    #[test]
    fn test_resolve_all_and_remove() {
        let mut resolver = resolver();
        resolver.ingest(sample(0, 0.0));
        resolver.ingest(Snapshot::new(EntityId(4), 0, EntityState::default()));

        let poses = resolver.resolve_all(100, 250);
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[0].entity_id, CAR);

        assert!(resolver.remove(CAR).is_some());
        assert_eq!(resolver.entities().collect::<Vec<_>>(), vec![EntityId(4)]);
    }

    #[test]
    fn test_stale_ingest_ignored() {
        let mut resolver = resolver();
        resolver.ingest(sample(100, 1.0));
        assert_eq!(resolver.ingest(sample(50, 9.0)), Ingest::Stale);
        assert_eq!(resolver.history(CAR).unwrap().len(), 1);
    }
}
