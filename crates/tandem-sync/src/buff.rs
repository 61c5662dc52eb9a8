//! Buff replication with per-target deferral.
//!
//! A buff for a target that is not resolvable yet is parked under
//! `(target, buff_id)`. When the target resolves the remaining duration is
//! applied; buffs that ran out while parked are dropped.

use std::time::Duration;

use tandem_net::messages::BuffTarget;

use crate::pending::{Deferral, PendingBuffer};
use crate::world::{BuffAccess, EntityRef};

#[derive(Debug, Clone, Copy)]
struct ParkedBuff {
    duration: f32,
    parked_at: Duration,
}

/// Parked buffs of one participant.
#[derive(Debug)]
pub struct BuffSync {
    pending: PendingBuffer<(BuffTarget, i32), ParkedBuff>,
}

impl Default for BuffSync {
    fn default() -> Self {
        Self::new()
    }
}

impl BuffSync {
    /// Nothing parked.
    pub fn new() -> Self {
        Self {
            pending: PendingBuffer::new("buff"),
        }
    }

    /// Number of parked buffs.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply a buff to `entity`, or park it when the target is unresolved.
    pub fn apply(
        &mut self,
        world: &mut impl BuffAccess,
        target: BuffTarget,
        buff_id: i32,
        duration: f32,
        entity: Option<EntityRef>,
        now: Duration,
    ) -> Deferral {
        let parked = ParkedBuff {
            duration,
            parked_at: now,
        };
        self.pending
            .apply_or_defer((target, buff_id), parked, |p| match entity {
                Some(entity) if world.apply_buff(entity, buff_id, p.duration) => Ok(()),
                _ => Err(p),
            })
    }

    /// A target resolved: apply what is left of its parked buffs.
    pub fn flush(
        &mut self,
        world: &mut impl BuffAccess,
        target: &BuffTarget,
        entity: EntityRef,
        now: Duration,
    ) -> usize {
        let mut applied = 0;
        self.pending.retain(|(t, buff_id), parked| {
            if t != target {
                return true;
            }
            let elapsed = now.saturating_sub(parked.parked_at).as_secs_f32();
            let remaining = parked.duration - elapsed;
            if remaining <= 0.0 {
                tracing::debug!("Buff {buff_id} for {target:?} expired while parked");
            } else if world.apply_buff(entity, *buff_id, remaining) {
                applied += 1;
            }
            false
        });
        applied
    }

    /// Drop everything parked for a target.
    pub fn drop_target(&mut self, target: &BuffTarget) {
        self.pending.retain(|(t, _), _| t != target);
    }

    /// Drop every parked AI buff.
    pub fn drop_ai(&mut self) {
        self.pending.retain(|(t, _), _| !matches!(t, BuffTarget::Ai(_)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryWorld;
    use crate::world::{AiAppearance, Health};
    use glam::Vec3;
    use tandem_net::messages::NetId;

    #[test]
    fn test_resolved_target_applies_immediately() {
        let mut buffs = BuffSync::new();
        let mut world = MemoryWorld::new("level_01");
        let ai = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(1.0, 1.0));
        let result = buffs.apply(&mut world, BuffTarget::Ai(NetId(1)), 3, 5.0, Some(ai), Duration::ZERO);
        assert_eq!(result, Deferral::Applied);
        assert_eq!(world.entity(ai).unwrap().buffs, vec![(3, 5.0)]);
        assert_eq!(buffs.pending_len(), 0);
    }

    #[test]
    fn test_parked_buff_applies_remaining_duration() {
        let mut buffs = BuffSync::new();
        let mut world = MemoryWorld::new("level_01");
        let target = BuffTarget::Player("p1".into());
        buffs.apply(&mut world, target.clone(), 3, 5.0, None, Duration::ZERO);
        buffs.apply(&mut world, target.clone(), 4, 1.0, None, Duration::ZERO);
        buffs.apply(&mut world, BuffTarget::Player("p2".into()), 3, 5.0, None, Duration::ZERO);
        assert_eq!(buffs.pending_len(), 3);

        let e = world.place_ai(AiAppearance::default(), Vec3::ZERO, Health::new(1.0, 1.0));
        let applied = buffs.flush(&mut world, &target, e, Duration::from_secs(2));
        assert_eq!(applied, 1);
        assert_eq!(world.entity(e).unwrap().buffs, vec![(3, 3.0)]);
        assert_eq!(buffs.pending_len(), 1);

        buffs.drop_target(&BuffTarget::Player("p2".into()));
        assert_eq!(buffs.pending_len(), 0);
    }
}
