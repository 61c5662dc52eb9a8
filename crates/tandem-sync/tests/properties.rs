//! Property tests for scene-name matching, snapshot batching and the
//! client-side health echo filter.

use std::time::Duration;

use glam::Vec3;
use proptest::prelude::*;
use tandem_config::SyncConfig;
use tandem_net::messages::{AiTransformEntry, AiTransforms, Message, NetId, encode_message};
use tandem_sync::health::SelfHealthOutcome;
use tandem_sync::scene::{canonical, same_map};
use tandem_sync::snapshot::plan_batches;
use tandem_sync::world::HealthAccess;
use tandem_sync::{Health, HealthSync, MemoryWorld, Outbox};

fn scene_name() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        "[ A-Za-zÄÖÜäöüß0-9_-]{0,16}(_Main|_night|_copy| copy)?",
    ]
}

fn transform_entry() -> impl Strategy<Value = (f32, f32, f32, f32, f32)> {
    (
        -5000.0f32..5000.0,
        -500.0f32..500.0,
        -5000.0f32..5000.0,
        -1.0f32..1.0,
        -1.0f32..1.0,
    )
}

proptest! {
    #[test]
    fn test_canonical_is_idempotent(name in scene_name()) {
        let once = canonical(&name);
        prop_assert_eq!(canonical(&once), once);
    }

    #[test]
    fn test_same_map_is_symmetric(a in scene_name(), b in scene_name()) {
        prop_assert_eq!(same_map(&a, &b), same_map(&b, &a));
        prop_assert!(same_map(&a, &a));
    }

    #[test]
    fn test_batches_respect_any_budget(
        budget in 0usize..2000,
        raw in prop::collection::vec(transform_entry(), 0..300),
    ) {
        let count = raw.len();
        let entries: Vec<AiTransformEntry> = raw
            .into_iter()
            .enumerate()
            .map(|(i, (x, y, z, fx, fz))| AiTransformEntry {
                id: NetId(i as u32),
                position: Vec3::new(x, y, z).into(),
                facing: Vec3::new(fx, 0.0, fz).into(),
            })
            .collect();

        let plan = plan_batches(entries, budget);
        let mut last_id = None;
        let mut planned = 0;
        for batch in &plan.batches {
            prop_assert!(!batch.is_empty());
            prop_assert!(batch.len() <= plan.per_packet);
            for entry in batch {
                prop_assert!(last_id.is_none_or(|last| entry.id.0 > last));
                last_id = Some(entry.id.0);
            }
            planned += batch.len();

            let bytes = encode_message(&Message::AiTransforms(AiTransforms {
                entries: batch.clone(),
            }))
            .unwrap();
            prop_assert!(bytes.len() <= budget, "{} > {}", bytes.len(), budget);
        }
        prop_assert_eq!(planned + plan.skipped, count);
    }

    #[test]
    fn test_health_never_rises_inside_echo_window(
        damage in 1.0f32..39.0,
        arrivals in prop::collection::vec((0.0f32..=40.0, 0u64..400), 1..24),
    ) {
        let config = SyncConfig::default();
        prop_assume!(config.echo_window() >= Duration::from_millis(400));

        let mut health = HealthSync::new(&config);
        let mut world = MemoryWorld::new("level_01");
        let mut outbox = Outbox::new();
        let player = world.spawn_local_player(Vec3::ZERO, Health::new(40.0, 40.0), 8);
        health.track_local(&mut world, player);

        let t0 = Duration::from_secs(3);
        let after = world.damage_local_player(damage).unwrap();
        health.on_self_damaged(after, t0, &mut outbox);

        let mut live = after.current;
        for (current, offset) in arrivals {
            let at = t0 + Duration::from_millis(offset);
            let outcome = health.on_self_health(&mut world, Health::new(40.0, current), at);
            let now = world.health(player).unwrap().current;
            if current > live {
                prop_assert_eq!(outcome, SelfHealthOutcome::StaleEcho);
                prop_assert_eq!(now, live);
            } else {
                prop_assert_eq!(outcome, SelfHealthOutcome::Applied);
                prop_assert_eq!(now, current);
            }
            prop_assert!(now <= after.current);
            live = now;
        }
    }
}
