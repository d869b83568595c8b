//! State cache write-back, periodic save, idle eviction and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use futures::FutureExt;
use moonpool_game::component::{Component, ComponentKind};
use moonpool_game::config::RuntimeConfig;
use moonpool_game::error::ActorError;
use moonpool_game::storage::{
    InMemoryCacheBackend, InMemoryStore, PersistenceAdapter, StateCache, StateKey, StateQuery,
};

fn stored_role(store: &InMemoryStore, id: i64) -> Option<RoleState> {
    store
        .record(&StateQuery::from(StateKey::of::<RoleState>(id)))
        .map(|record| serde_json::from_slice(&record.data).expect("decode role state"))
}

#[tokio::test]
async fn test_cache_set_get_flush_round_trip() {
    let store = Arc::new(InMemoryStore::new());
    let mut cache = StateCache::new(store.clone(), None);
    let value = RoleState { level: 5, ticks: 2 };

    cache.set(70, value.clone());
    assert_eq!(cache.get::<RoleState>(70).await.expect("get").cloned(), Some(value.clone()));
    assert!(cache.is_dirty(StateKey::of::<RoleState>(70)).expect("dirty"));
    assert!(store.is_empty());

    assert_eq!(cache.flush().await.expect("flush"), 1);
    assert_eq!(stored_role(&store, 70), Some(value.clone()));
    assert!(!cache.has_dirty().expect("clean"));

    // Nothing changed, nothing written.
    assert_eq!(cache.flush().await.expect("flush again"), 0);
    assert_eq!(store.save_count(), 1);

    // In-place mutation is picked up by the content hash.
    cache.cached_mut::<RoleState>(70).expect("cached").level = 6;
    assert_eq!(cache.flush().await.expect("flush mutation"), 1);
    assert_eq!(stored_role(&store, 70).map(|s| s.level), Some(6));
}

#[tokio::test]
async fn test_cache_reads_through_backend_then_store() {
    let store = Arc::new(InMemoryStore::new());
    let backend = Arc::new(InMemoryCacheBackend::new());

    let mut writer = StateCache::new(store.clone(), Some(backend.clone()));
    writer.set(71, RoleState { level: 3, ticks: 0 });
    writer.flush().await.expect("flush");
    assert_eq!(backend.len(), 1);

    // Store down, backend still answers.
    store.set_available(false);
    let mut reader = StateCache::new(store.clone(), Some(backend.clone()));
    let loaded = reader.get::<RoleState>(71).await.expect("backend hit").cloned();
    assert_eq!(loaded.map(|s| s.level), Some(3));
    assert!(!reader.has_dirty().expect("loaded entries are clean"));

    // No backend: the store failure surfaces.
    let mut bare = StateCache::new(store.clone(), None);
    assert!(bare.get::<RoleState>(71).await.is_err());

    store.set_available(true);
    let found = store
        .find_one(&StateQuery::from(StateKey::of::<RoleState>(71)))
        .await
        .expect("find");
    assert!(found.is_some());
}

#[tokio::test]
async fn test_get_or_create_defaults_missing_state() {
    let store = Arc::new(InMemoryStore::new());
    let mut cache = StateCache::new(store.clone(), None);

    assert!(cache.get::<RoleState>(72).await.expect("get").is_none());
    let created = cache.get_or_create::<RoleState>(72).await.expect("create");
    assert_eq!(*created, RoleState::default());
    assert!(cache.is_dirty(StateKey::of::<RoleState>(72)).expect("fresh is dirty"));
}

#[tokio::test]
async fn test_save_all_persists_dirty_state() {
    let Fixture { runtime, store, .. } = started().await;
    let key = role(73);
    level_up(&runtime, key).await.expect("level up");
    level_up(&runtime, key).await.expect("level up");

    let report = runtime.save_all().await;
    assert!(report.is_clean());
    assert_eq!(report.actors, 2);
    assert!(report.states >= 1);
    assert_eq!(stored_role(&store, key.id).map(|s| s.level), Some(2));

    let again = runtime.save_all().await;
    assert!(again.is_clean());
    assert_eq!(again.states, 0);
}

#[tokio::test]
async fn test_failed_save_is_retried_next_pass() {
    let Fixture { runtime, store, .. } = fixture();
    let key = role(74);
    level_up(&runtime, key).await.expect("level up");

    store.set_available(false);
    let report = runtime.save_all().await;
    assert_eq!(report.failed, vec![key]);
    assert!(stored_role(&store, key.id).is_none());

    store.set_available(true);
    let report = runtime.save_all().await;
    assert!(report.is_clean());
    assert_eq!(report.states, 1);
    assert_eq!(stored_role(&store, key.id).map(|s| s.level), Some(1));
}

#[tokio::test]
async fn test_deactivate_with_store_down_keeps_actor() {
    let Fixture { runtime, store, .. } = fixture();
    let key = role(75);
    level_up(&runtime, key).await.expect("level up");

    store.set_available(false);
    assert!(!runtime.deactivate(key).await.expect("deactivate"));
    assert!(runtime.actors().contains(&key));

    store.set_available(true);
    assert!(runtime.deactivate(key).await.expect("deactivate"));
    assert!(!runtime.actors().contains(&key));
    assert_eq!(stored_role(&store, key.id).map(|s| s.level), Some(1));
}

#[tokio::test]
async fn test_shutdown_flushes_and_drops_every_actor() {
    let Fixture { runtime, store, .. } = started().await;
    for id in [76, 77] {
        level_up(&runtime, role(id)).await.expect("level up");
    }
    assert!(runtime.save_all().await.is_clean());
    level_up(&runtime, role(76)).await.expect("level up");

    // Only the record changed since the last save is written.
    let report = runtime.shutdown().await;
    assert!(report.is_clean());
    assert_eq!(report.actors, 3);
    assert_eq!(report.states, 1);
    assert!(runtime.actors().is_empty());
    assert_eq!(runtime.timers().active(), 0);
    assert_eq!(stored_role(&store, 76).map(|s| s.level), Some(2));
    assert_eq!(stored_role(&store, 77).map(|s| s.level), Some(1));

    // A second shutdown is a no-op.
    assert_eq!(runtime.shutdown().await.actors, 0);
}

#[tokio::test]
async fn test_tell_queued_behind_eviction_reaches_next_incarnation() {
    let Fixture { runtime, store, .. } = fixture();
    let key = role(83);
    level_up(&runtime, key).await.expect("level up");
    let actor = runtime.actor(key);

    // Queue the eviction, then a tell right behind it.
    let mut deactivate = Box::pin(runtime.deactivate(key));
    assert!(futures::poll!(&mut deactivate).is_pending());
    actor
        .tell(|cell| {
            async move {
                cell.with_agent::<RoleComponent, _, _>(|agent, ctx| agent.level_up(ctx))
                    .await
                    .map(|_| ())
            }
            .boxed()
        })
        .expect("accepted before the worker stopped");

    assert!(deactivate.await.expect("deactivate"));
    runtime.all_finish().await;

    assert!(actor.is_closed());
    assert!(runtime.actors().contains(&key));
    assert_eq!(role_state(&runtime, key).await.level, 2);

    assert!(runtime.deactivate(key).await.expect("deactivate again"));
    assert_eq!(stored_role(&store, key.id).map(|s| s.level), Some(2));
}

#[tokio::test]
async fn test_inspect_state_live_then_stored() {
    let Fixture { runtime, .. } = fixture();
    let key = role(78);
    level_up(&runtime, key).await.expect("level up");

    let live = runtime
        .inspect_state(key, RoleComponent::KIND)
        .await
        .expect("inspect")
        .expect("live state");
    assert_eq!(live["level"], 1);

    runtime.deactivate(key).await.expect("deactivate");
    let stored = runtime
        .inspect_state(key, RoleComponent::KIND)
        .await
        .expect("inspect")
        .expect("stored state");
    assert_eq!(stored["level"], 1);
    assert!(!runtime.actors().contains(&key));

    let missing = runtime
        .inspect_state(role(79), RoleComponent::KIND)
        .await
        .expect("inspect");
    assert!(missing.is_none());

    let err = runtime
        .inspect_state(key, ComponentKind::new("nope"))
        .await
        .expect_err("unknown component");
    assert!(matches!(err, ActorError::UnknownComponent(_)));
}

#[tokio::test(start_paused = true)]
async fn test_idle_offline_actors_are_evicted() {
    let config = RuntimeConfig::builder()
        .idle_timeout(Duration::from_secs(30))
        .idle_check_interval(Duration::from_secs(3600))
        .build()
        .expect("config");
    let Fixture { runtime, store, .. } = fixture_with(config);
    runtime.start().await.expect("start");

    let (idle, online) = (role(80), role(81));
    level_up(&runtime, idle).await.expect("level up");
    level_up(&runtime, online).await.expect("level up");
    runtime.set_online(online, true).await.expect("online");

    assert_eq!(runtime.check_idle().await, 0);

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(runtime.check_idle().await, 1);

    assert!(!runtime.actors().contains(&idle));
    assert!(runtime.actors().contains(&online));
    assert!(runtime.actors().contains(&runtime.server_key()));
    assert_eq!(stored_role(&store, idle.id).map(|s| s.level), Some(1));

    // Coming back loads the persisted state into a new actor.
    assert_eq!(level_up(&runtime, idle).await.expect("reload"), 2);
}
