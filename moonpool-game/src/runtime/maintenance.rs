//! Periodic save and idle eviction.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::game_runtime::GameRuntime;
use super::shared::RuntimeShared;
use crate::actor::{DeactivationReason, EntityKey};

/// Outcome of a save pass or of a shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    /// Actors whose state is fully persisted.
    pub actors: usize,
    /// States written to the store.
    pub states: usize,
    /// Actors left with dirty state.
    pub failed: Vec<EntityKey>,
}

impl SaveReport {
    /// Returns `true` if every actor was persisted.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl GameRuntime {
    /// Flush the dirty state of every live actor.
    ///
    /// Actors are flushed in batches of
    /// [`save_batch_size`](crate::config::RuntimeConfig::save_batch_size);
    /// each flush is a task in the actor's mailbox. Failed actors keep their
    /// dirty state and are retried by the next pass.
    pub async fn save_all(&self) -> SaveReport {
        let mut report = SaveReport::default();
        let actors = self.actors().snapshot();
        let batch_size = self.config().save_batch_size;

        for batch in actors.chunks(batch_size) {
            let pending = batch.iter().map(|actor| async move {
                let key = actor.key();
                let result = actor
                    .call("save".into(), false, None, |cell| {
                        async move { Ok(cell.flush().await) }.boxed()
                    })
                    .await;
                (key, result)
            });
            for (key, result) in join_all(pending).await {
                match result {
                    Ok(Ok(states)) => {
                        report.actors += 1;
                        report.states += states;
                    }
                    Ok(Err(e)) => {
                        warn!(actor = %key, error = %e, "save failed");
                        report.failed.push(key);
                    }
                    Err(e) => debug!(actor = %key, error = %e, "actor gone before save"),
                }
            }
        }

        if report.states > 0 || !report.is_clean() {
            info!(
                actors = report.actors,
                states = report.states,
                failed = report.failed.len(),
                "save pass finished"
            );
        }
        report
    }

    /// Evict entity actors that are offline and idle past
    /// [`idle_timeout`](crate::config::RuntimeConfig::idle_timeout).
    ///
    /// Global actors are never evicted. Returns the number of evicted actors.
    pub async fn check_idle(&self) -> usize {
        let idle_timeout = self.config().idle_timeout;
        let candidates: Vec<_> = self
            .actors()
            .snapshot()
            .into_iter()
            .filter(|actor| !actor.key().is_global())
            .collect();

        let pending = candidates.iter().map(|actor| {
            actor.call("idle_check".into(), false, None, move |cell| {
                async move {
                    if cell.is_online() || cell.idle_for() < idle_timeout {
                        return Ok(false);
                    }
                    let written = cell.shut_down(DeactivationReason::IdleTimeout).await?;
                    Ok(written.is_some())
                }
                .boxed()
            })
        });

        let mut evicted = 0;
        for result in join_all(pending).await {
            match result {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => debug!(error = %e, "idle check skipped"),
            }
        }
        if evicted > 0 {
            info!(evicted, remaining = self.actors().len(), "idle actors evicted");
        }
        evicted
    }

    /// Start the save and idle loops. They hold the runtime weakly and stop
    /// on shutdown.
    pub(crate) fn spawn_maintenance(&self) {
        let shared = self.shared();
        let config = shared.config();

        let save = tokio::spawn(run_periodic(
            Arc::downgrade(shared),
            config.save_interval,
            "save",
            |runtime| async move { runtime.save_all().await.actors }.boxed(),
        ));
        shared.add_background(save);

        let idle = tokio::spawn(run_periodic(
            Arc::downgrade(shared),
            config.idle_check_interval,
            "idle",
            |runtime| async move { runtime.check_idle().await }.boxed(),
        ));
        shared.add_background(idle);
    }
}

async fn run_periodic<F>(runtime: Weak<RuntimeShared>, period: Duration, name: &'static str, pass: F)
where
    F: Fn(GameRuntime) -> futures::future::BoxFuture<'static, usize> + Send + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(shared) = runtime.upgrade() else {
            return;
        };
        if shared.is_shutting_down() {
            return;
        }
        let count = pass(GameRuntime::from_shared(shared)).await;
        debug!(loop_name = name, count, "maintenance pass");
    }
}
