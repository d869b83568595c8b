//! Timer tasks that post fires into actor mailboxes.

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Weak;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use super::TimerId;
use crate::actor::EntityKey;
use crate::error::ActorError;
use crate::event::Payload;
use crate::runtime::RuntimeShared;

/// Shortest period between two fires of a repeating timer.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// When and how often a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSpec {
    /// Wait before the first fire.
    pub delay: Duration,
    /// Period between fires; `None` fires once.
    pub interval: Option<Duration>,
    /// Maximum number of fires; `None` is unbounded.
    pub repeat: Option<u32>,
}

impl TimerSpec {
    /// Fire once after `delay`.
    pub fn once(delay: Duration) -> Self {
        Self {
            delay,
            interval: None,
            repeat: Some(1),
        }
    }

    /// Fire after `delay`, then every `interval`, at most `repeat` times.
    pub fn repeating(delay: Duration, interval: Duration, repeat: Option<u32>) -> Self {
        Self {
            delay,
            interval: Some(interval.max(MIN_INTERVAL)),
            repeat,
        }
    }

    fn is_last(&self, fired: u32) -> bool {
        self.interval.is_none() || self.repeat.is_some_and(|limit| fired >= limit)
    }
}

/// Owns the background task of every scheduled timer.
///
/// A timer never runs its callback itself: each fire is posted to the
/// owning actor's mailbox. Cancelling stops future fires; a fire already
/// queued still runs.
#[derive(Debug, Default)]
pub struct TimerScheduler {
    next_id: AtomicU64,
    tasks: DashMap<TimerId, AbortHandle>,
    closed: AtomicBool,
}

impl TimerScheduler {
    /// Create a scheduler with no timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer firing handler `handler` on the actor `key`.
    pub(crate) fn schedule(
        &self,
        runtime: Weak<RuntimeShared>,
        key: EntityKey,
        handler: &'static str,
        spec: TimerSpec,
        param: Payload,
    ) -> Result<TimerId, ActorError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ActorError::ShuttingDown);
        }
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        // The task waits until its handle is registered, so its own
        // `finished` call can never run before the insert.
        let (registered, gate) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            if gate.await.is_ok() {
                run_timer(runtime, id, key, handler, spec, param).await;
            }
        });
        self.tasks.insert(id, task.abort_handle());
        let _ = registered.send(());
        Ok(id)
    }

    /// Stop future fires of `id`. Returns `false` for unknown or finished
    /// timers.
    pub fn unschedule(&self, id: TimerId) -> bool {
        match self.tasks.remove(&id) {
            Some((_, task)) => {
                task.abort();
                trace!(%id, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of timers still running.
    pub fn active(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every timer and refuse new ones.
    pub(crate) fn cancel_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let ids: Vec<TimerId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.unschedule(*id)).count()
    }

    fn finished(&self, id: TimerId) {
        self.tasks.remove(&id);
    }
}

async fn run_timer(
    runtime: Weak<RuntimeShared>,
    id: TimerId,
    key: EntityKey,
    handler: &'static str,
    spec: TimerSpec,
    param: Payload,
) {
    tokio::time::sleep(spec.delay).await;

    let mut fired = 0u32;
    loop {
        fired += 1;
        let last = spec.is_last(fired);

        let Some(shared) = runtime.upgrade() else {
            return;
        };
        let Some(actor) = shared.actors().get(&key) else {
            debug!(actor = %key, %id, "timer owner gone, stopping");
            shared.timers().finished(id);
            return;
        };

        let param = param.clone();
        let posted = actor.post(Cow::Borrowed("timer"), false, move |cell| {
            async move { cell.fire_timer(id, handler, &param, last).await }.boxed()
        });
        if posted.is_err() || last {
            shared.timers().finished(id);
            return;
        }
        drop(actor);
        drop(shared);

        match spec.interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => return,
        }
    }
}
