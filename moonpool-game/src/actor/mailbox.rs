//! Actor handles and the mailbox worker loop.
//!
//! Every actor owns one unbounded FIFO queue drained by exactly one tokio
//! task. Tasks are closures over the actor's [`ActorCell`]; the worker runs
//! them one at a time, in enqueue order, to completion.
//!
//! # Entry points
//!
//! - [`ActorRef::tell`]: enqueue and return immediately. Errors are logged.
//! - [`ActorRef::send`]: enqueue and await the closure's result, optionally
//!   bounded by a timeout. A timed out caller stops waiting, the task still
//!   runs.
//!
//! # Failure isolation
//!
//! A task returning `Err` or panicking is logged with its context and the
//! worker moves on to the next task.
//!
//! # Eviction
//!
//! A retired actor stops its worker. Tasks already queued behind the
//! eviction are moved to a fresh incarnation, so an accepted `tell` is
//! never dropped.

use std::borrow::Cow;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::{ActorCell, EntityKey};
use crate::error::ActorError;
use crate::runtime::RuntimeShared;

tokio::task_local! {
    static CURRENT_ACTOR: EntityKey;
}

type JobFn = Box<dyn for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, ()> + Send>;

fn job<F>(f: F) -> JobFn
where
    F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// One queued task.
pub(crate) struct Job {
    context: Cow<'static, str>,
    touch: bool,
    run: JobFn,
}

pub(crate) struct ActorInner {
    key: EntityKey,
    incarnation: u64,
    tx: mpsc::UnboundedSender<Job>,
}

/// Cloneable handle to a live actor's mailbox.
#[derive(Clone)]
pub struct ActorRef {
    inner: Arc<ActorInner>,
}

impl ActorRef {
    /// Create the mailbox and spawn its worker.
    pub(crate) fn spawn(shared: &Arc<RuntimeShared>, key: EntityKey, incarnation: u64) -> ActorRef {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ActorInner {
            key,
            incarnation,
            tx,
        });
        let cell = ActorCell::new(key, incarnation, Arc::downgrade(&inner), shared.clone());
        tokio::spawn(run_mailbox(cell, rx));
        ActorRef { inner }
    }

    pub(crate) fn from_inner(inner: Arc<ActorInner>) -> ActorRef {
        ActorRef { inner }
    }

    /// Key of the actor.
    pub fn key(&self) -> EntityKey {
        self.inner.key
    }

    pub(crate) fn incarnation(&self) -> u64 {
        self.inner.incarnation
    }

    /// Returns `true` once the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }

    /// Enqueue a fire-and-forget task.
    ///
    /// Fails only if the mailbox is closed. An error returned by the task is
    /// logged and dropped.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// actor.tell(|cell| async move {
    ///     cell.state::<RoleComponent>()?.level += 1;
    ///     Ok(())
    /// }.boxed())?;
    /// ```
    pub fn tell<F>(&self, f: F) -> Result<(), ActorError>
    where
        F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, Result<(), ActorError>> + Send + 'static,
    {
        self.post(Cow::Borrowed("tell"), true, f)
    }

    /// [`ActorRef::tell`] with a context label used when logging failures.
    pub fn tell_with<F>(&self, context: impl Into<Cow<'static, str>>, f: F) -> Result<(), ActorError>
    where
        F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, Result<(), ActorError>> + Send + 'static,
    {
        self.post(context.into(), true, f)
    }

    /// Enqueue a task and wait for its result.
    ///
    /// Fails with [`ActorError::Reentrant`] when called from a task running
    /// on this same actor, since waiting would deadlock the mailbox.
    pub async fn send<F, R>(&self, f: F) -> Result<R, ActorError>
    where
        F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, Result<R, ActorError>> + Send + 'static,
        R: Send + 'static,
    {
        self.call(Cow::Borrowed("send"), true, None, f).await
    }

    /// [`ActorRef::send`] bounded by `timeout`.
    pub async fn send_timeout<F, R>(&self, timeout: Duration, f: F) -> Result<R, ActorError>
    where
        F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, Result<R, ActorError>> + Send + 'static,
        R: Send + 'static,
    {
        self.call(Cow::Borrowed("send"), true, Some(timeout), f).await
    }

    /// [`ActorRef::send`] with a context label and an optional timeout.
    pub async fn send_with<F, R>(
        &self,
        context: impl Into<Cow<'static, str>>,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<R, ActorError>
    where
        F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, Result<R, ActorError>> + Send + 'static,
        R: Send + 'static,
    {
        self.call(context.into(), true, timeout, f).await
    }

    /// Enqueue a fire-and-forget task.
    ///
    /// `touch` is false for runtime maintenance, which must not reset the
    /// actor's idle clock.
    pub(crate) fn post<F>(&self, context: Cow<'static, str>, touch: bool, f: F) -> Result<(), ActorError>
    where
        F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, Result<(), ActorError>> + Send + 'static,
    {
        let key = self.key();
        let label = context.clone();
        self.enqueue(Job {
            context,
            touch,
            run: job(move |cell| {
                async move {
                    if let Err(e) = f(cell).await {
                        warn!(actor = %key, context = %label, error = %e, "task failed");
                    }
                }
                .boxed()
            }),
        })
    }

    pub(crate) async fn call<F, R>(
        &self,
        context: Cow<'static, str>,
        touch: bool,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<R, ActorError>
    where
        F: for<'a> FnOnce(&'a mut ActorCell) -> BoxFuture<'a, Result<R, ActorError>> + Send + 'static,
        R: Send + 'static,
    {
        let key = self.key();
        if CURRENT_ACTOR.try_with(|current| *current == key).unwrap_or(false) {
            return Err(ActorError::Reentrant(key));
        }

        let (tx, rx) = oneshot::channel();
        let label = context.clone();
        self.enqueue(Job {
            context,
            touch,
            run: job(move |cell| {
                async move {
                    let result = f(cell).await;
                    if let Err(e) = &result {
                        debug!(actor = %key, context = %label, error = %e, "task returned error");
                    }
                    // The caller may have timed out and dropped the receiver.
                    let _ = tx.send(result);
                }
                .boxed()
            }),
        })?;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(actor = %key, timeout = ?limit, "caller timed out");
                    return Err(ActorError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        match received {
            Ok(result) => result,
            Err(_) => Err(ActorError::TaskDropped(key)),
        }
    }

    fn enqueue(&self, job: Job) -> Result<(), ActorError> {
        self.inner
            .tx
            .send(job)
            .map_err(|_| ActorError::MailboxClosed(self.key()))
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("key", &self.inner.key)
            .field("incarnation", &self.inner.incarnation)
            .finish()
    }
}

/// Drain the mailbox until every handle is dropped or the actor retires.
async fn run_mailbox(mut cell: ActorCell, mut rx: mpsc::UnboundedReceiver<Job>) {
    let key = cell.key();
    debug!(actor = %key, "mailbox started");

    while let Some(Job {
        context,
        touch,
        run,
    }) = rx.recv().await
    {
        if touch {
            cell.touch();
        }

        let task = AssertUnwindSafe(run(&mut cell)).catch_unwind();
        if CURRENT_ACTOR.scope(key, task).await.is_err() {
            error!(actor = %key, context = %context, "task panicked");
            cell.repair().await;
        }

        if cell.is_retired() {
            break;
        }
    }

    rx.close();
    if cell.is_retired() {
        forward_pending(&cell, &mut rx);
    }
    debug!(actor = %key, "mailbox stopped");
}

/// Hand tasks queued behind an eviction to the actor's next incarnation.
///
/// The receiver is closed first, so later sends fail with `MailboxClosed`
/// instead of landing here.
fn forward_pending(cell: &ActorCell, rx: &mut mpsc::UnboundedReceiver<Job>) {
    let key = cell.key();
    let mut successor: Option<ActorRef> = None;
    let mut forwarded = 0usize;
    while let Ok(job) = rx.try_recv() {
        let actor = successor.get_or_insert_with(|| cell.shared().actor_for(key));
        let context = job.context.clone();
        if let Err(e) = actor.enqueue(job) {
            warn!(actor = %key, context = %context, error = %e, "queued task lost after eviction");
            continue;
        }
        forwarded += 1;
    }
    if forwarded > 0 {
        debug!(actor = %key, forwarded, "queued tasks moved to new incarnation");
    }
}
