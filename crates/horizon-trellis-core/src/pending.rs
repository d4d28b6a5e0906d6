//! Asynchronous values.
//!
//! Futures returned by asynchronous computeds, and values handed to
//! [`Store::set_async`], are parked in a [`FuturesUnordered`] owned by the
//! store. Nothing runs them in the background: the application drives them
//! with [`Store::poll_pending`] from its own loop, or awaits
//! [`Store::settle`]. Each settled future resumes the propagation it
//! interrupted. A rejected future is logged and changes nothing.

use std::future::Future;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};

use crate::deps::Owner;
use crate::error::ComputeError;
use crate::logging::targets;
use crate::propagate::SyncConfig;
use crate::store::Store;
use crate::value::Value;

/// What to do with a value once its future settles.
#[derive(Debug)]
pub(crate) enum Continuation {
    /// Resume propagation of a computed result at `key`.
    Update {
        key: String,
        owner: Owner,
        prop: String,
        sync: Option<SyncConfig>,
    },
    /// Store the value at `path` as a regular write.
    Assign { path: String },
}

impl Continuation {
    fn key(&self) -> &str {
        match self {
            Self::Update { key, .. } => key,
            Self::Assign { path } => path,
        }
    }
}

/// A settled future with its continuation.
pub(crate) struct Settled {
    outcome: Result<Value, ComputeError>,
    continuation: Continuation,
}

impl Store {
    /// Park the pending result of a computed at `key`.
    pub(crate) fn enqueue_update(
        &self,
        future: BoxFuture<'static, Result<Value, ComputeError>>,
        key: &str,
        owner: &Owner,
        prop: &str,
        sync: Option<SyncConfig>,
    ) {
        self.park(
            future,
            Continuation::Update {
                key: key.to_string(),
                owner: owner.clone(),
                prop: prop.to_string(),
                sync,
            },
        );
    }

    fn park(&self, future: BoxFuture<'static, Result<Value, ComputeError>>, continuation: Continuation) {
        tracing::trace!(target: targets::PENDING, key = continuation.key(), "value pending");
        let settled = future.map(move |outcome| Settled { outcome, continuation });
        self.inner.pending.lock().push(settled.boxed());
    }

    /// Store the value produced by `future` at `path` once it settles.
    ///
    /// Until then the path keeps its current value. When the future resolves
    /// the write behaves exactly like [`set`](Self::set); when it fails, a
    /// warning is logged and nothing changes.
    pub fn set_async<F>(&self, path: &str, future: F)
    where
        F: Future<Output = Result<Value, ComputeError>> + Send + 'static,
    {
        self.park(future.boxed(), Continuation::Assign { path: path.to_string() });
    }

    /// Number of futures not yet settled.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Poll every parked future once and apply those that have settled.
    /// Returns how many were applied.
    pub fn poll_pending(&self) -> usize {
        let mut cx = Context::from_waker(futures_util::task::noop_waker_ref());
        let mut applied = 0;
        loop {
            match self.poll_once(&mut cx) {
                Poll::Ready(Some(settled)) => {
                    self.apply(settled);
                    applied += 1;
                }
                Poll::Ready(None) | Poll::Pending => break,
            }
        }
        applied
    }

    /// Wait until every parked future has settled and been applied,
    /// including futures parked while applying earlier ones.
    pub async fn settle(&self) {
        loop {
            let next = std::future::poll_fn(|cx| {
                if self.inner.pending.lock().is_empty() {
                    return Poll::Ready(None);
                }
                self.poll_once(cx)
            })
            .await;
            match next {
                Some(settled) => self.apply(settled),
                None => break,
            }
        }
    }

    /// Poll the parked set without holding its lock, so futures may park
    /// further values while they run.
    fn poll_once(&self, cx: &mut Context<'_>) -> Poll<Option<Settled>> {
        let mut polled = std::mem::take(&mut *self.inner.pending.lock());
        let next = polled.poll_next_unpin(cx);
        let mut pending = self.inner.pending.lock();
        let parked_meanwhile = std::mem::replace(&mut *pending, polled);
        pending.extend(parked_meanwhile);
        next
    }

    fn apply(&self, settled: Settled) {
        let Settled { outcome, continuation } = settled;
        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(target: targets::PENDING, key = continuation.key(), %err, "asynchronous value rejected");
                return;
            }
        };
        tracing::trace!(target: targets::PENDING, key = continuation.key(), "value settled");
        match continuation {
            Continuation::Update { key, owner, prop, sync } => {
                self.update(Some(value), &key, false, &owner, &prop, sync.as_ref());
            }
            Continuation::Assign { path } => {
                if !self.set(&path, value) {
                    tracing::debug!(target: targets::PENDING, %path, "settled value could not be stored");
                }
            }
        }
    }
}
