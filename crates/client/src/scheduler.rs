//! Delayed connectivity re-checks.
//!
//! A 401 or a refused connection schedules a re-check through the
//! [`ConnectivityChecker`] port. Each scheduled check is a tokio task whose
//! abort handle is kept until it runs, so pending checks can be counted and
//! cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

use atelier_core::{ConnectionContext, ConnectivityChecker};

/// Parameters of one re-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recheck {
    /// Discard the current session before checking.
    pub force: bool,
    /// Connection to check; `None` checks every known connection.
    pub context: Option<ConnectionContext>,
    /// Namespace override of the client that triggered the check.
    pub namespace: Option<String>,
}

type PendingChecks = Arc<Mutex<HashMap<Uuid, AbortHandle>>>;

/// Handle to a scheduled re-check.
#[derive(Debug, Clone)]
pub struct ScheduledRecheck {
    id: Uuid,
    handle: AbortHandle,
    pending: PendingChecks,
}

impl ScheduledRecheck {
    /// Unique id of the scheduled task.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancels the re-check if it has not fired yet.
    pub fn abort(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        self.handle.abort();
    }
}

/// Spawns delayed re-checks against a [`ConnectivityChecker`].
///
/// Overlapping re-checks are not merged: two 401s in a row schedule two
/// checks. Callers wanting at most one can [`cancel_all`](Self::cancel_all)
/// before scheduling.
pub struct RecheckScheduler {
    checker: Arc<dyn ConnectivityChecker>,
    pending: PendingChecks,
}

impl RecheckScheduler {
    /// Creates a scheduler dispatching to `checker`.
    pub fn new(checker: Arc<dyn ConnectivityChecker>) -> Self {
        Self {
            checker,
            pending: Arc::default(),
        }
    }

    /// Runs `recheck` after `delay` on the current tokio runtime.
    pub fn schedule(&self, delay: Duration, recheck: Recheck) -> ScheduledRecheck {
        let id = Uuid::new_v4();
        let checker = Arc::clone(&self.checker);
        let pending = Arc::clone(&self.pending);
        debug!(
            recheck_id = %id,
            force = recheck.force,
            delay_ms = delay.as_millis() as u64,
            "Scheduling connectivity re-check"
        );

        // Hold the lock across the spawn so the task cannot finish and
        // deregister before it is registered.
        let mut tasks = pending.lock().unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn({
            let pending = Arc::clone(&self.pending);
            async move {
                tokio::time::sleep(delay).await;
                pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
                debug!(recheck_id = %id, "Running connectivity re-check");
                checker
                    .check_connection(recheck.force, recheck.context, recheck.namespace)
                    .await;
            }
        });
        let handle = task.abort_handle();
        tasks.insert(id, handle.clone());
        ScheduledRecheck {
            id,
            handle,
            pending: Arc::clone(&pending),
        }
    }

    /// Number of re-checks that have not fired yet.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Cancels every re-check that has not fired yet.
    pub fn cancel_all(&self) {
        let mut tasks = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RecheckScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecheckScheduler")
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
