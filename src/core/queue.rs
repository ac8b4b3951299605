//! Per-user turn queue.
//!
//! Every user gets a FIFO of pending turns and at most one drain loop. The
//! loop takes turns one at a time and hands them to the dispatcher, so a
//! user never has two backend calls in flight, while different users are
//! served concurrently.
//!
//! Both maps sit behind one mutex that is never held across an await. The
//! "is a loop running? if not, start one" check in `enqueue` and the "queue
//! empty? then forget this user" check in the loop both happen under it, so
//! a turn can never be stranded in a queue with no loop to drain it.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use super::dispatcher::Dispatcher;
use super::turn::{PendingTurn, UserId};

#[derive(Default)]
struct QueueState {
    queues: HashMap<UserId, VecDeque<PendingTurn>>,
    /// Users with an active drain loop.
    busy: HashSet<UserId>,
}

struct Inner {
    state: Mutex<QueueState>,
    dispatcher: Arc<Dispatcher>,
    idle: Notify,
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Serializes turns per user. Cheap to clone; clones share the queues.
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl QueueManager {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                dispatcher,
                idle: Notify::new(),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Append `turn` to `user`'s queue, starting a drain loop if none is
    /// running. Returns as soon as the turn is queued.
    pub async fn enqueue(&self, user: UserId, turn: PendingTurn) {
        let turn_id = turn.id.clone();
        let start_loop = {
            let mut state = self.inner.state.lock().await;
            let queue = state.queues.entry(user.clone()).or_default();
            queue.push_back(turn);
            let depth = queue.len();
            let start = state.busy.insert(user.clone());
            tracing::debug!(
                "Enqueued turn {} for {} (depth {}, {})",
                turn_id,
                user,
                depth,
                if start { "starting drain" } else { "drain active" }
            );
            start
        };

        if start_loop {
            tokio::spawn(drain(self.inner.clone(), user));
        }
    }

    /// Resolve once no user has an active drain loop.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.state.lock().await.busy.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Whether any queue or busy entry exists for `user`.
    pub async fn is_tracked(&self, user: &UserId) -> bool {
        let state = self.inner.state.lock().await;
        state.queues.contains_key(user) || state.busy.contains(user)
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().await;
        QueueStats {
            active_users: state.busy.len(),
            pending_turns: state.queues.values().map(VecDeque::len).sum(),
            processed: self.inner.processed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}

/// Drain `user`'s queue one turn at a time, then drop both entries.
async fn drain(inner: Arc<Inner>, user: UserId) {
    tracing::debug!("Drain loop started for {}", user);

    loop {
        let turn = {
            let mut state = inner.state.lock().await;
            match state.queues.get_mut(&user).and_then(VecDeque::pop_front) {
                Some(turn) => turn,
                None => {
                    state.queues.remove(&user);
                    state.busy.remove(&user);
                    break;
                }
            }
        };

        let turn_id = turn.id.clone();
        let dispatcher = inner.dispatcher.clone();
        // Spawned so a panicking turn surfaces as a JoinError instead of
        // killing the loop.
        let outcome = tokio::spawn(async move { dispatcher.dispatch(turn).await }).await;

        match outcome {
            Ok(Ok(report)) => {
                inner.processed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "Turn {} for {} done: {} chunk(s) sent",
                    report.turn_id,
                    user,
                    report.chunks_sent
                );
            }
            Ok(Err(e)) => {
                inner.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Error processing turn {} for {}: {}", turn_id, user, e);
            }
            Err(e) => {
                inner.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Turn {} for {} aborted: {}", turn_id, user, e);
            }
        }
    }

    tracing::debug!("Drain loop finished for {}", user);
    inner.idle.notify_waiters();
}

/// Queue statistics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub active_users: usize,
    pub pending_turns: usize,
    pub processed: u64,
    pub failed: u64,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Queue Stats:")?;
        writeln!(f, "  Active users:  {}", self.active_users)?;
        writeln!(f, "  Pending turns: {}", self.pending_turns)?;
        writeln!(f, "  Processed:     {}", self.processed)?;
        write!(f, "  Failed:        {}", self.failed)
    }
}
