//! Rate-limited send queue
//!
//! Tasks are admitted by a token bucket holding `limit` tokens, refilled
//! evenly over the window. Among the tasks waiting when a token frees up, the
//! one with the highest priority runs first; equal priorities run in the order
//! they were pushed.
use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    future::Future,
    num::NonZeroU32,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use tokio::{
    sync::{oneshot, Notify},
    task::JoinHandle,
};

use crate::{Error, Result};

pub type Priority = i32;

pub const PRIORITY_DEFAULT: Priority = 0;
/// Handshake lines and PONGs
pub const PRIORITY_MAX: Priority = Priority::MAX;

/// Window the gateway counts sent commands over
pub const WINDOW: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateTier {
    /// Regular users and anonymous connections
    User,
    Known,
    Moderator,
    Verified,
}

impl RateTier {
    /// Commands admitted per [`WINDOW`]
    pub fn limit(&self) -> u32 {
        match self {
            RateTier::User => 20,
            RateTier::Known => 50,
            RateTier::Moderator => 100,
            RateTier::Verified => 7500,
        }
    }

    /// Tier of the default queue, plus the tier of the separate moderator
    /// queue. Verified bots send everything through their single queue.
    pub fn select(is_known: bool, is_verified: bool) -> (RateTier, Option<RateTier>) {
        if is_verified {
            (RateTier::Verified, None)
        } else if is_known {
            (RateTier::Known, Some(RateTier::Moderator))
        } else {
            (RateTier::User, Some(RateTier::Moderator))
        }
    }
}

struct Task {
    priority: Priority,
    seq: u64,
    run: BoxFuture<'static, ()>,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Task {}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: higher priority first, then lower sequence number
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Shared {
    tasks: Mutex<BinaryHeap<Task>>,
    notify: Notify,
    closed: AtomicBool,
    seq: AtomicU64,
}

pub struct Queue {
    shared: Arc<Shared>,
    worker: JoinHandle<()>,
}

impl Queue {
    pub fn new(limit: u32, window: Duration) -> Queue {
        let burst = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(window / burst.get())
            .unwrap_or_else(|| Quota::per_second(burst))
            .allow_burst(burst);
        let limiter = RateLimiter::direct(quota);

        let shared = Arc::new(Shared::default());
        let worker = tokio::spawn(run(shared.clone(), limiter));
        Queue { shared, worker }
    }

    pub fn with_tier(tier: RateTier) -> Queue {
        Queue::new(tier.limit(), WINDOW)
    }

    /// Enqueues `task` immediately. The returned future resolves with the
    /// task's output once it has been dispatched, or fails with
    /// [`Error::QueueClosed`] if the queue is closed first.
    pub fn push<F, T>(&self, priority: Priority, task: F) -> impl Future<Output = Result<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        {
            // `closed` is only flipped under this lock, so a task pushed here
            // is either dispatched or dropped by `close`
            let mut tasks = self.shared.tasks.lock();
            if !self.shared.closed.load(AtomicOrdering::Acquire) {
                let seq = self.shared.seq.fetch_add(1, AtomicOrdering::Relaxed);
                tasks.push(Task {
                    priority,
                    seq,
                    run: async move {
                        let _ = tx.send(task.await);
                    }
                    .boxed(),
                });
                self.shared.notify.notify_one();
            }
        }
        async move { rx.await.map_err(|_| Error::QueueClosed) }
    }

    /// Number of tasks waiting for dispatch
    pub fn len(&self) -> usize {
        self.shared.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops dispatching. Every waiting task is dropped.
    pub fn close(&self) {
        let mut tasks = self.shared.tasks.lock();
        self.shared.closed.store(true, AtomicOrdering::Release);
        self.worker.abort();
        tasks.clear();
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run(shared: Arc<Shared>, limiter: DefaultDirectRateLimiter) {
    loop {
        let empty = shared.tasks.lock().is_empty();
        if empty {
            shared.notify.notified().await;
            continue;
        }
        limiter.until_ready().await;
        let task = shared.tasks.lock().pop();
        if let Some(task) = task {
            task.run.await;
        }
    }
}
