//! Trailing-edge debounce.
//!
//! A [`Debouncer`] delays its action until no call has arrived for `wait`.
//! Each call cancels the timer scheduled by the previous call for the same
//! key and schedules a new one carrying the newest arguments. When the
//! timer fires the action runs once and its result is handed to every
//! caller of the burst.
//!
//! Timers are Tokio tasks, so calls must be made from within a runtime.
//! Tests drive them deterministically with a paused clock.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Action<T, R> = Arc<dyn Fn(T) -> BoxFuture<'static, R> + Send + Sync>;
type PendingMap<K, R> = Arc<Mutex<HashMap<K, Pending<R>>>>;

/// The scheduled invocation never delivered a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DebounceError {
    /// The timer task was dropped before running (runtime shutdown or panic)
    #[error("debounced invocation was dropped before completing")]
    Dropped,
}

/// Timer and waiters for the burst currently open on one key.
struct Pending<R> {
    generation: u64,
    timer: JoinHandle<()>,
    waiters: Vec<oneshot::Sender<R>>,
}

/// Rate limiter that runs its action once per burst of calls.
///
/// Bursts are tracked per key: calls with different keys never cancel each
/// other. Use [`debounce`] for the single-key form.
pub struct Debouncer<K, T, R> {
    action: Action<T, R>,
    wait: Duration,
    pending: PendingMap<K, R>,
    generation: AtomicU64,
}

/// Wrap `action` so it runs only after `wait` without further calls.
pub fn debounce<T, R, F, Fut>(action: F, wait: Duration) -> Debouncer<(), T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    Debouncer::new(wait, action)
}

impl<K, T, R> Debouncer<K, T, R>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn new<F, Fut>(wait: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let action: Action<T, R> =
            Arc::new(move |args| -> BoxFuture<'static, R> { Box::pin(action(args)) });
        Self {
            action,
            wait,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Schedule the action for `key` with `args`, replacing any pending call.
    ///
    /// Registration happens before this returns; the returned future only
    /// waits for the burst's result.
    pub fn call_keyed(
        &self,
        key: K,
        args: T,
    ) -> impl Future<Output = Result<R, DebounceError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.wait;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);

            let mut waiters = match pending.remove(&key) {
                Some(previous) => {
                    previous.timer.abort();
                    previous.waiters
                }
                None => Vec::new(),
            };
            waiters.push(tx);

            // Spawned while the map is locked, so the timer always finds its entry.
            let timer = tokio::spawn(fire(
                Arc::clone(&self.pending),
                Arc::clone(&self.action),
                key.clone(),
                generation,
                args,
                deadline,
            ));

            pending.insert(
                key,
                Pending {
                    generation,
                    timer,
                    waiters,
                },
            );
        }

        async move { rx.await.map_err(|_| DebounceError::Dropped) }
    }

    /// Number of keys with a timer still waiting to fire.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The configured quiet period.
    pub fn wait(&self) -> Duration {
        self.wait
    }
}

impl<T, R> Debouncer<(), T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Schedule the action with `args`, replacing any pending call.
    pub fn call(&self, args: T) -> impl Future<Output = Result<R, DebounceError>> + Send + 'static {
        self.call_keyed((), args)
    }
}

impl<K, T, R> fmt::Debug for Debouncer<K, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

/// Timer body: wait out the quiet period, then run the burst's last call.
async fn fire<K, T, R>(
    pending: PendingMap<K, R>,
    action: Action<T, R>,
    key: K,
    generation: u64,
    args: T,
    deadline: Instant,
) where
    K: Eq + Hash,
    R: Clone,
{
    tokio::time::sleep_until(deadline).await;

    let waiters = {
        let mut pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.get(&key) {
            Some(entry) if entry.generation == generation => pending
                .remove(&key)
                .map(|entry| entry.waiters)
                .unwrap_or_default(),
            // Superseded between waking up and taking the lock
            _ => return,
        }
    };

    let result = action(args).await;

    let mut waiters = waiters;
    if let Some(last) = waiters.pop() {
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        let _ = last.send(result);
    }
}
