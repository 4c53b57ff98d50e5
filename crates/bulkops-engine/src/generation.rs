//! Generation tokens guarding deferred work against stale state

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Value of a tracker captured when deferred work was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Monotonic counter shared by everything that must drop results computed for old state
#[derive(Debug, Clone, Default)]
pub struct GenerationTracker {
    current: Arc<AtomicU64>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new generation, making every previously captured one stale
    pub fn advance(&self) -> Generation {
        Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

/// Runs `task` after `delay` unless the generation went stale in the meantime.
///
/// The handle resolves to `true` when the task ran.
pub fn spawn_deferred<F>(
    tracker: GenerationTracker,
    generation: Generation,
    delay: Duration,
    task: F,
) -> JoinHandle<bool>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !tracker.is_current(generation) {
            tracing::debug!(
                "Dropping deferred work for stale generation {} (current {})",
                generation.value(),
                tracker.current().value()
            );
            return false;
        }
        task.await;
        true
    })
}

/// Trailing edge debouncer: of a burst of calls only the last one runs
#[derive(Debug, Clone)]
pub struct Debouncer {
    tracker: GenerationTracker,
    window: Duration,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            tracker: GenerationTracker::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn call<F>(&self, task: F) -> JoinHandle<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.tracker.advance();
        spawn_deferred(self.tracker.clone(), generation, self.window, task)
    }
}
