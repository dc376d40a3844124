//! Registry of background refresh tasks.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};

/// Tracks spawned background work so shutdown can wait for it.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
  set: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
    self.set.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Spawn `fut` onto the runtime and register it.
  pub fn spawn<F>(&self, label: &'static str, fut: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let mut set = self.lock();
    // Reap whatever already finished so the set doesn't grow unbounded
    while let Some(done) = set.try_join_next() {
      if let Err(e) = done {
        warn!(task = label, "background task failed: {}", e);
      }
    }
    set.spawn(fut.instrument(tracing::debug_span!("background", task = label)));
  }

  /// Number of tasks not yet joined.
  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Wait for every registered task, including ones spawned while waiting.
  pub async fn join_all(&self) {
    loop {
      let mut set = std::mem::take(&mut *self.lock());
      if set.is_empty() {
        return;
      }
      debug!(pending = set.len(), "waiting for background tasks");
      while let Some(done) = set.join_next().await {
        if let Err(e) = done {
          warn!("background task failed: {}", e);
        }
      }
    }
  }

  /// Like [`join_all`](Self::join_all), but gives up after `grace`.
  ///
  /// Tasks still running at the deadline are aborted; their count is
  /// returned.
  pub async fn drain(&self, grace: Duration) -> usize {
    let deadline = Instant::now() + grace;
    loop {
      let mut set = std::mem::take(&mut *self.lock());
      if set.is_empty() {
        return 0;
      }
      while !set.is_empty() {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
          Ok(Some(Err(e))) => warn!("background task failed: {}", e),
          Ok(_) => {}
          Err(_) => {
            // Dropping a JoinSet aborts whatever it still holds
            let late = std::mem::take(&mut *self.lock());
            return set.len() + late.len();
          }
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[tokio::test]
  async fn test_join_all_waits_for_spawned_tasks() {
    let tasks = BackgroundTasks::new();
    let done = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
      let done = done.clone();
      tasks.spawn("count", async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        done.fetch_add(1, Ordering::SeqCst);
      });
    }
    assert_eq!(tasks.len(), 3);

    tasks.join_all().await;
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert!(tasks.is_empty());
  }

  #[tokio::test]
  async fn test_join_all_picks_up_nested_spawns() {
    let tasks = BackgroundTasks::new();
    let done = Arc::new(AtomicU32::new(0));

    let inner_tasks = tasks.clone();
    let inner_done = done.clone();
    tasks.spawn("outer", async move {
      inner_tasks.spawn("inner", async move {
        inner_done.fetch_add(1, Ordering::SeqCst);
      });
    });

    tasks.join_all().await;
    assert_eq!(done.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_panicking_task_does_not_poison_registry() {
    let tasks = BackgroundTasks::new();
    tasks.spawn("panics", async { panic!("refresh exploded") });
    tasks.join_all().await;
    assert!(tasks.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_drain_gives_up_after_grace() {
    let tasks = BackgroundTasks::new();
    let done = Arc::new(AtomicU32::new(0));

    let quick = done.clone();
    tasks.spawn("quick", async move {
      tokio::time::sleep(Duration::from_millis(10)).await;
      quick.fetch_add(1, Ordering::SeqCst);
    });
    let stuck = done.clone();
    tasks.spawn("stuck", async move {
      tokio::time::sleep(Duration::from_secs(60)).await;
      stuck.fetch_add(1, Ordering::SeqCst);
    });

    let started = Instant::now();
    assert_eq!(tasks.drain(Duration::from_secs(1)).await, 1);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert!(tasks.is_empty());
  }

  #[tokio::test]
  async fn test_drain_finishes_early_when_idle() {
    let tasks = BackgroundTasks::new();
    tasks.spawn("noop", async {});
    assert_eq!(tasks.drain(Duration::from_secs(5)).await, 0);
  }
}
