//! Cancellable one-shot scheduled tasks.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

/// Handle to a task that runs `action` after a delay.
///
/// Cancelling (or dropping) the handle aborts the task if it has not fired.
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `action` once `delay` has elapsed, counted from this call. Must be
    /// called inside a tokio runtime.
    pub fn schedule<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = time::Instant::now() + delay;
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            action().await;
        });
        Self { handle }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A single re-armable timer slot.
///
/// Arming always cancels the previous task first, so at most one is live.
/// Each arm bumps a generation number; the scheduled action receives it so
/// a firing that raced with a re-arm can be recognised as stale.
#[derive(Default)]
pub struct TimerSlot {
    task: Option<ScheduledTask>,
    generation: u64,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any pending task and schedule a new one.
    pub fn arm<F, Fut>(&mut self, delay: Duration, action: F) -> u64
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        self.task = Some(ScheduledTask::schedule(delay, move || action(generation)));
        generation
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// Consume a firing. Returns `true` only for the current generation; the
    /// slot is then disarmed.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.task.is_some() && generation == self.generation {
            self.task = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_fires_after_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _task = ScheduledTask::schedule(Duration::from_secs(5), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_cancel() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let task = ScheduledTask::schedule(Duration::from_secs(1), move || async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        task.cancel();

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_slot_rearm_keeps_single_task() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut slot = TimerSlot::new();

        let h = hits.clone();
        let first = slot.arm(Duration::from_secs(5), move |_| async move {
            h.fetch_add(1, Ordering::SeqCst);
        });
        time::sleep(Duration::from_secs(3)).await;

        let h = hits.clone();
        let second = slot.arm(Duration::from_secs(5), move |_| async move {
            h.fetch_add(10, Ordering::SeqCst);
        });
        assert_ne!(first, second);

        // The first deadline passes without firing.
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_timer_slot_fire_rejects_stale_generation() {
        let mut slot = TimerSlot::new();
        let old = slot.arm(Duration::from_secs(60), |_| async {});
        let current = slot.arm(Duration::from_secs(60), |_| async {});

        assert!(!slot.fire(old));
        assert!(slot.is_armed());
        assert!(slot.fire(current));
        assert!(!slot.is_armed());
        assert!(!slot.fire(current));
    }
}
