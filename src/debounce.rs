use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs the most recently scheduled task after a quiet period.
///
/// At most one task is pending; scheduling again aborts the previous one.
/// Must be used from within a tokio runtime.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&mut self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const DELAY: Duration = Duration::from_millis(10);

    fn counting(counter: &Arc<AtomicUsize>, value: usize) -> impl FnOnce() + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.store(value, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_scheduled_task_runs() {
        let last = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new();

        for value in 1..=5 {
            debouncer.schedule(DELAY, counting(&last, value));
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        assert_eq!(last.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(DELAY).await;
        assert_eq!(last.load(Ordering::SeqCst), 5);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_prevent_execution() {
        let last = Arc::new(AtomicUsize::new(0));

        let mut debouncer = Debouncer::new();
        debouncer.schedule(DELAY, counting(&last, 1));
        debouncer.cancel();
        assert!(!debouncer.is_pending());

        debouncer.schedule(DELAY, counting(&last, 2));
        drop(debouncer);

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(last.load(Ordering::SeqCst), 0);
    }
}
