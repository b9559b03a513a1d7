use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::debounce::Debouncer;

pub const RESIZE_DELAY: Duration = Duration::from_millis(10);

/// Geometry used to size the message input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputMetrics {
    pub line_height: u32,
    pub padding: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl Default for InputMetrics {
    fn default() -> Self {
        Self {
            line_height: 24,
            padding: 16,
            min_height: 40,
            max_height: 150,
        }
    }
}

impl InputMetrics {
    pub fn height_for(&self, draft: &str) -> u32 {
        // A trailing newline still occupies a visible line.
        let lines = draft.split('\n').count() as u32;
        lines
            .saturating_mul(self.line_height)
            .saturating_add(self.padding)
            .clamp(self.min_height, self.max_height)
    }
}

/// Message draft plus the debounced input height derived from it.
#[derive(Debug)]
pub struct Composer {
    draft: String,
    metrics: InputMetrics,
    height: Arc<watch::Sender<u32>>,
    resize: Debouncer,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(InputMetrics::default())
    }
}

impl Composer {
    pub fn new(metrics: InputMetrics) -> Self {
        let (height, _) = watch::channel(metrics.min_height);
        Self {
            draft: String::new(),
            metrics,
            height: Arc::new(height),
            resize: Debouncer::new(),
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the draft and schedule a height recomputation.
    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
        let height = self.metrics.height_for(&self.draft);
        let tx = self.height.clone();
        self.resize.schedule(RESIZE_DELAY, move || {
            tx.send_replace(height);
        });
    }

    /// Take the draft for sending, leaving the composer empty.
    pub fn take(&mut self) -> String {
        let draft = std::mem::take(&mut self.draft);
        self.set_draft(String::new());
        draft
    }

    /// Drop the draft and any pending resize.
    pub fn reset(&mut self) {
        self.resize.cancel();
        self.draft.clear();
        self.height.send_replace(self.metrics.min_height);
    }

    pub fn height(&self) -> watch::Receiver<u32> {
        self.height.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_height_is_clamped() {
        let metrics = InputMetrics::default();
        assert_eq!(metrics.height_for(""), 40);
        assert_eq!(metrics.height_for("one\ntwo"), 64);
        assert_eq!(metrics.height_for(&"line\n".repeat(20)), 150);
    }

    #[tokio::test(start_paused = true)]
    async fn test_height_follows_last_edit() {
        let mut composer = Composer::default();
        let height = composer.height();

        composer.set_draft("a");
        composer.set_draft("a\nb");
        composer.set_draft("a\nb\nc");
        assert_eq!(*height.borrow(), 40);

        tokio::time::sleep(RESIZE_DELAY * 2).await;
        assert_eq!(*height.borrow(), 88);
        assert_eq!(composer.draft(), "a\nb\nc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_resize() {
        let mut composer = Composer::default();
        let height = composer.height();

        composer.set_draft("a\nb\nc\nd");
        composer.reset();
        tokio::time::sleep(RESIZE_DELAY * 2).await;
        assert_eq!(*height.borrow(), 40);
        assert_eq!(composer.draft(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_empties_draft() {
        let mut composer = Composer::default();
        composer.set_draft("What was Q1 revenue?");
        assert_eq!(composer.take(), "What was Q1 revenue?");
        assert_eq!(composer.draft(), "");
    }
}
