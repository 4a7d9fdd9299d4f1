// src/cancel.rs
// 协作式取消：在让出点检查的共享标志
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked at every yield point of a long-running task.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arms the token for the next task.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Hooks a library search calls while it runs.
pub trait SearchObserver {
    /// Called before entry `index` of `total` is scored, and once more with
    /// `index == total` when the scan finishes.
    fn on_progress(&mut self, _index: usize, _total: usize) {}

    /// Checked before every entry.
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Called after every 10 entries.
    fn on_yield(&mut self) {}
}

/// Observer that never cancels and ignores progress.
pub struct NoProgress;

impl SearchObserver for NoProgress {}

impl SearchObserver for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}
