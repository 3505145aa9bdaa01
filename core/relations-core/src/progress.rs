use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Caller-supplied progress sink for long-running index passes. Checked for
/// cancellation between entity types.
pub trait Progress: Send + Sync {
    fn begin(&self, _task: &str, _total_units: usize) {}

    fn worked(&self, _units: usize) {}

    fn is_cancelled(&self) -> bool {
        false
    }

    fn done(&self) {}
}

/// Ignores everything and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl Progress for NullProgress {}

/// Progress handle with a cancel switch that other threads can flip.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
    worked: AtomicUsize,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn units_worked(&self) -> usize {
        self.worked.load(Ordering::SeqCst)
    }
}

impl Progress for CancelFlag {
    fn begin(&self, _task: &str, _total_units: usize) {
        self.worked.store(0, Ordering::SeqCst);
    }

    fn worked(&self, units: usize) {
        self.worked.fetch_add(units, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
