use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Plan-wide abort flag. Cloned into every transport so flight bodies can
/// abort the whole plan; once set it is never cleared.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    aborted: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// First reason wins; later calls keep the flag set without replacing it.
    pub fn abort(&self, reason: Option<String>) {
        if let Ok(mut current) = self.reason.lock() {
            if current.is_none() {
                *current = reason;
            }
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }
}
