use std::sync::atomic::{AtomicBool, Ordering};

/// Reports whether the app is currently in front of the user.
///
/// Automatic indexing passes are skipped while this returns `true`.
pub trait LifecycleState: Send + Sync {
    fn is_foreground(&self) -> bool;
}

/// Foreground flag driven by the host's start/stop callbacks.
#[derive(Debug, Default)]
pub struct AppLifecycle {
    foreground: AtomicBool,
}

impl AppLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(&self) {
        self.foreground.store(true, Ordering::SeqCst);
        log::debug!("[Lifecycle] App moved to foreground");
    }

    pub fn on_stop(&self) {
        self.foreground.store(false, Ordering::SeqCst);
        log::debug!("[Lifecycle] App moved to background");
    }
}

impl LifecycleState for AppLifecycle {
    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }
}
