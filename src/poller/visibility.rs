use std::sync::Arc;
use tokio::sync::watch;

/// Whether the surface the poller serves is currently in front of the user.
///
/// The watch channel carries the *hidden* state; a change from `true` to
/// `false` is the "became visible" transition the poller reacts to.
pub trait Visibility: Send + Sync + 'static {
    fn is_hidden(&self) -> bool;
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A surface that is never hidden.
pub struct AlwaysVisible {
    // Keeps subscribers' channel open so `changed()` pends instead of erroring.
    tx: watch::Sender<bool>,
}

impl AlwaysVisible {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }
}

impl Default for AlwaysVisible {
    fn default() -> Self {
        Self::new()
    }
}

impl Visibility for AlwaysVisible {
    fn is_hidden(&self) -> bool {
        false
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Channel-backed visibility whose state is driven by the owner of the real
/// signal.
#[derive(Clone)]
pub struct VisibilityHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl VisibilityHandle {
    pub fn new(hidden: bool) -> Self {
        let (tx, _rx) = watch::channel(hidden);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.tx.send_if_modified(|current| {
            if *current == hidden {
                return false;
            }
            *current = hidden;
            true
        });
    }
}

impl Visibility for VisibilityHandle {
    fn is_hidden(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
