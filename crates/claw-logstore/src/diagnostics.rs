//! Injected logging capability.
//!
//! Components receive a [`Diagnostics`] at construction and emit their
//! `tracing` events inside it, so a store can be pointed at its own
//! subscriber without touching the process-wide default.

use tracing::Dispatch;

/// A handle to the `tracing` dispatcher a component logs through.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    dispatch: Dispatch,
}

impl Diagnostics {
    /// Logs through the given dispatcher.
    #[must_use]
    pub const fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Captures the calling thread's current default dispatcher.
    #[must_use]
    pub fn current() -> Self {
        tracing::dispatcher::get_default(|dispatch| Self::new(dispatch.clone()))
    }

    /// Discards every event.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Dispatch::none())
    }

    /// Runs `f` with this dispatcher as the thread's default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::current()
    }
}
