//! Cancellation for in-progress ceremonies.
//!
//! A ceremony can block for its whole timeout waiting for someone to touch
//! their security key. [CancellationToken] lets another thread abort it.
//!
//! Backends call [CancellationToken::register] before they start waiting,
//! passing a hook which knows how to abort their particular platform call.
//! The hook stays registered until the returned [CancelRegistration] is
//! dropped.
use std::sync::{Arc, Mutex};

use crate::error::{BridgeError, Result};

type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CancelState {
    cancelled: bool,
    hook: Option<CancelHook>,
}

/// Cloneable handle used to abort a ceremony.
#[derive(Clone, Default)]
pub struct CancellationToken {
    state: Arc<Mutex<CancelState>>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the current ceremony (if any), and any ceremony started with
    /// this token in future.
    pub fn cancel(&self) {
        let hook = match self.state.lock() {
            Ok(mut s) => {
                s.cancelled = true;
                s.hook.take()
            }
            Err(e) => {
                error!("cancellation state poisoned: {:?}", e);
                return;
            }
        };

        // Run outside the lock, the hook may block on the platform.
        if let Some(hook) = hook {
            trace!("running cancel hook");
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().map(|s| s.cancelled).unwrap_or(true)
    }

    /// Fails with [BridgeError::Cancelled] if the token has been cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BridgeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Registers a `hook` to run if the token is cancelled while the
    /// returned [CancelRegistration] is alive.
    ///
    /// Fails with [BridgeError::Cancelled] without registering anything if
    /// the token was already cancelled.
    pub fn register<F>(&self, hook: F) -> Result<CancelRegistration>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut s = self.state.lock()?;
        if s.cancelled {
            return Err(BridgeError::Cancelled);
        }
        if s.hook.is_some() {
            error!("cancellation token is already in use by another ceremony");
            return Err(BridgeError::Internal);
        }
        s.hook = Some(Box::new(hook));
        Ok(CancelRegistration {
            state: self.state.clone(),
        })
    }
}

/// Keeps a cancel hook registered. Unregisters it when dropped.
#[must_use]
pub struct CancelRegistration {
    state: Arc<Mutex<CancelState>>,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let Ok(mut s) = self.state.lock() {
            s.hook = None;
        }
    }
}
