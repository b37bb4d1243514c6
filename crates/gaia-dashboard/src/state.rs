use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::registry::JobRegistry;

pub type CancelListener = Box<dyn FnOnce() + Send>;

/// Everything behind the dashboard lock.
pub struct DashboardState {
    pub registry: JobRegistry,
    cancelled: bool,
    listeners: Vec<CancelListener>,
    failure: Option<Error>,
}

impl DashboardState {
    pub fn new(registry: JobRegistry) -> Self {
        Self {
            registry,
            cancelled: false,
            listeners: Vec::new(),
            failure: None,
        }
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn add_listener(&mut self, listener: CancelListener) {
        self.listeners.push(listener);
    }

    /// Removes the listeners so they can run without the lock held.
    pub fn take_listeners(&mut self) -> Vec<CancelListener> {
        std::mem::take(&mut self.listeners)
    }

    pub fn set_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Keeps the first fatal render failure; later ones are consequences of it.
    pub fn record_failure(&mut self, err: Error) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }
}

pub fn lock(state: &Mutex<DashboardState>) -> MutexGuard<'_, DashboardState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
