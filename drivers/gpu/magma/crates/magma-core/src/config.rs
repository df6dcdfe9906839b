//! # Configuration Results
//!
//! Sticky, non-fatal error slot carried by driver objects.
//!
//! Objects that can be created in a partially usable state (an unsupported
//! query type, a pool larger than the device can address) record the problem
//! here instead of failing construction. The first recorded error wins and is
//! reported back at the next host-facing call.

use spin::Mutex;

use crate::error::{Error, Result};

/// First-error-wins configuration result
#[derive(Debug, Default)]
pub struct ConfigurationResult {
    error: Mutex<Option<Error>>,
}

impl ConfigurationResult {
    /// Create a successful configuration result
    pub const fn new() -> Self {
        Self {
            error: Mutex::new(None),
        }
    }

    /// Record an error, keeping any earlier one
    ///
    /// Returns the error that is now in effect.
    pub fn record(&self, error: Error) -> Error {
        let mut slot = self.error.lock();
        match *slot {
            Some(existing) => existing,
            None => {
                log::error!("configuration error: {}", error);
                *slot = Some(error);
                error
            }
        }
    }

    /// Current result
    pub fn get(&self) -> Result<()> {
        match *self.error.lock() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Check if an error has been recorded
    pub fn is_error(&self) -> bool {
        self.error.lock().is_some()
    }
}
