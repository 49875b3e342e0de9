//! Access to the engine's last-error slot.
//!
//! The slot is process-wide: any failing call from any thread overwrites it.
//! A foreign call and the read of its error message therefore happen under
//! one process-wide lock, held by [`Boundary`].

use std::ffi::CStr;

use parking_lot::{Mutex, MutexGuard};

use crate::{
    engine::{Engine, STATUS_OK, Status},
    error::{Error, Result},
};

static BOUNDARY: Mutex<()> = Mutex::new(());

/// Exclusive access to the engine for one call and its error snapshot.
pub(crate) struct Boundary<'e, E> {
    engine: &'e E,
    _guard: MutexGuard<'static, ()>,
}

impl<'e, E: Engine> Boundary<'e, E> {
    pub(crate) fn enter(engine: &'e E) -> Self {
        Self {
            engine,
            _guard: BOUNDARY.lock(),
        }
    }

    /// Copies the current message out of the slot.
    pub(crate) fn last_error(&self) -> String {
        let msg = self.engine.last_error_message();
        if msg.is_null() {
            return "unknown error".to_string();
        }
        unsafe { CStr::from_ptr(msg) }
            .to_string_lossy()
            .into_owned()
    }

    /// Turns the status of the call just made into a result, attributing any
    /// failure to `op`.
    pub(crate) fn check(&self, op: &'static str, status: Status) -> Result<()> {
        if status == STATUS_OK {
            Ok(())
        } else {
            Err(Error::Engine {
                op,
                status,
                message: self.last_error(),
            })
        }
    }

    pub(crate) fn clear(&self) {
        self.engine.clear_last_error();
    }
}
