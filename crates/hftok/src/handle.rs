use std::{ffi::CString, path::Path, ptr::NonNull};

use crate::{
    channel::Boundary,
    engine::Engine,
    error::{Error, Result},
};

/// Sole owner of one loaded engine handle. Freed exactly once, on drop.
pub(crate) struct Handle<E: Engine> {
    engine: E,
    raw: NonNull<E::Handle>,
}

// Handles may move between threads. Concurrent calls are ruled out by
// `Handle` not being `Sync`.
unsafe impl<E: Engine + Send> Send for Handle<E> {}

impl<E: Engine> Handle<E> {
    pub(crate) fn load(engine: E, path: &Path) -> Result<Self> {
        let c_path = path
            .to_str()
            .ok_or(Error::InvalidArgument("path is not valid UTF-8"))
            .and_then(|p| {
                CString::new(p).map_err(|_| Error::InvalidArgument("path contains a NUL byte"))
            })?;

        let boundary = Boundary::enter(&engine);
        let raw = unsafe { engine.load(c_path.as_ptr()) };
        let Some(raw) = NonNull::new(raw) else {
            let message = boundary.last_error();
            tracing::warn!(path = %path.display(), error = %message, "failed to load tokenizer");
            return Err(Error::Load {
                path: path.to_owned(),
                message,
            });
        };
        drop(boundary);

        tracing::debug!(path = %path.display(), "tokenizer handle acquired");
        Ok(Self { engine, raw })
    }

    pub(crate) const fn engine(&self) -> &E {
        &self.engine
    }

    pub(crate) const fn as_ptr(&self) -> *mut E::Handle {
        self.raw.as_ptr()
    }
}

impl<E: Engine> Drop for Handle<E> {
    fn drop(&mut self) {
        unsafe { self.engine.free(self.raw.as_ptr()) };
        tracing::debug!("tokenizer handle released");
    }
}
