//! Ownership of memory the engine allocates on the caller's behalf.
//!
//! Each output shape has a guard that releases the buffer through the
//! engine's matching free function when dropped, and a `take_*` helper that
//! runs the call, copies the result into a native value and lets the guard
//! release the original. A failed call hands out nothing, so nothing is
//! released.

use std::{
    ffi::{CStr, c_char},
    ptr,
};

use crate::{
    channel::Boundary,
    engine::{Engine, Status},
    error::Result,
};

unsafe fn copy_c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

pub(crate) struct ForeignString<'e, E: Engine> {
    engine: &'e E,
    ptr: *mut c_char,
}

impl<'e, E: Engine> ForeignString<'e, E> {
    /// # Safety
    ///
    /// `ptr` must be null or a string the engine just handed to the caller.
    pub(crate) const unsafe fn from_raw(engine: &'e E, ptr: *mut c_char) -> Self {
        Self { engine, ptr }
    }

    pub(crate) fn copy(&self) -> String {
        unsafe { copy_c_str(self.ptr) }
    }
}

impl<E: Engine> Drop for ForeignString<'_, E> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { self.engine.string_free(self.ptr) };
        }
    }
}

pub(crate) struct ForeignIds<'e, E: Engine> {
    engine: &'e E,
    ptr: *mut u32,
    len: usize,
}

impl<'e, E: Engine> ForeignIds<'e, E> {
    /// # Safety
    ///
    /// `ptr`/`len` must be null or an id array the engine just handed to the
    /// caller.
    pub(crate) const unsafe fn from_raw(engine: &'e E, ptr: *mut u32, len: usize) -> Self {
        Self { engine, ptr, len }
    }

    pub(crate) fn copy(&self) -> Vec<u32> {
        if self.ptr.is_null() {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }.to_vec()
    }
}

impl<E: Engine> Drop for ForeignIds<'_, E> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { self.engine.ids_free(self.ptr, self.len) };
        }
    }
}

/// An array of strings; the engine frees the elements and the array in one
/// call.
pub(crate) struct ForeignStrings<'e, E: Engine> {
    engine: &'e E,
    ptr: *mut *mut c_char,
    len: usize,
}

impl<'e, E: Engine> ForeignStrings<'e, E> {
    /// # Safety
    ///
    /// `ptr`/`len` must be null or a string array the engine just handed to
    /// the caller.
    pub(crate) const unsafe fn from_raw(engine: &'e E, ptr: *mut *mut c_char, len: usize) -> Self {
        Self { engine, ptr, len }
    }

    pub(crate) fn copy(&self) -> Vec<String> {
        if self.ptr.is_null() {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
            .iter()
            .map(|&s| unsafe { copy_c_str(s) })
            .collect()
    }
}

impl<E: Engine> Drop for ForeignStrings<'_, E> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { self.engine.string_array_free(self.ptr, self.len) };
        }
    }
}

/// Runs a call that produces one string.
pub(crate) fn take_string<E: Engine>(
    engine: &E,
    op: &'static str,
    call: impl FnOnce(*mut *mut c_char) -> Status,
) -> Result<String> {
    let mut out: *mut c_char = ptr::null_mut();
    let boundary = Boundary::enter(engine);
    boundary.check(op, call(&raw mut out))?;
    drop(boundary);
    let buf = unsafe { ForeignString::from_raw(engine, out) };
    Ok(buf.copy())
}

/// Runs a call that produces an id array.
pub(crate) fn take_ids<E: Engine>(
    engine: &E,
    op: &'static str,
    call: impl FnOnce(*mut *mut u32, *mut usize) -> Status,
) -> Result<Vec<u32>> {
    let mut out: *mut u32 = ptr::null_mut();
    let mut len = 0;
    let boundary = Boundary::enter(engine);
    boundary.check(op, call(&raw mut out, &raw mut len))?;
    drop(boundary);
    let buf = unsafe { ForeignIds::from_raw(engine, out, len) };
    Ok(buf.copy())
}

/// Runs a call that produces a string array.
pub(crate) fn take_strings<E: Engine>(
    engine: &E,
    op: &'static str,
    call: impl FnOnce(*mut *mut *mut c_char, *mut usize) -> Status,
) -> Result<Vec<String>> {
    let mut out: *mut *mut c_char = ptr::null_mut();
    let mut len = 0;
    let boundary = Boundary::enter(engine);
    boundary.check(op, call(&raw mut out, &raw mut len))?;
    drop(boundary);
    let buf = unsafe { ForeignStrings::from_raw(engine, out, len) };
    Ok(buf.copy())
}
