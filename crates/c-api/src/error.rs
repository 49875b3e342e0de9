use std::{
    borrow::Cow,
    ffi::{CStr, CString, c_char},
};

use parking_lot::Mutex;

/// Process-wide slot holding the most recent failure. Every failing call
/// overwrites it, from whichever thread it happens on.
static LAST_ERROR: Mutex<Option<Error>> = Mutex::new(None);

/// Returns the message of the most recent failure, or null when the slot is
/// empty.
///
/// The pointer is borrowed: it stays valid until the next failing call or
/// `hftok_clear_last_error`, so callers must copy it right away.
#[unsafe(no_mangle)]
pub extern "C" fn hftok_last_error_message() -> *const c_char {
    LAST_ERROR
        .lock()
        .as_mut()
        .map_or(std::ptr::null(), Error::c_error)
}

#[unsafe(no_mangle)]
pub extern "C" fn hftok_clear_last_error() {
    *LAST_ERROR.lock() = None;
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("Load failed: {0}")]
    Load(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Chat template failed: {0}")]
    Template(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("C Error")]
    C(ErrorCode, Cow<'static, CStr>),
}

pub type Result<T> = std::result::Result<T, Error>;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    InvalidArgument = 1,
    Load = 2,
    Encode = 3,
    Decode = 4,
    Template = 5,
    Internal = 6,
}

fn into_cstr(msg: String) -> Cow<'static, CStr> {
    CString::new(msg).map_or_else(
        |_| c"error message contains a NUL byte".into(),
        std::convert::Into::into,
    )
}

impl Error {
    fn c_error(&mut self) -> *const c_char {
        if let Self::C(_, msg) = self {
            return msg.as_ptr();
        }
        let code = ErrorCode::from(&*self);
        *self = Self::C(code, into_cstr(self.to_string()));
        self.c_error()
    }
}

pub fn set_last_error(err: Error) {
    tracing::debug!(error = %err, "engine call failed");
    *LAST_ERROR.lock() = Some(err);
}

impl From<&Error> for ErrorCode {
    fn from(result: &Error) -> Self {
        match &result {
            Error::InvalidArgument(_) => Self::InvalidArgument,
            Error::Load(_) => Self::Load,
            Error::Encode(_) => Self::Encode,
            Error::Decode(_) => Self::Decode,
            Error::Template(_) => Self::Template,
            Error::Internal(_) => Self::Internal,
            Error::C(code, _) => *code,
        }
    }
}
