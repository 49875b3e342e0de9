//! C ABI over a Hugging Face `tokenizer.json` engine.
//!
//! Every fallible entry point returns an [`ErrorCode`]; on anything other than
//! [`ErrorCode::Ok`] the reason is available from [`hftok_last_error_message`].
//! Buffers handed out through `out_*` parameters belong to the caller, who
//! must release each one exactly once with the matching `*_free` function.

use std::{
    ffi::{CStr, CString, c_char, c_int},
    path::Path,
    ptr,
};

use tokenizers::Tokenizer;

pub use crate::error::{ErrorCode, hftok_clear_last_error, hftok_last_error_message};
use crate::error::{Error, Result};

mod error;
mod template;

macro_rules! c_try {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => {
                let code = $crate::error::ErrorCode::from(&e);
                $crate::error::set_last_error(e);
                return code;
            }
        }
    };
}

/// One loaded tokenizer definition.
pub struct HftokTokenizer {
    tok: Tokenizer,
}

impl HftokTokenizer {
    fn load(path: &Path) -> Result<Box<Self>> {
        let tok = Tokenizer::from_file(path)
            .map_err(|e| Error::Load(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "tokenizer loaded");
        Ok(Box::new(Self { tok }))
    }

    fn encode(&self, text: &str, add_special: bool) -> Result<Box<[u32]>> {
        let enc = self
            .tok
            .encode(text, add_special)
            .map_err(|e| Error::Encode(e.to_string()))?;
        Ok(enc.get_ids().into())
    }

    fn decode(&self, ids: &[u32], skip_special: bool) -> Result<CString> {
        let text = self
            .tok
            .decode(ids, skip_special)
            .map_err(|e| Error::Decode(e.to_string()))?;
        CString::new(text).map_err(|_| Error::Internal("decoded text contains a NUL byte".into()))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tok.token_to_id(token)
    }

    fn id_to_token(&self, id: u32) -> Result<Option<CString>> {
        self.tok
            .id_to_token(id)
            .map(|token| {
                CString::new(token)
                    .map_err(|_| Error::Internal("token contains a NUL byte".into()))
            })
            .transpose()
    }

    /// Added tokens flagged as special, sorted and de-duplicated.
    fn special_tokens(&self) -> Result<Vec<CString>> {
        let mut specials: Vec<String> = self
            .tok
            .get_added_tokens_decoder()
            .values()
            .filter(|t| t.special)
            .map(|t| t.content.clone())
            .collect();
        specials.sort();
        specials.dedup();
        specials
            .into_iter()
            .map(|s| {
                CString::new(s).map_err(|_| Error::Internal("token contains a NUL byte".into()))
            })
            .collect()
    }
}

/// Borrows a NUL-terminated, UTF-8 input string.
///
/// # Safety
///
/// `ptr` must be null or point to a valid, null-terminated C string that
/// outlives `'a`.
unsafe fn input_str<'a>(ptr: *const c_char, what: &'static str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::InvalidArgument(what));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| Error::InvalidArgument("input is not valid UTF-8"))
}

/// Borrows `len` ids starting at `ptr`.
///
/// # Safety
///
/// When `len` is non-zero, `ptr` must point to `len` readable ids that
/// outlive `'a`.
unsafe fn input_ids<'a>(ptr: *const u32, len: usize) -> Result<&'a [u32]> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(Error::InvalidArgument("ids is null"));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

fn handle(tok: Option<&HftokTokenizer>) -> Result<&HftokTokenizer> {
    tok.ok_or(Error::InvalidArgument("tokenizer handle is null"))
}

fn check_out<T>(out: *mut T, what: &'static str) -> Result<()> {
    if out.is_null() {
        Err(Error::InvalidArgument(what))
    } else {
        Ok(())
    }
}

/// Loads a tokenizer definition (`tokenizer.json`) from `path`.
///
/// Returns null on failure; the reason is in the last-error slot.
///
/// # Safety
///
/// `path` must be null or a valid, null-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_load_from_file(path: *const c_char) -> *mut HftokTokenizer {
    let loaded = unsafe { input_str(path, "path is null") }
        .and_then(|path| HftokTokenizer::load(Path::new(path)));
    match loaded {
        Ok(tok) => Box::into_raw(tok),
        Err(e) => {
            error::set_last_error(e);
            ptr::null_mut()
        }
    }
}

/// Releases a tokenizer returned by [`hftok_load_from_file`]. Null is a no-op.
#[unsafe(no_mangle)]
pub extern "C" fn hftok_free(_tok: Option<Box<HftokTokenizer>>) {}

/// Encodes `text` into token ids.
///
/// On success `*out_ids`/`*out_len` describe a buffer owned by the caller,
/// released with [`hftok_ids_free`].
///
/// # Safety
///
/// `text` must be a valid, null-terminated C string; `out_ids` and `out_len`
/// must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_encode(
    tok: Option<&HftokTokenizer>,
    text: *const c_char,
    add_special_tokens: c_int,
    out_ids: *mut *mut u32,
    out_len: *mut usize,
) -> ErrorCode {
    let tok = c_try!(handle(tok));
    c_try!(check_out(out_ids, "out_ids is null"));
    c_try!(check_out(out_len, "out_len is null"));
    let text = c_try!(unsafe { input_str(text, "text is null") });
    let ids = c_try!(tok.encode(text, add_special_tokens != 0));
    let len = ids.len();
    unsafe {
        out_ids.write(Box::into_raw(ids).cast::<u32>());
        out_len.write(len);
    }
    ErrorCode::Ok
}

/// Releases an id buffer returned by [`hftok_encode`].
///
/// # Safety
///
/// `ids` and `len` must be exactly the pair produced by one successful
/// [`hftok_encode`] call, not released before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_ids_free(ids: *mut u32, len: usize) {
    if !ids.is_null() {
        drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ids, len)) });
    }
}

/// Decodes `len` ids starting at `ids` into text.
///
/// On success `*out_str` is owned by the caller and released with
/// [`hftok_string_free`].
///
/// # Safety
///
/// `ids` must point to `len` readable ids (it may be dangling when `len` is
/// zero); `out_str` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_decode(
    tok: Option<&HftokTokenizer>,
    ids: *const u32,
    len: usize,
    skip_special_tokens: c_int,
    out_str: *mut *mut c_char,
) -> ErrorCode {
    let tok = c_try!(handle(tok));
    c_try!(check_out(out_str, "out_str is null"));
    let ids = c_try!(unsafe { input_ids(ids, len) });
    let text = c_try!(tok.decode(ids, skip_special_tokens != 0));
    unsafe { out_str.write(text.into_raw()) };
    ErrorCode::Ok
}

/// Decodes a single id. Same ownership rules as [`hftok_decode`].
///
/// # Safety
///
/// `out_str` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_decode_id(
    tok: Option<&HftokTokenizer>,
    id: u32,
    skip_special_tokens: c_int,
    out_str: *mut *mut c_char,
) -> ErrorCode {
    unsafe { hftok_decode(tok, &raw const id, 1, skip_special_tokens, out_str) }
}

/// Releases a string returned by this library. Null is a no-op.
///
/// # Safety
///
/// `s` must come from this library and not have been released before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Looks up the id of `token`. A miss is not an error: `*out_found` is set to
/// zero and `*out_id` is left untouched.
///
/// # Safety
///
/// `token` must be a valid, null-terminated C string; `out_id` and
/// `out_found` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_token_to_id(
    tok: Option<&HftokTokenizer>,
    token: *const c_char,
    out_id: *mut u32,
    out_found: *mut c_int,
) -> ErrorCode {
    let tok = c_try!(handle(tok));
    c_try!(check_out(out_id, "out_id is null"));
    c_try!(check_out(out_found, "out_found is null"));
    let token = c_try!(unsafe { input_str(token, "token is null") });
    match tok.token_to_id(token) {
        Some(id) => unsafe {
            out_id.write(id);
            out_found.write(1);
        },
        None => unsafe { out_found.write(0) },
    }
    ErrorCode::Ok
}

/// Looks up the token string of `id`. On a hit `*out_str` is owned by the
/// caller and released with [`hftok_string_free`]; on a miss it is set to
/// null.
///
/// # Safety
///
/// `out_str` and `out_found` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_id_to_token(
    tok: Option<&HftokTokenizer>,
    id: u32,
    out_str: *mut *mut c_char,
    out_found: *mut c_int,
) -> ErrorCode {
    let tok = c_try!(handle(tok));
    c_try!(check_out(out_str, "out_str is null"));
    c_try!(check_out(out_found, "out_found is null"));
    match c_try!(tok.id_to_token(id)) {
        Some(token) => unsafe {
            out_str.write(token.into_raw());
            out_found.write(1);
        },
        None => unsafe {
            out_str.write(ptr::null_mut());
            out_found.write(0);
        },
    }
    ErrorCode::Ok
}

/// Lists the special tokens of the loaded vocabulary.
///
/// On success `*out_tokens`/`*out_len` describe an array of strings owned by
/// the caller, released as a whole with [`hftok_string_array_free`].
///
/// # Safety
///
/// `out_tokens` and `out_len` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_list_special_tokens(
    tok: Option<&HftokTokenizer>,
    out_tokens: *mut *mut *mut c_char,
    out_len: *mut usize,
) -> ErrorCode {
    let tok = c_try!(handle(tok));
    c_try!(check_out(out_tokens, "out_tokens is null"));
    c_try!(check_out(out_len, "out_len is null"));
    let tokens: Box<[*mut c_char]> = c_try!(tok.special_tokens())
        .into_iter()
        .map(CString::into_raw)
        .collect();
    let len = tokens.len();
    unsafe {
        out_tokens.write(Box::into_raw(tokens).cast::<*mut c_char>());
        out_len.write(len);
    }
    ErrorCode::Ok
}

/// Releases every string of an array returned by
/// [`hftok_list_special_tokens`], then the array itself.
///
/// # Safety
///
/// `tokens` and `len` must be exactly the pair produced by one successful
/// [`hftok_list_special_tokens`] call, not released before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_string_array_free(tokens: *mut *mut c_char, len: usize) {
    if tokens.is_null() {
        return;
    }
    let tokens = unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(tokens, len)) };
    for &s in tokens.iter() {
        unsafe { hftok_string_free(s) };
    }
}

/// Renders the chat template found in `model_dir` over `messages_json` (a
/// JSON array of `{ "role": ..., "content": ... }` objects).
///
/// On success `*out_prompt` is owned by the caller and released with
/// [`hftok_string_free`].
///
/// # Safety
///
/// `model_dir` and `messages_json` must be valid, null-terminated C strings;
/// `out_prompt` must be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hftok_chat_apply_template_from_dir(
    model_dir: *const c_char,
    messages_json: *const c_char,
    add_generation_prompt: c_int,
    out_prompt: *mut *mut c_char,
) -> ErrorCode {
    c_try!(check_out(out_prompt, "out_prompt is null"));
    let model_dir = c_try!(unsafe { input_str(model_dir, "model_dir is null") });
    let messages_json = c_try!(unsafe { input_str(messages_json, "messages_json is null") });
    let prompt = c_try!(template::apply_chat_template_from_dir(
        Path::new(model_dir),
        messages_json,
        add_generation_prompt != 0,
    ));
    let prompt = c_try!(
        CString::new(prompt)
            .map_err(|_| Error::Internal("rendered prompt contains a NUL byte".into()))
    );
    unsafe { out_prompt.write(prompt.into_raw()) };
    ErrorCode::Ok
}
