//! The raw C ABI a tokenizer engine exposes.
//!
//! Everything here speaks in pointers and status codes. The safe layer in
//! this crate is the only intended caller.

use std::ffi::{c_char, c_int};

/// Status returned by every fallible engine call. Zero is success.
pub type Status = c_int;

pub const STATUS_OK: Status = 0;

/// A foreign tokenizer engine reached through a C ABI.
///
/// Methods mirror the engine's exported functions one to one. Buffers written
/// to `out_*` parameters on success become owned by the caller and go back
/// through the matching release method exactly once; on failure nothing is
/// written that needs releasing.
///
/// # Safety
///
/// Implementors guarantee that:
/// - a non-null handle from [`Engine::load`] stays valid until passed to
///   [`Engine::free`], and may be used from any thread, one call at a time;
/// - on success, every `out_*` pointer is null or describes a live
///   allocation of the stated length (strings are NUL-terminated);
/// - [`Engine::last_error_message`] returns null or a NUL-terminated string
///   that stays valid until the next engine call.
pub unsafe trait Engine {
    /// Opaque per-tokenizer state, only ever seen behind a pointer.
    type Handle;

    /// # Safety
    ///
    /// `path` must be a valid, NUL-terminated C string.
    unsafe fn load(&self, path: *const c_char) -> *mut Self::Handle;

    /// # Safety
    ///
    /// `handle` must come from [`Engine::load`] and not have been freed.
    unsafe fn free(&self, handle: *mut Self::Handle);

    /// # Safety
    ///
    /// `handle` must be live; `text` NUL-terminated; outputs writable.
    unsafe fn encode(
        &self,
        handle: *mut Self::Handle,
        text: *const c_char,
        add_special_tokens: c_int,
        out_ids: *mut *mut u32,
        out_len: *mut usize,
    ) -> Status;

    /// # Safety
    ///
    /// `handle` must be live; `ids` must point to `len` ids; `out_str`
    /// writable.
    unsafe fn decode(
        &self,
        handle: *mut Self::Handle,
        ids: *const u32,
        len: usize,
        skip_special_tokens: c_int,
        out_str: *mut *mut c_char,
    ) -> Status;

    /// # Safety
    ///
    /// `handle` must be live; `out_str` writable.
    unsafe fn decode_id(
        &self,
        handle: *mut Self::Handle,
        id: u32,
        skip_special_tokens: c_int,
        out_str: *mut *mut c_char,
    ) -> Status;

    /// # Safety
    ///
    /// `handle` must be live; `token` NUL-terminated; outputs writable.
    unsafe fn token_to_id(
        &self,
        handle: *mut Self::Handle,
        token: *const c_char,
        out_id: *mut u32,
        out_found: *mut c_int,
    ) -> Status;

    /// # Safety
    ///
    /// `handle` must be live; outputs writable.
    unsafe fn id_to_token(
        &self,
        handle: *mut Self::Handle,
        id: u32,
        out_str: *mut *mut c_char,
        out_found: *mut c_int,
    ) -> Status;

    /// # Safety
    ///
    /// `handle` must be live; outputs writable.
    unsafe fn list_special_tokens(
        &self,
        handle: *mut Self::Handle,
        out_tokens: *mut *mut *mut c_char,
        out_len: *mut usize,
    ) -> Status;

    /// # Safety
    ///
    /// Inputs NUL-terminated; `out_prompt` writable.
    unsafe fn chat_apply_template(
        &self,
        model_dir: *const c_char,
        messages_json: *const c_char,
        add_generation_prompt: c_int,
        out_prompt: *mut *mut c_char,
    ) -> Status;

    /// # Safety
    ///
    /// `s` must be a string produced by this engine, not yet released.
    unsafe fn string_free(&self, s: *mut c_char);

    /// # Safety
    ///
    /// `ids`/`len` must be the exact pair produced by one `encode`.
    unsafe fn ids_free(&self, ids: *mut u32, len: usize);

    /// # Safety
    ///
    /// `tokens`/`len` must be the exact pair produced by one
    /// `list_special_tokens`.
    unsafe fn string_array_free(&self, tokens: *mut *mut c_char, len: usize);

    fn last_error_message(&self) -> *const c_char;

    fn clear_last_error(&self);
}

#[cfg(feature = "linked")]
pub use linked::Linked;

#[cfg(feature = "linked")]
mod linked {
    use std::{
        ffi::{c_char, c_int},
        marker::{PhantomData, PhantomPinned},
    };

    use super::{Engine, Status};

    #[repr(C)]
    pub struct HftokTokenizer {
        _data: [u8; 0],
        _marker: PhantomData<(*mut u8, PhantomPinned)>,
    }

    unsafe extern "C" {
        fn hftok_load_from_file(path: *const c_char) -> *mut HftokTokenizer;
        fn hftok_free(tok: *mut HftokTokenizer);
        fn hftok_encode(
            tok: *mut HftokTokenizer,
            text: *const c_char,
            add_special_tokens: c_int,
            out_ids: *mut *mut u32,
            out_len: *mut usize,
        ) -> Status;
        fn hftok_decode(
            tok: *mut HftokTokenizer,
            ids: *const u32,
            len: usize,
            skip_special_tokens: c_int,
            out_str: *mut *mut c_char,
        ) -> Status;
        fn hftok_decode_id(
            tok: *mut HftokTokenizer,
            id: u32,
            skip_special_tokens: c_int,
            out_str: *mut *mut c_char,
        ) -> Status;
        fn hftok_token_to_id(
            tok: *mut HftokTokenizer,
            token: *const c_char,
            out_id: *mut u32,
            out_found: *mut c_int,
        ) -> Status;
        fn hftok_id_to_token(
            tok: *mut HftokTokenizer,
            id: u32,
            out_str: *mut *mut c_char,
            out_found: *mut c_int,
        ) -> Status;
        fn hftok_list_special_tokens(
            tok: *mut HftokTokenizer,
            out_tokens: *mut *mut *mut c_char,
            out_len: *mut usize,
        ) -> Status;
        fn hftok_chat_apply_template_from_dir(
            model_dir: *const c_char,
            messages_json: *const c_char,
            add_generation_prompt: c_int,
            out_prompt: *mut *mut c_char,
        ) -> Status;
        fn hftok_string_free(s: *mut c_char);
        fn hftok_ids_free(ids: *mut u32, len: usize);
        fn hftok_string_array_free(tokens: *mut *mut c_char, len: usize);
        safe fn hftok_last_error_message() -> *const c_char;
        safe fn hftok_clear_last_error();
    }

    /// The engine statically linked from `hftok-c-api`.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Linked;

    unsafe impl Engine for Linked {
        type Handle = HftokTokenizer;

        unsafe fn load(&self, path: *const c_char) -> *mut HftokTokenizer {
            unsafe { hftok_load_from_file(path) }
        }

        unsafe fn free(&self, handle: *mut HftokTokenizer) {
            unsafe { hftok_free(handle) }
        }

        unsafe fn encode(
            &self,
            handle: *mut HftokTokenizer,
            text: *const c_char,
            add_special_tokens: c_int,
            out_ids: *mut *mut u32,
            out_len: *mut usize,
        ) -> Status {
            unsafe { hftok_encode(handle, text, add_special_tokens, out_ids, out_len) }
        }

        unsafe fn decode(
            &self,
            handle: *mut HftokTokenizer,
            ids: *const u32,
            len: usize,
            skip_special_tokens: c_int,
            out_str: *mut *mut c_char,
        ) -> Status {
            unsafe { hftok_decode(handle, ids, len, skip_special_tokens, out_str) }
        }

        unsafe fn decode_id(
            &self,
            handle: *mut HftokTokenizer,
            id: u32,
            skip_special_tokens: c_int,
            out_str: *mut *mut c_char,
        ) -> Status {
            unsafe { hftok_decode_id(handle, id, skip_special_tokens, out_str) }
        }

        unsafe fn token_to_id(
            &self,
            handle: *mut HftokTokenizer,
            token: *const c_char,
            out_id: *mut u32,
            out_found: *mut c_int,
        ) -> Status {
            unsafe { hftok_token_to_id(handle, token, out_id, out_found) }
        }

        unsafe fn id_to_token(
            &self,
            handle: *mut HftokTokenizer,
            id: u32,
            out_str: *mut *mut c_char,
            out_found: *mut c_int,
        ) -> Status {
            unsafe { hftok_id_to_token(handle, id, out_str, out_found) }
        }

        unsafe fn list_special_tokens(
            &self,
            handle: *mut HftokTokenizer,
            out_tokens: *mut *mut *mut c_char,
            out_len: *mut usize,
        ) -> Status {
            unsafe { hftok_list_special_tokens(handle, out_tokens, out_len) }
        }

        unsafe fn chat_apply_template(
            &self,
            model_dir: *const c_char,
            messages_json: *const c_char,
            add_generation_prompt: c_int,
            out_prompt: *mut *mut c_char,
        ) -> Status {
            unsafe {
                hftok_chat_apply_template_from_dir(
                    model_dir,
                    messages_json,
                    add_generation_prompt,
                    out_prompt,
                )
            }
        }

        unsafe fn string_free(&self, s: *mut c_char) {
            unsafe { hftok_string_free(s) }
        }

        unsafe fn ids_free(&self, ids: *mut u32, len: usize) {
            unsafe { hftok_ids_free(ids, len) }
        }

        unsafe fn string_array_free(&self, tokens: *mut *mut c_char, len: usize) {
            unsafe { hftok_string_array_free(tokens, len) }
        }

        fn last_error_message(&self) -> *const c_char {
            hftok_last_error_message()
        }

        fn clear_last_error(&self) {
            hftok_clear_last_error();
        }
    }
}
