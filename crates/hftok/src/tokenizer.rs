use std::{
    ffi::{CString, c_char, c_int},
    fmt,
    path::Path,
    ptr,
};

#[cfg(feature = "linked")]
use crate::engine::Linked;
use crate::{
    buffer::{self, ForeignString},
    channel::Boundary,
    engine::Engine,
    error::{Error, Result},
    handle::Handle,
};

/// Common spellings of end-of-sequence tokens across model families.
pub const DEFAULT_STOP_TOKENS: &[&str] = &[
    "</s>",
    "<eos>",
    "<|endoftext|>",
    "<|im_end|>",
    "<|eot_id|>",
    "<|end|>",
    "<end_of_turn>",
];

/// What [`Tokenizer::stop_token_ids_with`] does when a lookup call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopTokenPolicy {
    /// Skip the candidate and keep going.
    #[default]
    Lenient,
    /// Return the first failure.
    FailFast,
}

/// A loaded tokenizer.
///
/// Owns exactly one engine handle and frees it when dropped. The type is
/// move-only: moving it transfers the handle, and the moved-from binding can
/// no longer be used.
///
/// ```compile_fail
/// let a = hftok::Tokenizer::from_file("tokenizer.json").unwrap();
/// let b = a;
/// a.encode("hello", false).unwrap();
/// ```
///
/// It can be sent to another thread but not shared between threads, so at
/// most one engine call per tokenizer is in flight.
///
/// The engine reports failures through a single process-wide error slot.
/// To read back the message that belongs to a call, every engine call takes
/// a process-wide lock until its status is checked. Calls from different
/// tokenizers, on any thread, therefore run one at a time.
pub struct Tokenizer<E: Engine> {
    handle: Handle<E>,
}

#[cfg(feature = "linked")]
impl Tokenizer<Linked> {
    /// Loads a `tokenizer.json` with the linked engine.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_with(Linked, path)
    }
}

fn c_string(s: &str, what: &'static str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::InvalidArgument(what))
}

impl<E: Engine> Tokenizer<E> {
    /// Loads a tokenizer definition through `engine`.
    ///
    /// # Errors
    ///
    /// [`Error::Load`] when the engine rejects the file, or
    /// [`Error::InvalidArgument`] when `path` cannot be passed to it.
    pub fn from_file_with(engine: E, path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            handle: Handle::load(engine, path.as_ref())?,
        })
    }

    pub const fn engine(&self) -> &E {
        self.handle.engine()
    }

    /// Converts `text` into token ids, in text order.
    ///
    /// `add_special` lets the engine insert its boundary tokens.
    ///
    /// # Errors
    ///
    /// [`Error::Engine`] when the engine fails, [`Error::InvalidArgument`]
    /// when `text` contains a NUL byte.
    pub fn encode(&self, text: &str, add_special: bool) -> Result<Vec<u32>> {
        let text = c_string(text, "text contains a NUL byte")?;
        let (engine, h) = (self.handle.engine(), self.handle.as_ptr());
        buffer::take_ids(engine, "encode", |out_ids, out_len| unsafe {
            engine.encode(h, text.as_ptr(), c_int::from(add_special), out_ids, out_len)
        })
    }

    /// Converts token ids back to text. An empty slice decodes to an empty
    /// string.
    ///
    /// # Errors
    ///
    /// [`Error::Engine`] when the engine rejects an id or fails otherwise.
    pub fn decode(&self, ids: &[u32], skip_special: bool) -> Result<String> {
        let (engine, h) = (self.handle.engine(), self.handle.as_ptr());
        buffer::take_string(engine, "decode", |out_str| unsafe {
            engine.decode(h, ids.as_ptr(), ids.len(), c_int::from(skip_special), out_str)
        })
    }

    /// Decodes one id through the engine's single-id entry point, which may
    /// treat out-of-vocabulary ids differently from [`Tokenizer::decode`].
    ///
    /// # Errors
    ///
    /// [`Error::Engine`] when the engine fails.
    pub fn decode_id(&self, id: u32, skip_special: bool) -> Result<String> {
        let (engine, h) = (self.handle.engine(), self.handle.as_ptr());
        buffer::take_string(engine, "decode_id", |out_str| unsafe {
            engine.decode_id(h, id, c_int::from(skip_special), out_str)
        })
    }

    /// Every token the vocabulary marks as special, in engine order.
    ///
    /// # Errors
    ///
    /// [`Error::Engine`] when the engine fails.
    pub fn special_tokens(&self) -> Result<Vec<String>> {
        let (engine, h) = (self.handle.engine(), self.handle.as_ptr());
        buffer::take_strings(engine, "list_special_tokens", |out_tokens, out_len| unsafe {
            engine.list_special_tokens(h, out_tokens, out_len)
        })
    }

    /// Looks up a token. `Ok(None)` means the vocabulary has no such token;
    /// `Err` means the lookup itself failed.
    ///
    /// # Errors
    ///
    /// [`Error::Engine`] when the engine fails, [`Error::InvalidArgument`]
    /// when `token` contains a NUL byte.
    pub fn token_to_id(&self, token: &str) -> Result<Option<u32>> {
        let token = c_string(token, "token contains a NUL byte")?;
        let (engine, h) = (self.handle.engine(), self.handle.as_ptr());
        let mut id = 0;
        let mut found: c_int = 0;

        let boundary = Boundary::enter(engine);
        let status = unsafe { engine.token_to_id(h, token.as_ptr(), &raw mut id, &raw mut found) };
        boundary.check("token_to_id", status)?;

        Ok((found != 0).then_some(id))
    }

    /// Reverse lookup of [`Tokenizer::token_to_id`].
    ///
    /// # Errors
    ///
    /// [`Error::Engine`] when the engine fails.
    pub fn id_to_token(&self, id: u32) -> Result<Option<String>> {
        let (engine, h) = (self.handle.engine(), self.handle.as_ptr());
        let mut out: *mut c_char = ptr::null_mut();
        let mut found: c_int = 0;

        let boundary = Boundary::enter(engine);
        let status = unsafe { engine.id_to_token(h, id, &raw mut out, &raw mut found) };
        boundary.check("id_to_token", status)?;
        drop(boundary);

        let token = unsafe { ForeignString::from_raw(engine, out) };
        Ok((found != 0).then(|| token.copy()))
    }

    /// Ids of the candidates present in the vocabulary, in candidate order.
    ///
    /// Candidates whose lookup fails are skipped rather than failing the
    /// batch: callers probe many spellings, most of which a given vocabulary
    /// does not have. See [`Tokenizer::stop_token_ids_with`] for the strict
    /// variant.
    pub fn stop_token_ids<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<u32> {
        self.stop_token_ids_with(candidates, StopTokenPolicy::Lenient)
            .unwrap_or_default()
    }

    /// [`Tokenizer::stop_token_ids`] with an explicit failure policy.
    ///
    /// # Errors
    ///
    /// Only under [`StopTokenPolicy::FailFast`]: the first failed lookup.
    pub fn stop_token_ids_with<S: AsRef<str>>(
        &self,
        candidates: &[S],
        policy: StopTokenPolicy,
    ) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            match self.token_to_id(candidate) {
                Ok(Some(id)) => ids.push(id),
                Ok(None) => {}
                Err(e) if policy == StopTokenPolicy::Lenient => {
                    tracing::debug!(candidate, error = %e, "skipping stop token candidate");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(ids)
    }

    /// [`Tokenizer::stop_token_ids`] over [`DEFAULT_STOP_TOKENS`].
    pub fn default_stop_token_ids(&self) -> Vec<u32> {
        self.stop_token_ids(DEFAULT_STOP_TOKENS)
    }

    /// Empties the engine's last-error slot.
    pub fn clear_last_error(&self) {
        Boundary::enter(self.handle.engine()).clear();
    }
}

impl<E: Engine> fmt::Debug for Tokenizer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("handle", &self.handle.as_ptr())
            .finish_non_exhaustive()
    }
}
