//! Safe access to a tokenizer engine behind a C ABI.
//!
//! The engine owns the tokenizer and every buffer it returns; this crate
//! turns its handles, status codes and last-error slot into a move-only
//! [`Tokenizer`] with `Result`-returning methods. With the default `linked`
//! feature the engine is `hftok-c-api`, linked into the final binary:
//!
//! ```no_run
//! use hftok::Tokenizer;
//!
//! let tok = Tokenizer::from_file("tokenizer.json")?;
//! let ids = tok.encode("hello world", false)?;
//! assert_eq!(tok.decode(&ids, true)?, "hello world");
//! let stop = tok.stop_token_ids(&["<eos>", "</s>"]);
//! # let _ = stop;
//! # Ok::<(), hftok::Error>(())
//! ```
//!
//! Other engines plug in through [`engine::Engine`].
//!
//! Engine calls are serialized process-wide, across all tokenizers, because
//! the engine keeps one last-error slot for the whole process.

#[cfg(feature = "linked")]
extern crate hftok_c_api;

mod buffer;
mod channel;
mod chat;
pub mod engine;
mod error;
mod handle;
mod tokenizer;

#[cfg(feature = "linked")]
pub use chat::apply_chat_template;
pub use chat::{ChatMessage, apply_chat_template_with};
#[cfg(feature = "linked")]
pub use engine::Linked;
pub use error::{Error, Result};
pub use tokenizer::{DEFAULT_STOP_TOKENS, StopTokenPolicy, Tokenizer};
