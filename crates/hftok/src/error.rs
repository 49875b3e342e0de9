use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// The engine could not load the tokenizer definition. No tokenizer
    /// exists afterwards.
    #[error("load_from_file: {message}")]
    Load { path: PathBuf, message: String },

    /// A foreign call reported a non-zero status. The tokenizer stays usable.
    #[error("{op}: {message}")]
    Engine {
        op: &'static str,
        status: i32,
        message: String,
    },

    /// Caller input that cannot be passed across the C ABI.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl Error {
    /// Name of the operation that failed, when the failure came from the
    /// engine.
    pub const fn op(&self) -> Option<&'static str> {
        match self {
            Self::Load { .. } => Some("load_from_file"),
            Self::Engine { op, .. } => Some(*op),
            Self::InvalidArgument(_) => None,
        }
    }
}
