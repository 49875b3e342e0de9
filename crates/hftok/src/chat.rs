use std::{ffi::CString, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "linked")]
use crate::engine::Linked;
use crate::{
    buffer,
    engine::Engine,
    error::{Error, Result},
};

/// One turn of a conversation, as chat templates expect it.
///
/// `content` is usually a string. Multimodal templates take an array of
/// parts instead, such as `{"type": "text", "text": ..}` and
/// `{"type": "image"}`; it is passed to the template untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Value,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<Value>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<Value>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<Value>) -> Self {
        Self::new("assistant", content)
    }
}

/// Renders the chat template shipped in `model_dir` with the linked engine.
///
/// # Errors
///
/// See [`apply_chat_template_with`].
#[cfg(feature = "linked")]
pub fn apply_chat_template(
    model_dir: impl AsRef<Path>,
    messages: &[ChatMessage],
    add_generation_prompt: bool,
) -> Result<String> {
    apply_chat_template_with(&Linked, model_dir, messages, add_generation_prompt)
}

/// Renders the chat template shipped in `model_dir` over `messages`.
///
/// `add_generation_prompt` asks the template to end with the opening of an
/// assistant turn.
///
/// # Errors
///
/// [`Error::Engine`] when no template is found or rendering fails,
/// [`Error::InvalidArgument`] when an input contains a NUL byte.
pub fn apply_chat_template_with<E: Engine>(
    engine: &E,
    model_dir: impl AsRef<Path>,
    messages: &[ChatMessage],
    add_generation_prompt: bool,
) -> Result<String> {
    let model_dir = model_dir
        .as_ref()
        .to_str()
        .ok_or(Error::InvalidArgument("model_dir is not valid UTF-8"))?;
    let model_dir = CString::new(model_dir)
        .map_err(|_| Error::InvalidArgument("model_dir contains a NUL byte"))?;
    let messages = serde_json::to_string(messages)
        .map_err(|_| Error::InvalidArgument("messages cannot be encoded as JSON"))?;
    let messages = CString::new(messages)
        .map_err(|_| Error::InvalidArgument("messages contain a NUL byte"))?;

    buffer::take_string(engine, "chat_apply_template", |out_prompt| unsafe {
        engine.chat_apply_template(
            model_dir.as_ptr(),
            messages.as_ptr(),
            std::ffi::c_int::from(add_generation_prompt),
            out_prompt,
        )
    })
}
