use std::{fs, path::Path};

use minijinja::{Environment, ErrorKind, context};
use serde_json::Value;

use crate::error::{Error, Result};

const TEMPLATE_FILES: [&str; 2] = ["chat_template.jinja", "chat_template.jinja2"];

fn read_json(path: &Path) -> Option<Value> {
    let s = fs::read_to_string(path).ok()?;
    serde_json::from_str(&s).ok()
}

fn non_blank(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}

/// A special token is stored either as a bare string or as an added-token
/// object with a `content` field.
fn token_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("content")?.as_str().map(str::to_string),
        _ => None,
    }
}

fn find_chat_template(model_dir: &Path) -> Result<String> {
    for name in TEMPLATE_FILES {
        if let Some(t) = fs::read_to_string(model_dir.join(name))
            .ok()
            .and_then(|s| non_blank(&s))
        {
            return Ok(t);
        }
    }

    if let Some(t) = read_json(&model_dir.join("tokenizer_config.json"))
        .as_ref()
        .and_then(|tc| tc.get("chat_template")?.as_str().and_then(non_blank))
    {
        return Ok(t);
    }

    if let Some(j) = read_json(&model_dir.join("chat_template.json")) {
        for pointer in ["/chat_template", "/template/chat_template"] {
            if let Some(t) = j.pointer(pointer).and_then(Value::as_str).and_then(non_blank) {
                return Ok(t);
            }
        }
    }

    let dir = model_dir.display();
    Err(Error::Template(format!(
        "chat template not found, tried {dir}/chat_template.jinja(2), \
         {dir}/tokenizer_config.json:chat_template, {dir}/chat_template.json:chat_template"
    )))
}

#[derive(Debug, Default)]
struct SpecialTokens {
    bos: Option<String>,
    eos: Option<String>,
    unk: Option<String>,
    pad: Option<String>,
    sep: Option<String>,
    cls: Option<String>,
    mask: Option<String>,
}

impl SpecialTokens {
    /// `tokenizer_config.json` wins over `special_tokens_map.json`.
    fn load(model_dir: &Path) -> Self {
        let tc = read_json(&model_dir.join("tokenizer_config.json")).unwrap_or(Value::Null);
        let sm = read_json(&model_dir.join("special_tokens_map.json")).unwrap_or(Value::Null);
        let get = |key: &str| {
            tc.get(key)
                .and_then(token_string)
                .or_else(|| sm.get(key).and_then(token_string))
        };
        Self {
            bos: get("bos_token"),
            eos: get("eos_token"),
            unk: get("unk_token"),
            pad: get("pad_token"),
            sep: get("sep_token"),
            cls: get("cls_token"),
            mask: get("mask_token"),
        }
    }
}

pub fn apply_chat_template_from_dir(
    model_dir: &Path,
    messages_json: &str,
    add_generation_prompt: bool,
) -> Result<String> {
    let template = find_chat_template(model_dir)?;

    let messages: Value = serde_json::from_str(messages_json)
        .map_err(|e| Error::Template(format!("messages_json parse error: {e}")))?;
    if !messages.is_array() {
        return Err(Error::Template("messages_json must be a JSON array".into()));
    }

    let special = SpecialTokens::load(model_dir);

    let mut env = Environment::new();
    env.add_function("raise_exception", raise_exception);
    env.add_template("chat", &template)
        .map_err(|e| Error::Template(format!("invalid template: {e}")))?;

    env.get_template("chat")
        .and_then(|tmpl| {
            tmpl.render(context! {
                messages => messages,
                add_generation_prompt => add_generation_prompt,
                bos_token => special.bos,
                eos_token => special.eos,
                unk_token => special.unk,
                pad_token => special.pad,
                sep_token => special.sep,
                cls_token => special.cls,
                mask_token => special.mask,
            })
        })
        .map_err(|e| Error::Template(format!("render error: {e}")))
}

fn raise_exception(msg: String) -> std::result::Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, msg))
}
