use std::{
    collections::{HashMap, HashSet},
    ffi::{CStr, CString, c_char, c_int},
    fmt::Write as _,
    ptr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use hftok::engine::{Engine, STATUS_OK, Status};
use parking_lot::Mutex;

pub const VOCAB: [&str; 8] = ["<unk>", "<bos>", "<eos>", "<pad>", "hello", "world", "foo", "bar"];
const SPECIAL: [&str; 4] = ["<unk>", "<bos>", "<eos>", "<pad>"];

/// Token whose lookup makes the fake engine fail the call.
pub const BROKEN_TOKEN: &str = "boom";
pub const MISSING_PATH: &str = "missing.json";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alloc {
    String,
    Ids(usize),
    Strings(usize),
}

#[derive(Default)]
struct State {
    loads: AtomicUsize,
    frees: AtomicUsize,
    allocs: AtomicUsize,
    releases: AtomicUsize,
    error_reads: AtomicUsize,
    live: Mutex<HashSet<usize>>,
    outstanding: Mutex<HashMap<usize, Alloc>>,
    error: Mutex<Option<CString>>,
}

/// In-process engine that checks every handle and buffer crossing the
/// boundary. Panics on double free, use after free, or a release that does
/// not match an outstanding allocation.
#[derive(Clone, Default)]
pub struct FakeEngine(Arc<State>);

/// Carries the load sequence number, so every live handle has its own
/// address.
pub struct FakeHandle(#[allow(dead_code)] usize);

impl FakeEngine {
    pub fn loads(&self) -> usize {
        self.0.loads.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.0.frees.load(Ordering::SeqCst)
    }

    pub fn allocs(&self) -> usize {
        self.0.allocs.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.0.releases.load(Ordering::SeqCst)
    }

    pub fn error_reads(&self) -> usize {
        self.0.error_reads.load(Ordering::SeqCst)
    }

    pub fn live_handles(&self) -> usize {
        self.0.live.lock().len()
    }

    pub fn outstanding(&self) -> usize {
        self.0.outstanding.lock().len()
    }

    pub fn has_error(&self) -> bool {
        self.0.error.lock().is_some()
    }

    fn fail(&self, status: Status, msg: impl Into<String>) -> Status {
        *self.0.error.lock() = Some(CString::new(msg.into()).unwrap());
        status
    }

    fn check_live(&self, h: *mut FakeHandle) {
        assert!(
            self.0.live.lock().contains(&(h as usize)),
            "call on a handle that is not live"
        );
    }

    fn alloc_string(&self, s: &str) -> *mut c_char {
        let p = CString::new(s).unwrap().into_raw();
        self.track(p as usize, Alloc::String);
        p
    }

    fn track(&self, addr: usize, alloc: Alloc) {
        let prev = self.0.outstanding.lock().insert(addr, alloc);
        assert!(prev.is_none(), "address handed out twice");
        self.0.allocs.fetch_add(1, Ordering::SeqCst);
    }

    fn untrack(&self, addr: usize, expected: Alloc) {
        let found = self.0.outstanding.lock().remove(&addr);
        assert_eq!(found, Some(expected), "release does not match an allocation");
        self.0.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn render(&self, ids: &[u32], skip_special: bool) -> Result<String, u32> {
        let mut words = Vec::with_capacity(ids.len());
        for &id in ids {
            let token = *VOCAB.get(id as usize).ok_or(id)?;
            if !(skip_special && SPECIAL.contains(&token)) {
                words.push(token);
            }
        }
        Ok(words.join(" "))
    }
}

/// Plain string content as is; multimodal parts as their text, with
/// `<image>` standing in for image parts.
fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::Array(parts) => parts
            .iter()
            .map(|part| match part["type"].as_str() {
                Some("text") => part["text"].as_str().unwrap().to_string(),
                _ => "<image>".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" "),
        other => other.as_str().unwrap().to_string(),
    }
}

unsafe impl Engine for FakeEngine {
    type Handle = FakeHandle;

    unsafe fn load(&self, path: *const c_char) -> *mut FakeHandle {
        let path = unsafe { CStr::from_ptr(path) }.to_str().unwrap();
        if path == MISSING_PATH {
            self.fail(2, format!("no such file: {path}"));
            return ptr::null_mut();
        }
        let seq = self.0.loads.fetch_add(1, Ordering::SeqCst);
        let h = Box::into_raw(Box::new(FakeHandle(seq)));
        assert!(self.0.live.lock().insert(h as usize), "handle address reused");
        h
    }

    unsafe fn free(&self, handle: *mut FakeHandle) {
        assert!(self.0.live.lock().remove(&(handle as usize)), "double free");
        drop(unsafe { Box::from_raw(handle) });
        self.0.frees.fetch_add(1, Ordering::SeqCst);
    }

    unsafe fn encode(
        &self,
        handle: *mut FakeHandle,
        text: *const c_char,
        add_special_tokens: c_int,
        out_ids: *mut *mut u32,
        out_len: *mut usize,
    ) -> Status {
        self.check_live(handle);
        let text = unsafe { CStr::from_ptr(text) }.to_str().unwrap();
        let mut ids = Vec::new();
        if add_special_tokens != 0 {
            ids.push(1);
        }
        for word in text.split_whitespace() {
            match VOCAB.iter().position(|t| *t == word) {
                Some(id) => ids.push(u32::try_from(id).unwrap()),
                None => return self.fail(3, format!("unknown word `{word}`")),
            }
        }
        if ids.is_empty() {
            unsafe {
                out_ids.write(ptr::null_mut());
                out_len.write(0);
            }
            return STATUS_OK;
        }
        let len = ids.len();
        let p = Box::into_raw(ids.into_boxed_slice()).cast::<u32>();
        self.track(p as usize, Alloc::Ids(len));
        unsafe {
            out_ids.write(p);
            out_len.write(len);
        }
        STATUS_OK
    }

    unsafe fn decode(
        &self,
        handle: *mut FakeHandle,
        ids: *const u32,
        len: usize,
        skip_special_tokens: c_int,
        out_str: *mut *mut c_char,
    ) -> Status {
        self.check_live(handle);
        let ids = unsafe { std::slice::from_raw_parts(ids, len) };
        match self.render(ids, skip_special_tokens != 0) {
            Ok(text) => {
                unsafe { out_str.write(self.alloc_string(&text)) };
                STATUS_OK
            }
            Err(id) => self.fail(4, format!("invalid id {id}")),
        }
    }

    /// Out-of-vocabulary ids decode to `<unk>` here, unlike `decode`.
    unsafe fn decode_id(
        &self,
        handle: *mut FakeHandle,
        id: u32,
        skip_special_tokens: c_int,
        out_str: *mut *mut c_char,
    ) -> Status {
        self.check_live(handle);
        let text = self
            .render(&[id], skip_special_tokens != 0)
            .unwrap_or_else(|_| VOCAB[0].to_string());
        unsafe { out_str.write(self.alloc_string(&text)) };
        STATUS_OK
    }

    unsafe fn token_to_id(
        &self,
        handle: *mut FakeHandle,
        token: *const c_char,
        out_id: *mut u32,
        out_found: *mut c_int,
    ) -> Status {
        self.check_live(handle);
        let token = unsafe { CStr::from_ptr(token) }.to_str().unwrap();
        if token == BROKEN_TOKEN {
            return self.fail(6, "lookup exploded");
        }
        match VOCAB.iter().position(|t| *t == token) {
            Some(id) => unsafe {
                out_id.write(u32::try_from(id).unwrap());
                out_found.write(1);
            },
            None => unsafe { out_found.write(0) },
        }
        STATUS_OK
    }

    unsafe fn id_to_token(
        &self,
        handle: *mut FakeHandle,
        id: u32,
        out_str: *mut *mut c_char,
        out_found: *mut c_int,
    ) -> Status {
        self.check_live(handle);
        match VOCAB.get(id as usize) {
            Some(token) => unsafe {
                out_str.write(self.alloc_string(token));
                out_found.write(1);
            },
            None => unsafe {
                out_str.write(ptr::null_mut());
                out_found.write(0);
            },
        }
        STATUS_OK
    }

    unsafe fn list_special_tokens(
        &self,
        handle: *mut FakeHandle,
        out_tokens: *mut *mut *mut c_char,
        out_len: *mut usize,
    ) -> Status {
        self.check_live(handle);
        let tokens: Box<[*mut c_char]> = SPECIAL
            .iter()
            .map(|t| CString::new(*t).unwrap().into_raw())
            .collect();
        let len = tokens.len();
        let p = Box::into_raw(tokens).cast::<*mut c_char>();
        self.track(p as usize, Alloc::Strings(len));
        unsafe {
            out_tokens.write(p);
            out_len.write(len);
        }
        STATUS_OK
    }

    unsafe fn chat_apply_template(
        &self,
        model_dir: *const c_char,
        messages_json: *const c_char,
        add_generation_prompt: c_int,
        out_prompt: *mut *mut c_char,
    ) -> Status {
        let model_dir = unsafe { CStr::from_ptr(model_dir) }.to_str().unwrap();
        if model_dir == MISSING_PATH {
            return self.fail(5, "chat template not found");
        }
        let messages_json = unsafe { CStr::from_ptr(messages_json) }.to_str().unwrap();
        let messages: Vec<serde_json::Value> = serde_json::from_str(messages_json).unwrap();
        let mut prompt = String::new();
        for m in &messages {
            let role = m["role"].as_str().unwrap();
            writeln!(prompt, "{role}: {}", content_text(&m["content"])).unwrap();
        }
        if add_generation_prompt != 0 {
            prompt.push_str("assistant:");
        }
        unsafe { out_prompt.write(self.alloc_string(&prompt)) };
        STATUS_OK
    }

    unsafe fn string_free(&self, s: *mut c_char) {
        self.untrack(s as usize, Alloc::String);
        drop(unsafe { CString::from_raw(s) });
    }

    unsafe fn ids_free(&self, ids: *mut u32, len: usize) {
        self.untrack(ids as usize, Alloc::Ids(len));
        drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ids, len)) });
    }

    unsafe fn string_array_free(&self, tokens: *mut *mut c_char, len: usize) {
        self.untrack(tokens as usize, Alloc::Strings(len));
        let tokens = unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(tokens, len)) };
        for &s in tokens.iter() {
            drop(unsafe { CString::from_raw(s) });
        }
    }

    fn last_error_message(&self) -> *const c_char {
        self.0.error_reads.fetch_add(1, Ordering::SeqCst);
        self.0.error.lock().as_ref().map_or(ptr::null(), |e| e.as_ptr())
    }

    fn clear_last_error(&self) {
        *self.0.error.lock() = None;
    }
}
