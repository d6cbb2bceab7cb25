//! Custom type dispatch and post-decode hooks (spec.md §4.7)
//!
//! A process-wide ordered list of (predicate, handler) pairs lets a host
//! register encode-time overrides for values the generic object encoder
//! wouldn't otherwise know how to handle. A second list of post-decode
//! hooks runs once per fully-decoded root value, mirroring the alias
//! registry's `Mutex`-guarded global-state shape (`alias.rs`,
//! `registry/store.rs`).

use std::sync::Mutex;

use crate::value::Value;

/// Matches a value against some host-defined condition (a type check, a
/// class-name check, whatever the registrant needs).
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;
/// Replaces a matched value with one the generic encoder knows how to
/// serialize (spec.md §4.7: "returns a replacement value that is then
/// encoded normally").
pub type Handler = Box<dyn Fn(&Value) -> Value + Send + Sync>;
/// Runs once against a fully-decoded root value, optionally transforming it.
pub type PostDecodeHook = Box<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Default)]
struct Dispatch {
    types: Vec<(Predicate, Handler)>,
    post_decode: Vec<PostDecodeHook>,
}

static DISPATCH: Mutex<Option<Dispatch>> = Mutex::new(None);

fn with_dispatch<R>(f: impl FnOnce(&mut Dispatch) -> R) -> R {
    let mut guard = DISPATCH.lock().unwrap();
    let dispatch = guard.get_or_insert_with(Dispatch::default);
    f(dispatch)
}

/// Registers a custom encode-time override (spec.md §6 `add_type`). The
/// first registered predicate that matches a value wins.
pub fn add_type(predicate: Predicate, handler: Handler) {
    with_dispatch(|d| {
        d.types.push((predicate, handler));
        tracing::debug!(count = d.types.len(), "registered custom type handler");
    });
}

/// Registers a hook invoked once per fully-decoded root value (spec.md §6
/// `add_post_decode_processor`).
pub fn add_post_decode_processor(hook: PostDecodeHook) {
    with_dispatch(|d| {
        d.post_decode.push(hook);
        tracing::debug!(count = d.post_decode.len(), "registered post-decode hook");
    });
}

/// Walks the registered type handlers, returning the first match's
/// replacement value. Called by the encoders before falling back to
/// generic object encoding.
pub fn dispatch_encode(value: &Value) -> Option<Value> {
    with_dispatch(|d| {
        d.types
            .iter()
            .find(|(pred, _)| pred(value))
            .map(|(_, handler)| handler(value))
    })
}

/// Runs every registered post-decode hook over `value` in registration
/// order, threading the (possibly transformed) result through each.
pub fn run_post_decode(value: Value) -> Value {
    with_dispatch(|d| d.post_decode.iter().fold(value, |v, hook| hook(v)))
}
