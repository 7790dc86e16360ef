//! Host capabilities exposed to sandboxed plugin code
//!
//! A capability is a plain data-in/data-out function: arguments arrive as
//! JSON values and the result leaves as a JSON value. No host object ever
//! crosses into the sandbox.

use futures::future::LocalBoxFuture;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::rc::Rc;

pub type SyncFn = dyn Fn(Vec<Value>) -> anyhow::Result<Value>;
pub type AsyncFn = dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, anyhow::Result<Value>>;

#[derive(Clone)]
pub enum Capability {
    /// Returns to the plugin immediately
    Sync(Rc<SyncFn>),
    /// Returns a promise the plugin can await
    Async(Rc<AsyncFn>),
}

impl Capability {
    pub fn sync(f: impl Fn(Vec<Value>) -> anyhow::Result<Value> + 'static) -> Self {
        Self::Sync(Rc::new(f))
    }

    pub fn asynchronous(f: impl Fn(Vec<Value>) -> LocalBoxFuture<'static, anyhow::Result<Value>> + 'static) -> Self {
        Self::Async(Rc::new(f))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Capability({})", self.kind())
    }
}

/// Named capabilities available to one sandbox
#[derive(Clone, Debug, Default)]
pub struct CapabilitySet {
    entries: HashMap<String, Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability, replacing any previous one with the same name
    pub fn insert(&mut self, name: impl Into<String>, capability: Capability) {
        self.entries.insert(name.into(), capability);
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A new set with `overrides` layered on top; `self` is left untouched
    pub fn merged(&self, overrides: &CapabilitySet) -> CapabilitySet {
        let mut entries = self.entries.clone();
        for (name, capability) in &overrides.entries {
            entries.insert(name.clone(), capability.clone());
        }
        CapabilitySet { entries }
    }

    /// `{name: "sync" | "async" | "internal"}` for the sandbox bootstrap.
    /// Internal names stay reachable through the bridge but are not
    /// installed as globals.
    pub fn manifest(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .entries
            .iter()
            .map(|(name, cap)| {
                let kind = if is_internal(name) { "internal" } else { cap.kind() };
                (name.clone(), Value::String(kind.to_string()))
            })
            .collect();
        Value::Object(map)
    }
}

/// Names starting with `__` are host-internal and not installed as globals
pub fn is_internal(name: &str) -> bool {
    name.starts_with("__")
}

/// Result of an async capability call, keyed by the sandbox call id
#[derive(Debug)]
pub struct AsyncCompletion {
    pub id: u64,
    pub result: anyhow::Result<Value>,
}

/// `{"ok": value}` or `{"err": message}` as sent back into the sandbox
pub fn envelope(result: &anyhow::Result<Value>) -> String {
    let value = match result {
        Ok(v) => json!({ "ok": v }),
        Err(e) => json!({ "err": format!("{:#}", e) }),
    };
    value.to_string()
}

/// Invoke a sync capability from the sandbox bridge
pub(crate) fn call_sync(set: &CapabilitySet, name: &str, args_json: &str) -> anyhow::Result<Value> {
    let args = parse_args(args_json)?;
    match set.get(name) {
        Some(Capability::Sync(f)) => f(args),
        Some(Capability::Async(_)) => anyhow::bail!("Capability '{}' is asynchronous", name),
        None => anyhow::bail!("Unknown capability '{}'", name),
    }
}

/// Start an async capability; errors before the future exists resolve
/// immediately as a rejected call
pub(crate) fn call_async(
    set: &CapabilitySet,
    name: &str,
    args_json: &str,
    id: u64,
) -> LocalBoxFuture<'static, AsyncCompletion> {
    let started = parse_args(args_json).and_then(|args| match set.get(name) {
        Some(Capability::Async(f)) => Ok(f(args)),
        Some(Capability::Sync(f)) => Ok(Box::pin(futures::future::ready(f(args))) as LocalBoxFuture<'static, _>),
        None => Err(anyhow::anyhow!("Unknown capability '{}'", name)),
    });

    Box::pin(async move {
        let result = match started {
            Ok(fut) => fut.await,
            Err(e) => Err(e),
        };
        AsyncCompletion { id, result }
    })
}

fn parse_args(args_json: &str) -> anyhow::Result<Vec<Value>> {
    match serde_json::from_str(args_json)? {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn echo() -> Capability {
        Capability::sync(|args| Ok(Value::Array(args)))
    }

    #[test]
    fn test_merge_does_not_mutate_base() {
        let mut base = CapabilitySet::new();
        base.insert("greet", Capability::sync(|_| Ok(json!("base"))));
        base.insert("echo", echo());

        let mut overrides = CapabilitySet::new();
        overrides.insert("greet", Capability::sync(|_| Ok(json!("override"))));

        let merged = base.merged(&overrides);
        assert_eq!(call_sync(&merged, "greet", "[]").unwrap(), json!("override"));
        assert_eq!(call_sync(&base, "greet", "[]").unwrap(), json!("base"));
        assert!(merged.contains("echo"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_sync_call_and_envelope() {
        let mut set = CapabilitySet::new();
        set.insert("echo", echo());

        let result = call_sync(&set, "echo", "[1, \"a\"]");
        assert_eq!(envelope(&result), r#"{"ok":[1,"a"]}"#);

        let missing = call_sync(&set, "nope", "[]");
        assert_eq!(envelope(&missing), r#"{"err":"Unknown capability 'nope'"}"#);
    }

    #[test]
    fn test_async_call_completes_with_id() {
        let mut set = CapabilitySet::new();
        set.insert(
            "later",
            Capability::asynchronous(|args| async move { Ok(json!({"got": args})) }.boxed_local()),
        );
        let completion = futures::executor::block_on(call_async(&set, "later", "[true]", 7));
        assert_eq!(completion.id, 7);
        assert_eq!(completion.result.unwrap(), json!({"got": [true]}));

        let failed = futures::executor::block_on(call_async(&set, "missing", "[]", 8));
        assert!(failed.result.is_err());
    }

    #[test]
    fn test_manifest_and_internal_names() {
        let mut set = CapabilitySet::new();
        set.insert("div", echo());
        set.insert("prove", Capability::asynchronous(|_| async { Ok(Value::Null) }.boxed_local()));
        set.insert("__headers", echo());
        assert_eq!(
            set.manifest(),
            json!({"div": "sync", "prove": "async", "__headers": "internal"})
        );
        assert!(is_internal("__headers"));
        assert!(!is_internal("useState"));
    }
}
