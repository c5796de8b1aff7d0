use serde::Serialize;
use serde_json::{json, Map, Value};

/// One upstream `call_kw` invocation: model, method, positional args, and
/// named kwargs. Immutable once built; the executor serializes it into the
/// JSON-RPC envelope.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CallSpec {
    pub model: String,
    pub method: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallSpec {
    pub fn new(model: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            method: method.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn arg(mut self, value: Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(key.into(), value);
        self
    }

    /// `search_read` with a domain filter and field list.
    pub fn search_read(model: impl Into<String>, domain: Value, fields: &[&str]) -> Self {
        Self::new(model, "search_read")
            .kwarg("domain", domain)
            .kwarg("fields", json!(fields))
    }

    /// `read` of specific record ids with a field list.
    pub fn read(model: impl Into<String>, ids: &[i64], fields: &[&str]) -> Self {
        Self::new(model, "read").arg(json!(ids)).kwarg("fields", json!(fields))
    }

    /// `create` with a single values object.
    pub fn create(model: impl Into<String>, values: Value) -> Self {
        Self::new(model, "create").arg(values)
    }

    /// `write` of a values object onto specific record ids.
    pub fn write(model: impl Into<String>, ids: &[i64], values: Value) -> Self {
        Self::new(model, "write").arg(json!(ids)).arg(values)
    }

    /// `unlink` (delete) of specific record ids.
    pub fn unlink(model: impl Into<String>, ids: &[i64]) -> Self {
        Self::new(model, "unlink").arg(json!(ids))
    }

    /// A zero-argument workflow method invoked on specific record ids.
    pub fn invoke(model: impl Into<String>, method: impl Into<String>, ids: &[i64]) -> Self {
        Self::new(model, method).arg(json!(ids))
    }
}
