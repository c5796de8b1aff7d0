//! JSON-RPC `call_kw` envelope building and reply classification.
//!
//! The upstream signals success with a `result` key and failure with an
//! `error` key even on HTTP 200, so classification inspects both the status
//! code and the body.

use serde_json::{json, Value};

use hrbridge_core::{CallSpec, UpstreamError};

pub const CALL_KW_PATH: &str = "/web/dataset/call_kw";
pub const AUTHENTICATE_PATH: &str = "/web/session/authenticate";

/// Raw reply from one upstream POST, before classification. A refreshed
/// session cookie shows up on authentication replies.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
    pub session_cookie: Option<String>,
}

pub fn call_kw_body(spec: &CallSpec, id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "call",
        "params": {
            "model": spec.model,
            "method": spec.method,
            "args": spec.args,
            "kwargs": spec.kwargs,
        },
        "id": id,
    })
}

pub fn authenticate_body(database: &str, login: &str, password: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "call",
        "params": {
            "db": database,
            "login": login,
            "password": password,
        },
        "id": 1,
    })
}

/// Classify one reply into the result payload or a typed failure.
pub fn classify_reply(response: &RawResponse) -> Result<Value, UpstreamError> {
    match response.status {
        200 => {}
        401 | 403 => {
            return Err(UpstreamError::session_expired(format!(
                "upstream rejected the session cookie (HTTP {})",
                response.status
            )))
        }
        404 => return Err(UpstreamError::not_found("upstream endpoint or record not found")),
        status => {
            return Err(UpstreamError::upstream_fault(format!(
                "upstream returned HTTP {status}"
            )))
        }
    }

    if let Some(error) = response.body.get("error") {
        return Err(classify_error_object(error));
    }

    match response.body.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(UpstreamError::upstream_fault("reply carried neither result nor error")),
    }
}

fn classify_error_object(error: &Value) -> UpstreamError {
    let name = error_field(error, "name").to_lowercase();
    let message = {
        let text = error_field(error, "message");
        if text.is_empty() {
            "upstream call failed".to_owned()
        } else {
            text
        }
    };
    let code = error.get("code").map(value_as_string).unwrap_or_default();

    if message.to_lowercase().contains("session expired")
        || name.contains("sessionexpiredexception")
        || code == "100"
    {
        return UpstreamError::session_expired(message);
    }

    if name.contains("validationerror") || name.contains("usererror") {
        return UpstreamError::validation(message);
    }

    // Access denials map to NotFound on purpose: callers must not be able
    // to distinguish someone else's record from a missing one.
    if name.contains("accesserror") || name.contains("accessdenied") || name.contains("missingerror")
    {
        return UpstreamError::not_found(message);
    }

    UpstreamError::upstream_fault(message)
}

/// Error fields live either at the top level or nested under `data`,
/// depending on the upstream version.
fn error_field(error: &Value, key: &str) -> String {
    error
        .get("data")
        .and_then(|data| data.get(key))
        .or_else(|| error.get(key))
        .map(value_as_string)
        .unwrap_or_default()
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
