//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`.
//! Role: Shared contract helper for CLI diagnostics such as partial purges.
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: JSON schema is stable once published; fields are additive-only.
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub data_dir: String,
    pub message: String,
    pub details: Map<String, Value>,
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    inner.insert("data_dir".to_string(), json!(notice.data_dir));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}
