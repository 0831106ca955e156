use serde::{Deserialize, Serialize};
use texvalid_syntax::Diagnostic;

/// Messages from the editor to the worker, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    /// Replace the whole document text.
    SetValue { text: String },
    Terminate,
}

/// Messages from the worker to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event {
    /// The full diagnostic list for the latest document text.
    Lint { data: Vec<Diagnostic> },
    Terminate,
}

impl Request {
    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

impl Event {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
