//! JSONL log parsing
//!
//! Each non-blank line is one record with `type`, `content`, `timestamp`,
//! `uuid` and `parentUuid`. Claude Code nests the text under
//! `message.content`; both shapes are accepted. Lines that fail to decode are
//! skipped with a warning and never abort the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Who produced a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    User,
    Assistant,
    System,
    /// Any other record type, kept verbatim
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One conversational turn, in its wire shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: String,
    #[serde(rename = "uuid")]
    pub id: String,
    #[serde(rename = "parentUuid")]
    pub parent_id: Option<String>,
}

/// A line that was skipped while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct Parsed {
    pub messages: Vec<Message>,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<Value>,
    message: Option<Value>,
    timestamp: Option<String>,
    uuid: Option<String>,
    #[serde(rename = "parentUuid")]
    parent_uuid: Option<String>,
}

impl RawRecord {
    fn into_message(self, line: usize) -> Message {
        let content = self
            .content
            .filter(|c| !c.is_null())
            .or_else(|| self.message.and_then(|m| m.get("content").cloned()))
            .map(|c| flatten_content(&c))
            .unwrap_or_default();

        Message {
            kind: MessageKind::from(self.kind.unwrap_or_else(|| "unknown".to_string())),
            content,
            timestamp: self.timestamp.unwrap_or_default(),
            id: self.uuid.unwrap_or_else(|| format!("missing-{}", line)),
            parent_id: self.parent_uuid,
        }
    }
}

/// Reduce a content value to text: strings pass through, block arrays keep
/// their `text` parts, anything else is kept as JSON.
fn flatten_content(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect();
            if texts.is_empty() {
                value.to_string()
            } else {
                texts.join("\n")
            }
        }
        other => other.to_string(),
    }
}

/// Parse one session log.
///
/// Only failing to open the file is an error; bad lines end up in
/// [`Parsed::warnings`].
pub fn parse_log(path: &Path) -> Result<Parsed> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open session file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut parsed = Parsed::default();

    for (idx, chunk) in reader.split(b'\n').enumerate() {
        let line_number = idx + 1;
        let bytes = chunk.with_context(|| format!("reading {}", path.display()))?;

        let line = match String::from_utf8(bytes) {
            Ok(l) => l,
            Err(e) => {
                skip(&mut parsed, path, line_number, e.to_string());
                continue;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<RawRecord>(line) {
            Ok(record) => parsed.messages.push(record.into_message(line_number)),
            Err(e) => skip(&mut parsed, path, line_number, e.to_string()),
        }
    }

    Ok(parsed)
}

fn skip(parsed: &mut Parsed, path: &Path, line: usize, error: String) {
    tracing::warn!(
        "Skipping corrupted line {} in {}: {}",
        line,
        path.display(),
        error
    );
    parsed.warnings.push(ParseWarning { line, error });
}

/// Advisory check: no duplicate ids, timestamps never go backwards.
pub fn validate(messages: &[Message]) -> bool {
    let mut seen = HashSet::new();
    for msg in messages {
        if !seen.insert(msg.id.as_str()) {
            tracing::warn!("Duplicate message id found: {}", msg.id);
            return false;
        }
    }

    for pair in messages.windows(2) {
        if pair[1].timestamp < pair[0].timestamp {
            tracing::warn!(
                "Timestamps not monotonically increasing at {} ({} < {})",
                pair[1].id,
                pair[1].timestamp,
                pair[0].timestamp
            );
            return false;
        }
    }

    true
}

/// Serialize messages as newline-delimited JSON
pub fn to_jsonl(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|m| match serde_json::to_string(m) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!("Failed to serialize message {}: {}", m.id, e);
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn msg(id: &str, ts: &str) -> Message {
        Message {
            kind: MessageKind::User,
            content: String::new(),
            timestamp: ts.to_string(),
            id: id.to_string(),
            parent_id: None,
        }
    }

    #[test]
    fn test_parse_skips_blank_and_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"type":"user","content":"hi","timestamp":"2025-01-20T10:00:00Z","uuid":"u1","parentUuid":null}"#,
                "\n\n",
                "{not json\n",
                r#"{"type":"assistant","content":"hello","timestamp":"2025-01-20T10:00:01Z","uuid":"u2","parentUuid":"u1"}"#,
                "\n",
            ),
        )
        .unwrap();

        let parsed = parse_log(&path).unwrap();
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].kind, MessageKind::Assistant);
        assert_eq!(parsed.messages[1].parent_id.as_deref(), Some("u1"));
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 3);
    }

    #[test]
    fn test_parse_invalid_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        let mut body = b"{\"type\":\"user\",\"uuid\":\"a\"}\n".to_vec();
        body.extend_from_slice(&[0xff, 0xfe, b'\n']);
        body.extend_from_slice(b"{\"type\":\"user\",\"uuid\":\"b\"}");
        fs::write(&path, body).unwrap();

        let parsed = parse_log(&path).unwrap();
        let ids: Vec<_> = parsed.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].line, 2);
    }

    #[test]
    fn test_missing_uuid_gets_line_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(&path, "\n{\"type\":\"user\",\"content\":\"x\"}\n").unwrap();

        let parsed = parse_log(&path).unwrap();
        assert_eq!(parsed.messages[0].id, "missing-2");
        assert_eq!(parsed.messages[0].timestamp, "");
    }

    #[test]
    fn test_nested_claude_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"type":"assistant","uuid":"a","message":{"role":"assistant","content":[{"type":"text","text":"one"},{"type":"tool_use","name":"Bash"},{"type":"text","text":"two"}]}}"#,
                "\n",
                r#"{"type":"summary","uuid":"b","content":{"k":1}}"#,
            ),
        )
        .unwrap();

        let parsed = parse_log(&path).unwrap();
        assert_eq!(parsed.messages[0].content, "one\ntwo");
        assert_eq!(parsed.messages[1].kind, MessageKind::Other("summary".into()));
        assert_eq!(parsed.messages[1].content, r#"{"k":1}"#);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_log(&dir.path().join("gone.jsonl")).is_err());
    }

    #[test]
    fn test_validate() {
        assert!(validate(&[]));
        assert!(validate(&[msg("a", "1"), msg("b", "2")]));
        assert!(!validate(&[msg("a", "1"), msg("a", "2")]));
        assert!(!validate(&[msg("a", "2"), msg("b", "1")]));
    }

    #[test]
    fn test_jsonl_wire_fields() {
        let mut m = msg("u2", "t");
        m.kind = MessageKind::Other("summary".into());
        m.parent_id = Some("u1".into());
        let out = to_jsonl(&[msg("u1", "t"), m]);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "user");
        assert_eq!(first["uuid"], "u1");
        assert!(first["parentUuid"].is_null());

        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["type"], "summary");
        assert_eq!(second["parentUuid"], "u1");
    }
}
