use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag prefixed to the session id event payload.
pub const SESSION_ID_TAG: &str = "[SESSION_ID]";
/// Tag prefixed to each retrieved source payload.
pub const SOURCE_TAG: &str = "[SOURCE]";
/// Payload of the terminal event.
pub const DONE_TAG: &str = "[DONE]";

// =============================================================================
// Chat history
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a stored role string. Accepts both `user`/`assistant` and the
    /// `human`/`ai` spelling used by the Elasticsearch history layout.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" | "human" => Some(Role::User),
            "assistant" | "ai" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single immutable message in a session's history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Retrieval
// =============================================================================

/// A document passage returned by the document store.
///
/// `metadata` is whatever the index carries for the passage; a `name` entry
/// is expected to hold a human-readable source name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub page_content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RetrievedPassage {
    pub fn new(
        page_content: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }

    /// Human-readable source name from metadata, or `"unknown"`.
    pub fn source_name(&self) -> &str {
        self.metadata
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
    }

    /// Flattened JSON form sent to clients: all metadata keys plus
    /// `page_content`. `page_content` wins over a metadata key of the same name.
    pub fn to_source_json(&self) -> serde_json::Value {
        let mut obj = self.metadata.clone();
        obj.insert(
            "page_content".to_string(),
            serde_json::Value::String(self.page_content.clone()),
        );
        serde_json::Value::Object(obj)
    }
}

// =============================================================================
// Stream events
// =============================================================================

/// One event of the answer stream.
///
/// A well-formed stream is: one `SessionId`, any number of `Source`, any
/// number of `Token`, one `Done`.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    SessionId(String),
    Source(RetrievedPassage),
    Token(String),
    Done,
}

impl StreamEvent {
    /// Payload carried after `data: ` on the wire.
    ///
    /// Bare carriage returns cannot be carried in an SSE field, so they are
    /// normalised to `\n`.
    pub fn to_data(&self) -> String {
        match self {
            StreamEvent::SessionId(id) => format!("{} {}", SESSION_ID_TAG, id),
            StreamEvent::Source(passage) => {
                format!("{} {}", SOURCE_TAG, passage.to_source_json())
            }
            StreamEvent::Token(text) => normalize_newlines(text),
            StreamEvent::Done => DONE_TAG.to_string(),
        }
    }
}

fn normalize_newlines(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn passage() -> RetrievedPassage {
        let meta = json!({"name": "policy.pdf", "url": "https://example.com/policy"});
        RetrievedPassage::new("Returns within 30 days.", meta.as_object().unwrap().clone())
    }

    #[test]
    fn test_role_round_trip_strings() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::parse("human"), Some(Role::User));
        assert_eq!(Role::parse("ai"), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn test_message_constructors() {
        let m = Message::user("hi");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.content, "hi");
        assert_eq!(Message::assistant("yo").role, Role::Assistant);
    }

    #[test]
    fn test_source_name() {
        assert_eq!(passage().source_name(), "policy.pdf");
        assert_eq!(RetrievedPassage::default().source_name(), "unknown");
    }

    #[test]
    fn test_source_json_flattens_metadata() {
        let v = passage().to_source_json();
        assert_eq!(v["name"], "policy.pdf");
        assert_eq!(v["url"], "https://example.com/policy");
        assert_eq!(v["page_content"], "Returns within 30 days.");
    }

    #[test]
    fn test_page_content_overrides_metadata_key() {
        let meta = json!({"page_content": "stale"});
        let p = RetrievedPassage::new("fresh", meta.as_object().unwrap().clone());
        assert_eq!(p.to_source_json()["page_content"], "fresh");
    }

    #[test]
    fn test_session_id_frame() {
        let ev = StreamEvent::SessionId("s1".to_string());
        assert_eq!(ev.to_data(), "[SESSION_ID] s1");
    }

    #[test]
    fn test_source_frame_is_tagged_json() {
        let data = StreamEvent::Source(passage()).to_data();
        let json_part = data.strip_prefix("[SOURCE] ").unwrap();
        let v: serde_json::Value = serde_json::from_str(json_part).unwrap();
        assert_eq!(v["name"], "policy.pdf");
    }

    #[test]
    fn test_token_frame_is_raw() {
        let ev = StreamEvent::Token("Hello".to_string());
        assert_eq!(ev.to_data(), "Hello");
    }

    #[test]
    fn test_multiline_token_frame() {
        let ev = StreamEvent::Token("a\r\nb".to_string());
        assert_eq!(ev.to_data(), "a\nb");
        assert_eq!(StreamEvent::Token("a\rb".to_string()).to_data(), "a\nb");
    }

    #[test]
    fn test_done_frame() {
        assert_eq!(StreamEvent::Done.to_data(), "[DONE]");
    }
}
