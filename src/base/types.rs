use chrono::{DateTime, Utc};
use serde_json::Value;

use super::error::CompletionError;

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

// Events.

/// A text message received from the monitored room.
///
/// Events are produced by the chat service and consumed read-only by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Unique event ID assigned by the homeserver.
    pub event_id: String,
    /// Fully qualified sender ID (e.g., `@alice:example.org`).
    pub sender: String,
    /// Plain-text body.
    pub body: String,
    /// Server timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Room the event was sent in.
    pub room_id: String,
    /// The raw `content` object of the event.
    pub content: Value,
    /// Edit or thread relation, if any.
    pub relation: Option<Relation>,
}

impl Event {
    /// Build an event, deriving its relation from the raw content.
    pub fn new(event_id: impl Into<String>, sender: impl Into<String>, body: impl Into<String>, timestamp: DateTime<Utc>, room_id: impl Into<String>, content: Value) -> Self {
        let relation = Relation::from_content(&content);

        Self {
            event_id: event_id.into(),
            sender: sender.into(),
            body: body.into(),
            timestamp,
            room_id: room_id.into(),
            content,
            relation,
        }
    }
}

/// Relation metadata carried by an event's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// The event replaces (edits) a prior event.
    Edit { replaces: Option<String> },
    /// The event is part of a thread.
    Thread { root: Option<String> },
    /// Any other relation (replies, annotations, etc.).
    Other { rel_type: String },
}

impl Relation {
    /// Derive the relation from a raw message content object.
    ///
    /// An `m.new_content` key marks an edit even when `m.relates_to` is missing or malformed.
    pub fn from_content(content: &Value) -> Option<Self> {
        let relates_to = content.get("m.relates_to");
        let target = relates_to.and_then(|r| r.get("event_id")).and_then(Value::as_str).map(str::to_string);
        let rel_type = relates_to.and_then(|r| r.get("rel_type")).and_then(Value::as_str);

        if content.get("m.new_content").is_some() || rel_type == Some("m.replace") {
            return Some(Relation::Edit { replaces: target });
        }

        match rel_type {
            Some("m.thread") => Some(Relation::Thread { root: target }),
            Some(other) => Some(Relation::Other { rel_type: other.to_string() }),
            None => None,
        }
    }

    /// The related event (edited message or thread root), if the content names one.
    pub fn target(&self) -> Option<&str> {
        match self {
            Relation::Edit { replaces } => replaces.as_deref(),
            Relation::Thread { root } => root.as_deref(),
            Relation::Other { .. } => None,
        }
    }
}

// Admission.

/// The reason an event was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Sent before this process started.
    BeforeSpawn,
    /// Sent in a room other than the monitored room.
    OtherRoom,
    /// An edit of a prior event.
    Edit,
    /// Part of a thread.
    Thread,
}

/// What the pipeline should do with an incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Ignore(IgnoreReason),
    RecordOnly,
    RecordAndRespond,
}

// Prompts.

/// The speaker of a prompt turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A single conversational turn sent to the completion backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// A fully assembled completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    /// System instruction (the preprompt).
    pub system: String,
    /// Conversation turns, oldest first.
    pub turns: Vec<Turn>,
    /// Sequences at which generation stops.
    pub stop: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl PromptRequest {
    /// Flatten the request into the plain text a completion backend would see.
    ///
    /// Used for token counting and for detecting an echoed prompt.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.turns.len() + 1);

        lines.push(self.system.as_str());
        lines.extend(self.turns.iter().map(|turn| turn.text.as_str()));

        lines.join("\n")
    }
}

// Outcomes.

/// The result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The event was not admitted.
    FilteredOut(IgnoreReason),
    /// The event was recorded but did not warrant a reply.
    Recorded,
    /// A reply was published.
    Replied(String),
    /// The context exceeded the token budget; the overflow notice was published.
    Overflowed,
    /// Generation failed; nothing was published.
    CompletionFailed(CompletionError),
    /// Shutdown was requested during generation; nothing was published.
    Cancelled,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_relation_from_plain_content() {
        assert_eq!(Relation::from_content(&json!({ "msgtype": "m.text", "body": "hi" })), None);
    }

    #[test]
    fn test_relation_from_edit_content() {
        let content = json!({
            "body": "* fixed",
            "m.new_content": { "body": "fixed" },
            "m.relates_to": { "rel_type": "m.replace", "event_id": "$orig" }
        });

        assert_eq!(Relation::from_content(&content), Some(Relation::Edit { replaces: Some("$orig".to_string()) }));
    }

    #[test]
    fn test_relation_from_new_content_without_relates_to() {
        let content = json!({ "body": "* fixed", "m.new_content": { "body": "fixed" } });

        assert_eq!(Relation::from_content(&content), Some(Relation::Edit { replaces: None }));
    }

    #[test]
    fn test_relation_from_thread_content() {
        let content = json!({ "body": "in thread", "m.relates_to": { "rel_type": "m.thread", "event_id": "$root" } });

        assert_eq!(Relation::from_content(&content), Some(Relation::Thread { root: Some("$root".to_string()) }));
    }

    #[test]
    fn test_relation_from_reply_content() {
        let content = json!({ "body": "reply", "m.relates_to": { "m.in_reply_to": { "event_id": "$a" } } });
        assert_eq!(Relation::from_content(&content), None);

        let content = json!({ "body": "ann", "m.relates_to": { "rel_type": "m.annotation", "event_id": "$a" } });
        assert_eq!(Relation::from_content(&content), Some(Relation::Other { rel_type: "m.annotation".to_string() }));
    }

    #[test]
    fn test_relation_target() {
        let edit = Relation::from_content(&json!({ "m.relates_to": { "rel_type": "m.replace", "event_id": "$orig" } })).unwrap();
        let thread = Relation::from_content(&json!({ "m.relates_to": { "rel_type": "m.thread", "event_id": "$root" } })).unwrap();
        let bare_edit = Relation::from_content(&json!({ "m.new_content": { "body": "x" } })).unwrap();
        let other = Relation::Other { rel_type: "m.annotation".to_string() };

        assert_eq!(edit.target(), Some("$orig"));
        assert_eq!(thread.target(), Some("$root"));
        assert_eq!(bare_edit.target(), None);
        assert_eq!(other.target(), None);
    }

    #[test]
    fn test_prompt_request_render() {
        let request = PromptRequest {
            system: "Be brief.".to_string(),
            turns: vec![
                Turn { role: Role::User, text: "@alice:x: hello".to_string() },
                Turn { role: Role::Assistant, text: "@bot:x: hi".to_string() },
            ],
            stop: vec![],
            temperature: 0.0,
            max_tokens: 16,
        };

        assert_eq!(request.render(), "Be brief.\n@alice:x: hello\n@bot:x: hi");
    }
}
