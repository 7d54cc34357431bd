//! Admission of incoming room events.
//!
//! Classification is a pure function of the event and the relay's identity, monitored room,
//! and spawn time. Checks run in priority order; the timestamp and room checks come before
//! any content inspection.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::base::types::{AdmissionDecision, Event, IgnoreReason, Relation};

/// Message format that carries an HTML `formatted_body`.
const HTML_FORMAT: &str = "org.matrix.custom.html";

/// Prefix of a Matrix permalink to a user.
const PERMALINK_PREFIX: &str = "https://matrix.to/#/";

/// Classifies events as ignored, recorded, or recorded and answered.
#[derive(Debug, Clone)]
pub struct EventFilter {
    room_id: String,
    bot_user_id: String,
    spawn_time: DateTime<Utc>,
}

impl EventFilter {
    pub fn new(room_id: impl Into<String>, bot_user_id: impl Into<String>, spawn_time: DateTime<Utc>) -> Self {
        Self {
            room_id: room_id.into(),
            bot_user_id: bot_user_id.into(),
            spawn_time,
        }
    }

    /// Classify a single event.
    pub fn classify(&self, event: &Event) -> AdmissionDecision {
        if event.timestamp < self.spawn_time {
            return AdmissionDecision::Ignore(IgnoreReason::BeforeSpawn);
        }

        if event.room_id != self.room_id {
            return AdmissionDecision::Ignore(IgnoreReason::OtherRoom);
        }

        match event.relation {
            Some(Relation::Edit { .. }) => return AdmissionDecision::Ignore(IgnoreReason::Edit),
            Some(Relation::Thread { .. }) => return AdmissionDecision::Ignore(IgnoreReason::Thread),
            _ => {}
        }

        if event.sender == self.bot_user_id {
            return AdmissionDecision::RecordOnly;
        }

        if mentions_user(&event.content, &self.bot_user_id) {
            AdmissionDecision::RecordAndRespond
        } else {
            AdmissionDecision::RecordOnly
        }
    }
}

/// Whether the content carries a structured mention of `user_id`.
///
/// Accepts either an intentional mention (`m.mentions.user_ids`) or an HTML pill linking to the
/// user's permalink. A bare display name or user ID in the plain body does not count. Missing or
/// malformed fields mean "not mentioned".
pub fn mentions_user(content: &Value, user_id: &str) -> bool {
    let intentional = content
        .get("m.mentions")
        .and_then(|m| m.get("user_ids"))
        .and_then(Value::as_array)
        .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(user_id)));

    intentional || has_html_pill(content, user_id)
}

fn has_html_pill(content: &Value, user_id: &str) -> bool {
    if content.get("format").and_then(Value::as_str) != Some(HTML_FORMAT) {
        return false;
    }

    let Some(formatted_body) = content.get("formatted_body").and_then(Value::as_str) else {
        return false;
    };

    let permalink = format!("{PERMALINK_PREFIX}{user_id}");

    [format!("href=\"{permalink}\""), format!("href='{permalink}'")]
        .iter()
        .any(|href| formatted_body.contains(href.as_str()))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    const ROOM: &str = "!room:example.org";
    const BOT: &str = "@relay:example.org";

    fn spawn_time() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn filter() -> EventFilter {
        EventFilter::new(ROOM, BOT, spawn_time())
    }

    fn mention_content(body: &str) -> Value {
        json!({
            "msgtype": "m.text",
            "body": format!("relay: {body}"),
            "format": HTML_FORMAT,
            "formatted_body": format!("<a href=\"https://matrix.to/#/{BOT}\">relay</a>: {body}"),
        })
    }

    fn event(sender: &str, content: Value) -> Event {
        let body = content.get("body").and_then(Value::as_str).unwrap_or_default().to_string();
        Event::new("$event", sender, body, spawn_time() + Duration::seconds(1), ROOM, content)
    }

    #[test]
    fn test_mention_from_other_user_is_answered() {
        let event = event("@alice:example.org", mention_content("hello"));

        assert_eq!(filter().classify(&event), AdmissionDecision::RecordAndRespond);
    }

    #[test]
    fn test_plain_message_is_recorded_only() {
        let event = event("@alice:example.org", json!({ "msgtype": "m.text", "body": "hello everyone" }));

        assert_eq!(filter().classify(&event), AdmissionDecision::RecordOnly);
    }

    #[test]
    fn test_bare_user_id_in_body_is_not_a_mention() {
        let event = event("@alice:example.org", json!({ "msgtype": "m.text", "body": format!("hey {BOT}") }));

        assert_eq!(filter().classify(&event), AdmissionDecision::RecordOnly);
    }

    #[test]
    fn test_intentional_mention_is_answered() {
        let content = json!({ "msgtype": "m.text", "body": "relay: hi", "m.mentions": { "user_ids": [BOT] } });
        let event = event("@alice:example.org", content);

        assert_eq!(filter().classify(&event), AdmissionDecision::RecordAndRespond);
    }

    #[test]
    fn test_pill_for_another_user_is_not_a_mention() {
        let content = json!({
            "msgtype": "m.text",
            "body": "bob: hi",
            "format": HTML_FORMAT,
            "formatted_body": "<a href=\"https://matrix.to/#/@bob:example.org\">bob</a>: hi",
        });

        assert_eq!(filter().classify(&event("@alice:example.org", content)), AdmissionDecision::RecordOnly);
    }

    #[test]
    fn test_malformed_mention_fields_mean_absent() {
        let content = json!({ "msgtype": "m.text", "body": "x", "format": 7, "formatted_body": null, "m.mentions": "nope" });

        assert_eq!(filter().classify(&event("@alice:example.org", content)), AdmissionDecision::RecordOnly);
    }

    #[test]
    fn test_self_authored_mention_is_recorded_only() {
        let event = event(BOT, mention_content("talking to myself"));

        assert_eq!(filter().classify(&event), AdmissionDecision::RecordOnly);
    }

    #[test]
    fn test_events_before_spawn_are_ignored_regardless_of_content() {
        let mut event = event("@alice:example.org", mention_content("old news"));
        event.timestamp = spawn_time() - Duration::milliseconds(1);

        assert_eq!(filter().classify(&event), AdmissionDecision::Ignore(IgnoreReason::BeforeSpawn));

        // Takes priority over the room check too.
        event.room_id = "!elsewhere:example.org".to_string();
        assert_eq!(filter().classify(&event), AdmissionDecision::Ignore(IgnoreReason::BeforeSpawn));
    }

    #[test]
    fn test_event_at_spawn_time_is_admitted() {
        let mut event = event("@alice:example.org", mention_content("just in time"));
        event.timestamp = spawn_time();

        assert_eq!(filter().classify(&event), AdmissionDecision::RecordAndRespond);
    }

    #[test]
    fn test_other_room_is_ignored() {
        let mut event = event("@alice:example.org", mention_content("wrong room"));
        event.room_id = "!elsewhere:example.org".to_string();

        assert_eq!(filter().classify(&event), AdmissionDecision::Ignore(IgnoreReason::OtherRoom));
    }

    #[test]
    fn test_edits_are_ignored() {
        let mut content = mention_content("edited");
        content["m.new_content"] = json!({ "body": "edited" });
        content["m.relates_to"] = json!({ "rel_type": "m.replace", "event_id": "$orig" });

        assert_eq!(filter().classify(&event("@alice:example.org", content)), AdmissionDecision::Ignore(IgnoreReason::Edit));
    }

    #[test]
    fn test_thread_messages_are_ignored() {
        let mut content = mention_content("threaded");
        content["m.relates_to"] = json!({ "rel_type": "m.thread", "event_id": "$root" });

        assert_eq!(filter().classify(&event("@alice:example.org", content)), AdmissionDecision::Ignore(IgnoreReason::Thread));
    }

    #[test]
    fn test_self_authored_thread_message_is_ignored() {
        let mut content = json!({ "msgtype": "m.text", "body": "mine" });
        content["m.relates_to"] = json!({ "rel_type": "m.thread", "event_id": "$root" });

        assert_eq!(filter().classify(&event(BOT, content)), AdmissionDecision::Ignore(IgnoreReason::Thread));
    }
}
