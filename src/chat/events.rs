//! Pure parsers turning raw chat-gateway event payloads into typed records.
//!
//! Events arrive as loosely-typed JSON (the gateway's wire shape is a
//! Matrix-style event object); these functions validate and narrow that
//! shape without touching storage or the network.

use serde_json::Value;

/// Normalized Room-1 PDF intake event required for case creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRoom1PdfIntakeEvent {
    pub room_id: String,
    pub event_id: String,
    pub sender_user_id: String,
    pub mxc_url: String,
    pub filename: Option<String>,
    pub mimetype: Option<String>,
}

/// Parse a Room-1 event, returning the normalized payload if it's a
/// human-originated PDF file message, `None` otherwise (not an error — most
/// events in the room are not qualifying intake events).
pub fn parse_room1_pdf_intake_event(
    room_id: &str,
    event: &Value,
    bot_user_id: &str,
) -> Option<ParsedRoom1PdfIntakeEvent> {
    let sender = event.get("sender")?.as_str()?;
    if sender == bot_user_id {
        return None;
    }

    let event_id = event.get("event_id")?.as_str()?;
    if event_id.is_empty() {
        return None;
    }

    let content = event.get("content")?.as_object()?;

    if content.get("msgtype").and_then(Value::as_str) != Some("m.file") {
        return None;
    }

    let info = content.get("info").and_then(Value::as_object);
    let mimetype = info.and_then(|i| i.get("mimetype")).and_then(Value::as_str);
    let filename = content.get("body").and_then(Value::as_str);

    let url = content
        .get("url")
        .and_then(Value::as_str)
        .or_else(|| {
            content
                .get("file")
                .and_then(Value::as_object)
                .and_then(|f| f.get("url"))
                .and_then(Value::as_str)
        })
        .filter(|u| u.starts_with("mxc://"))?;

    let is_pdf = mimetype.map(|m| m.eq_ignore_ascii_case("application/pdf")).unwrap_or(false)
        || filename.map(|f| f.to_lowercase().ends_with(".pdf")).unwrap_or(false);
    if !is_pdf {
        return None;
    }

    Some(ParsedRoom1PdfIntakeEvent {
        room_id: room_id.to_string(),
        event_id: event_id.to_string(),
        sender_user_id: sender.to_string(),
        mxc_url: url.to_string(),
        filename: filename.map(str::to_string),
        mimetype: mimetype.map(str::to_string),
    })
}

/// Normalized reaction event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub room_id: String,
    pub reaction_event_id: String,
    pub reactor_user_id: String,
    pub related_event_id: String,
    pub reaction_key: String,
}

pub fn parse_matrix_reaction_event(
    room_id: &str,
    event: &Value,
    bot_user_id: &str,
) -> Option<ReactionEvent> {
    if event.get("type").and_then(Value::as_str) != Some("m.reaction") {
        return None;
    }

    let sender = event.get("sender")?.as_str()?;
    if sender == bot_user_id {
        return None;
    }

    let reaction_event_id = event.get("event_id")?.as_str()?;
    if reaction_event_id.is_empty() {
        return None;
    }

    let content = event.get("content")?.as_object()?;
    let relates = content.get("m.relates_to")?.as_object()?;
    if relates.get("rel_type").and_then(Value::as_str) != Some("m.annotation") {
        return None;
    }

    let related_event_id = relates.get("event_id")?.as_str()?;
    let reaction_key = relates.get("key")?.as_str()?;
    if related_event_id.is_empty() || reaction_key.is_empty() {
        return None;
    }

    Some(ReactionEvent {
        room_id: room_id.to_string(),
        reaction_event_id: reaction_event_id.to_string(),
        reactor_user_id: sender.to_string(),
        related_event_id: related_event_id.to_string(),
        reaction_key: reaction_key.to_string(),
    })
}

/// Normalized Room-3 scheduler reply event (a threaded text reply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room3ReplyEvent {
    pub room_id: String,
    pub event_id: String,
    pub sender_user_id: String,
    pub body: String,
    pub reply_to_event_id: String,
}

pub fn parse_room3_reply_event(
    room_id: &str,
    event: &Value,
    bot_user_id: &str,
) -> Option<Room3ReplyEvent> {
    if event.get("type").and_then(Value::as_str) != Some("m.room.message") {
        return None;
    }

    let sender = event.get("sender")?.as_str()?;
    if sender == bot_user_id {
        return None;
    }

    let event_id = event.get("event_id")?.as_str()?;
    if event_id.is_empty() {
        return None;
    }

    let content = event.get("content")?.as_object()?;
    if content.get("msgtype").and_then(Value::as_str) != Some("m.text") {
        return None;
    }

    let body = content.get("body")?.as_str()?;

    let relates = content.get("m.relates_to")?.as_object()?;
    let reply_meta = relates.get("m.in_reply_to")?.as_object()?;
    let reply_to_event_id = reply_meta.get("event_id")?.as_str()?;
    if reply_to_event_id.is_empty() {
        return None;
    }

    Some(Room3ReplyEvent {
        room_id: room_id.to_string(),
        event_id: event_id.to_string(),
        sender_user_id: sender.to_string(),
        body: body.to_string(),
        reply_to_event_id: reply_to_event_id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_pdf_intake_by_mimetype() {
        let event = json!({
            "sender": "@human:example.org",
            "event_id": "$1",
            "content": {
                "msgtype": "m.file",
                "body": "report",
                "url": "mxc://example.org/abc",
                "info": {"mimetype": "application/pdf"},
            }
        });
        let parsed = parse_room1_pdf_intake_event("!r1:example.org", &event, "@bot:example.org").unwrap();
        assert_eq!(parsed.mxc_url, "mxc://example.org/abc");
    }

    #[test]
    fn ignores_events_from_bot() {
        let event = json!({
            "sender": "@bot:example.org",
            "event_id": "$1",
            "content": {"msgtype": "m.file", "url": "mxc://x/y"}
        });
        assert!(parse_room1_pdf_intake_event("!r1", &event, "@bot:example.org").is_none());
    }

    #[test]
    fn parses_pdf_intake_by_filename_extension() {
        let event = json!({
            "sender": "@human:example.org",
            "event_id": "$1",
            "content": {"msgtype": "m.file", "body": "laudo.PDF", "url": "mxc://x/y"}
        });
        assert!(parse_room1_pdf_intake_event("!r1", &event, "@bot:example.org").is_some());
    }

    #[test]
    fn parses_reaction_event() {
        let event = json!({
            "type": "m.reaction",
            "sender": "@human:example.org",
            "event_id": "$reaction-1",
            "content": {
                "m.relates_to": {"rel_type": "m.annotation", "event_id": "$target-1", "key": "👍"}
            }
        });
        let parsed = parse_matrix_reaction_event("!r2", &event, "@bot:example.org").unwrap();
        assert_eq!(parsed.related_event_id, "$target-1");
    }

    #[test]
    fn parses_room3_reply_event() {
        let event = json!({
            "type": "m.room.message",
            "sender": "@scheduler:example.org",
            "event_id": "$2",
            "content": {
                "msgtype": "m.text",
                "body": "status: confirmado",
                "m.relates_to": {"m.in_reply_to": {"event_id": "$1"}}
            }
        });
        let parsed = parse_room3_reply_event("!r3", &event, "@bot:example.org").unwrap();
        assert_eq!(parsed.reply_to_event_id, "$1");
    }
}
