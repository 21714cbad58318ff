// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Normalizes loose upstream message payloads into [`MessageInfo`].
//!
//! This is the only module that touches upstream field names. Unknown
//! message kinds pass through with their raw tag and unhandled content;
//! payloads missing the message id or chat JID normalize to `None` and are
//! rejected before the durable log.

use serde_json::Value;

use wagate_core::model::{MediaContent, MessageContent, MessageInfo};

/// Upstream kind that carries protocol bookkeeping, never user content.
pub const PROTOCOL_MESSAGE: &str = "protocolMessage";

/// Whether the raw payload is a protocol message (skipped entirely).
pub fn is_protocol_message(raw: &Value) -> bool {
    raw.get("message")
        .and_then(|m| m.get(PROTOCOL_MESSAGE))
        .is_some()
}

/// Normalizes a raw upstream message payload.
///
/// Returns `None` when the payload has no usable `key.id` or
/// `key.remoteJid`.
pub fn normalize(raw: &Value) -> Option<MessageInfo> {
    let key = raw.get("key")?;
    let id = key.get("id")?.as_str().filter(|s| !s.is_empty())?;
    let from = key.get("remoteJid")?.as_str().filter(|s| !s.is_empty())?;
    let from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);
    let timestamp = timestamp_seconds(raw.get("messageTimestamp"));
    let push_name = raw
        .get("pushName")
        .and_then(Value::as_str)
        .map(str::to_string);

    let (kind, content) = match raw.get("message").and_then(Value::as_object) {
        Some(message) => normalize_content(message),
        None => ("unknown".to_string(), MessageContent::Unhandled),
    };

    Some(MessageInfo {
        id: id.to_string(),
        from: from.to_string(),
        from_me,
        timestamp,
        kind,
        push_name,
        content,
    })
}

/// Upstream timestamps arrive as integers or decimal strings.
fn timestamp_seconds(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn normalize_content(
    message: &serde_json::Map<String, Value>,
) -> (String, MessageContent) {
    if let Some(text) = message.get("conversation").and_then(Value::as_str) {
        return (
            "conversation".to_string(),
            MessageContent::Text {
                text: text.to_string(),
                context_info: None,
            },
        );
    }
    if let Some(ext) = message.get("extendedTextMessage") {
        return (
            "extendedTextMessage".to_string(),
            MessageContent::Text {
                text: str_field(ext, "text").unwrap_or_default(),
                context_info: ext.get("contextInfo").cloned(),
            },
        );
    }
    if let Some(img) = message.get("imageMessage") {
        return ("imageMessage".to_string(), MessageContent::Image(media(img)));
    }
    if let Some(vid) = message.get("videoMessage") {
        return ("videoMessage".to_string(), MessageContent::Video(media(vid)));
    }
    if let Some(aud) = message.get("audioMessage") {
        return ("audioMessage".to_string(), MessageContent::Audio(media(aud)));
    }
    if let Some(doc) = message.get("documentMessage") {
        return (
            "documentMessage".to_string(),
            MessageContent::Document(media(doc)),
        );
    }
    if let Some(sticker) = message.get("stickerMessage") {
        return (
            "stickerMessage".to_string(),
            MessageContent::Sticker(media(sticker)),
        );
    }
    if let Some(loc) = message.get("locationMessage") {
        return (
            "locationMessage".to_string(),
            MessageContent::Location {
                latitude: loc
                    .get("degreesLatitude")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                longitude: loc
                    .get("degreesLongitude")
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0),
                name: str_field(loc, "name"),
            },
        );
    }
    if let Some(contact) = message.get("contactMessage") {
        return (
            "contactMessage".to_string(),
            MessageContent::Contact {
                display_name: str_field(contact, "displayName").unwrap_or_default(),
                vcard: str_field(contact, "vcard").unwrap_or_default(),
            },
        );
    }

    // Opaque passthrough: keep the raw tag, mark the content unhandled.
    let tag = message
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    (tag, MessageContent::Unhandled)
}

fn media(value: &Value) -> MediaContent {
    MediaContent {
        caption: str_field(value, "caption"),
        mimetype: str_field(value, "mimetype"),
        file_name: str_field(value, "fileName"),
        seconds: value
            .get("seconds")
            .and_then(Value::as_u64)
            .map(|s| s as u32),
    }
}

fn str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_conversation_normalizes() {
        let raw = json!({
            "key": {"id": "A1", "remoteJid": "1555@s.whatsapp.net", "fromMe": false},
            "messageTimestamp": 1_700_000_000,
            "message": {"conversation": "hi"},
            "pushName": "Bob",
        });

        let msg = normalize(&raw).unwrap();
        assert_eq!(msg.id, "A1");
        assert_eq!(msg.from, "1555@s.whatsapp.net");
        assert!(!msg.from_me);
        assert_eq!(msg.timestamp, 1_700_000_000);
        assert_eq!(msg.kind, "conversation");
        assert_eq!(msg.push_name.as_deref(), Some("Bob"));
        assert!(!msg.is_group());
        match msg.content {
            MessageContent::Text { ref text, .. } => assert_eq!(text, "hi"),
            ref other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn extended_text_carries_context_info() {
        let raw = json!({
            "key": {"id": "A2", "remoteJid": "1555@s.whatsapp.net"},
            "messageTimestamp": 1_700_000_001,
            "message": {
                "extendedTextMessage": {
                    "text": "quoted reply",
                    "contextInfo": {"stanzaId": "A1"},
                }
            },
        });

        let msg = normalize(&raw).unwrap();
        assert_eq!(msg.kind, "extendedTextMessage");
        match msg.content {
            MessageContent::Text { ref text, ref context_info } => {
                assert_eq!(text, "quoted reply");
                assert_eq!(context_info.as_ref().unwrap()["stanzaId"], "A1");
            }
            ref other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn media_kinds_map_to_their_families() {
        let raw = json!({
            "key": {"id": "A3", "remoteJid": "1555@s.whatsapp.net"},
            "messageTimestamp": 1_700_000_002,
            "message": {
                "imageMessage": {"caption": "pic", "mimetype": "image/jpeg"}
            },
        });
        let msg = normalize(&raw).unwrap();
        assert_eq!(msg.kind, "imageMessage");
        match msg.content {
            MessageContent::Image(ref media) => {
                assert_eq!(media.caption.as_deref(), Some("pic"));
                assert_eq!(media.mimetype.as_deref(), Some("image/jpeg"));
            }
            ref other => panic!("expected image, got {other:?}"),
        }

        let raw = json!({
            "key": {"id": "A4", "remoteJid": "1555@s.whatsapp.net"},
            "message": {
                "videoMessage": {"caption": "clip", "seconds": 12}
            },
        });
        let msg = normalize(&raw).unwrap();
        assert_eq!(msg.kind, "videoMessage");
        match msg.content {
            MessageContent::Video(ref media) => assert_eq!(media.seconds, Some(12)),
            ref other => panic!("expected video, got {other:?}"),
        }

        let raw = json!({
            "key": {"id": "A5", "remoteJid": "1555@s.whatsapp.net"},
            "message": {
                "documentMessage": {"fileName": "report.pdf", "mimetype": "application/pdf"}
            },
        });
        let msg = normalize(&raw).unwrap();
        match msg.content {
            MessageContent::Document(ref media) => {
                assert_eq!(media.file_name.as_deref(), Some("report.pdf"));
            }
            ref other => panic!("expected document, got {other:?}"),
        }
    }

    #[test]
    fn location_and_contact_normalize() {
        let raw = json!({
            "key": {"id": "L1", "remoteJid": "1555@s.whatsapp.net"},
            "message": {
                "locationMessage": {
                    "degreesLatitude": 52.52,
                    "degreesLongitude": 13.405,
                    "name": "Berlin",
                }
            },
        });
        let msg = normalize(&raw).unwrap();
        match msg.content {
            MessageContent::Location { latitude, longitude, ref name } => {
                assert!((latitude - 52.52).abs() < f64::EPSILON);
                assert!((longitude - 13.405).abs() < f64::EPSILON);
                assert_eq!(name.as_deref(), Some("Berlin"));
            }
            ref other => panic!("expected location, got {other:?}"),
        }

        let raw = json!({
            "key": {"id": "C1", "remoteJid": "1555@s.whatsapp.net"},
            "message": {
                "contactMessage": {"displayName": "Bob", "vcard": "BEGIN:VCARD..."}
            },
        });
        let msg = normalize(&raw).unwrap();
        match msg.content {
            MessageContent::Contact { ref display_name, ref vcard } => {
                assert_eq!(display_name, "Bob");
                assert!(vcard.starts_with("BEGIN:VCARD"));
            }
            ref other => panic!("expected contact, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_passes_through_with_raw_tag() {
        let raw = json!({
            "key": {"id": "P1", "remoteJid": "1555@s.whatsapp.net"},
            "message": {"pollCreationMessage": {"name": "lunch?"}},
        });
        let msg = normalize(&raw).unwrap();
        assert_eq!(msg.kind, "pollCreationMessage");
        assert!(matches!(msg.content, MessageContent::Unhandled));
    }

    #[test]
    fn protocol_messages_are_detected() {
        let raw = json!({
            "key": {"id": "P2", "remoteJid": "1555@s.whatsapp.net"},
            "message": {"protocolMessage": {"type": 0}},
        });
        assert!(is_protocol_message(&raw));

        let raw = json!({
            "key": {"id": "A1", "remoteJid": "1555@s.whatsapp.net"},
            "message": {"conversation": "hi"},
        });
        assert!(!is_protocol_message(&raw));
    }

    #[test]
    fn missing_id_or_jid_rejects() {
        let raw = json!({
            "key": {"remoteJid": "1555@s.whatsapp.net"},
            "message": {"conversation": "hi"},
        });
        assert!(normalize(&raw).is_none());

        let raw = json!({
            "key": {"id": "A1"},
            "message": {"conversation": "hi"},
        });
        assert!(normalize(&raw).is_none());

        let raw = json!({
            "key": {"id": "", "remoteJid": "1555@s.whatsapp.net"},
            "message": {"conversation": "hi"},
        });
        assert!(normalize(&raw).is_none());
    }

    #[test]
    fn string_timestamps_parse() {
        let raw = json!({
            "key": {"id": "A1", "remoteJid": "1555@s.whatsapp.net"},
            "messageTimestamp": "1700000000",
            "message": {"conversation": "hi"},
        });
        assert_eq!(normalize(&raw).unwrap().timestamp, 1_700_000_000);
    }
}
