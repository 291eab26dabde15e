// Verify the wire format matches what existing chat clients expect.
// Discriminants and field names are load-bearing; these tests pin them.

use roomcast_protocol::{decode_batch, Message, MSG_TYPE_CHAT, MSG_TYPE_INFO};

#[test]
fn chat_message_shape() {
    let msg = Message::chat("alice", "hi there");
    let json = serde_json::to_string(&msg).unwrap();

    assert!(json.contains(r#""type":1"#));
    assert!(json.contains(r#""chatMessage""#));
    assert!(json.contains(r#""from":"alice""#));
    assert!(json.contains(r#""content":"hi there""#));
    assert!(json.contains(r#""timestamp""#));
    // the unset variant must be absent, not null
    assert!(!json.contains(r#""infoMessage""#));
    assert!(!json.contains("null"));
}

#[test]
fn info_message_shape() {
    let msg = Message::info(8);
    let json = serde_json::to_string(&msg).unwrap();

    assert!(json.contains(r#""type":4"#));
    assert!(json.contains(r#""infoMessage""#));
    assert!(json.contains(r#""onlineCount":8"#));
    assert!(!json.contains(r#""chatMessage""#));
    assert!(!json.contains("null"));
}

#[test]
fn discriminants_are_stable() {
    assert_eq!(MSG_TYPE_CHAT, 1);
    assert_eq!(MSG_TYPE_INFO, 4);
    assert_eq!(Message::chat("a", "b").msg_type, 1);
    assert_eq!(Message::info(0).msg_type, 4);
}

#[test]
fn decodes_batch_from_foreign_encoder() {
    // Payload as the original server encodes it: an ordered JSON array.
    let payload = r#"[
        {"type":1,"payload":{"chatMessage":{"from":"bob","content":"one","timestamp":"2026-01-02T03:04:05Z"}}},
        {"type":4,"payload":{"infoMessage":{"onlineCount":3}}}
    ]"#;

    let batch = decode_batch(payload).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].msg_type, 1);
    assert_eq!(batch[0].payload.chat.as_ref().unwrap().from, "bob");
    assert!(batch[0].payload.info.is_none());
    assert_eq!(batch[1].payload.info.as_ref().unwrap().online_count, 3);
}

#[test]
fn rejects_malformed_payload() {
    assert!(decode_batch("{not json").is_err());
    assert!(decode_batch(r#"{"type":1}"#).is_err()); // object, not array
}
