//! Cross-session history assembly
//!
//! Pure function over raw transcript rows: normalize legacy content
//! shapes, then keep only the most recent image-bearing message verbatim;
//! every earlier image collapses to its text part or the removal
//! placeholder.

use avatar_core::{Content, Message, StoredMessage};

/// Assemble raw rows into LLM-ready history, oldest first.
pub fn assemble(raw: &[StoredMessage]) -> Vec<Message> {
    let mut messages: Vec<Message> = raw
        .iter()
        .map(|row| Message {
            role: row.role,
            content: Content::from_stored(&row.content),
        })
        .collect();

    if let Some(keep) = messages.iter().rposition(|m| m.content.has_image()) {
        for (index, message) in messages.iter_mut().enumerate() {
            if index != keep && message.content.has_image() {
                message.content = message.content.strip_image();
            }
        }
    }
    messages
}

/// Strip every image from already-assembled history. Used when the
/// current user message carries an image, making it the most recent
/// image-bearing message of the turn.
pub fn strip_all_images(messages: &mut [Message]) {
    for message in messages.iter_mut() {
        if message.content.has_image() {
            message.content = message.content.strip_image();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_core::{Role, IMAGE_REMOVED_PLACEHOLDER};
    use serde_json::json;

    fn row(role: Role, content: serde_json::Value) -> StoredMessage {
        StoredMessage { role, content }
    }

    #[test]
    fn keeps_only_most_recent_image() {
        let raw = vec![
            row(
                Role::User,
                json!([{"kind": "text", "text": "first look"},
                       {"kind": "image", "url": "https://img/1.jpg"}]),
            ),
            row(Role::Assistant, json!("Nice outfit!")),
            row(
                Role::User,
                json!([{"kind": "image", "url": "https://img/2.jpg"}]),
            ),
        ];

        let assembled = assemble(&raw);
        let with_images = assembled
            .iter()
            .filter(|m| m.content.has_image())
            .collect::<Vec<_>>();
        assert_eq!(with_images.len(), 1);
        assert_eq!(with_images[0].content.image_url(), Some("https://img/2.jpg"));

        // The earlier image collapsed to its text part.
        assert_eq!(assembled[0].content, Content::Text("first look".to_string()));
    }

    #[test]
    fn image_only_messages_collapse_to_placeholder() {
        let raw = vec![
            row(Role::User, json!([{"kind": "image", "url": "https://img/1.jpg"}])),
            row(Role::User, json!([{"kind": "image", "url": "https://img/2.jpg"}])),
        ];
        let assembled = assemble(&raw);
        assert_eq!(
            assembled[0].content,
            Content::Text(IMAGE_REMOVED_PLACEHOLDER.to_string())
        );
        assert!(assembled[1].content.has_image());
    }

    #[test]
    fn legacy_objects_normalize_to_strings() {
        let raw = vec![
            row(Role::Assistant, json!({"type": "workout_plan", "data": {"days": 5}})),
            row(Role::User, json!("thanks")),
        ];
        let assembled = assemble(&raw);
        match &assembled[0].content {
            Content::Text(text) => assert!(text.starts_with("Workout plan generated:")),
            other => panic!("expected text, got {:?}", other),
        }
        // No plain-object content survives assembly.
        assert!(assembled.iter().all(|m| matches!(
            m.content,
            Content::Text(_) | Content::Parts(_)
        )));
    }

    #[test]
    fn strip_all_images_clears_history() {
        let raw = vec![row(
            Role::User,
            json!([{"kind": "text", "text": "see"}, {"kind": "image", "url": "u"}]),
        )];
        let mut assembled = assemble(&raw);
        strip_all_images(&mut assembled);
        assert!(assembled.iter().all(|m| !m.content.has_image()));
    }
}
