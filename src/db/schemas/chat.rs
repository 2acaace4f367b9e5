//! Chat message document schema
//!
//! Messages live in one collection keyed by room id and expire after
//! 30 days via a TTL index on `sent_at`.

use std::time::Duration;

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for chat messages
pub const CHAT_COLLECTION: &str = "chat_messages";

/// Message retention before the TTL index removes it
const MESSAGE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Chat message stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessageDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Room id: the two participant ids sorted and joined with '_'
    pub room_id: String,

    pub sender_id: ObjectId,

    pub recipient_id: ObjectId,

    pub content: String,

    pub sent_at: DateTime,
}

impl ChatMessageDoc {
    pub fn new(sender_id: ObjectId, recipient_id: ObjectId, content: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            room_id: room_id(&sender_id, &recipient_id),
            sender_id,
            recipient_id,
            content,
            sent_at: DateTime::now(),
        }
    }
}

impl Default for ChatMessageDoc {
    fn default() -> Self {
        Self::new(ObjectId::new(), ObjectId::new(), String::new())
    }
}

/// Canonical room id for a pair of users, independent of who writes first
pub fn room_id(a: &ObjectId, b: &ObjectId) -> String {
    let (a, b) = (a.to_hex(), b.to_hex());
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

impl IntoIndexes for ChatMessageDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "room_id": 1, "sent_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("room_sent_index".to_string())
                        .build(),
                ),
            ),
            // TTL: messages disappear 30 days after being sent
            (
                doc! { "sent_at": 1 },
                Some(
                    IndexOptions::builder()
                        .expire_after(MESSAGE_TTL)
                        .name("sent_at_ttl".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ChatMessageDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_is_order_independent() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_eq!(room_id(&a, &b), room_id(&b, &a));
    }

    #[test]
    fn test_room_id_format() {
        let a = ObjectId::parse_str("64f1a2b3c4d5e6f708192a3b").unwrap();
        let b = ObjectId::parse_str("64f1a2b3c4d5e6f708192a3c").unwrap();
        assert_eq!(
            room_id(&b, &a),
            "64f1a2b3c4d5e6f708192a3b_64f1a2b3c4d5e6f708192a3c"
        );
    }

    #[test]
    fn test_new_message_uses_canonical_room() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let from_a = ChatMessageDoc::new(a, b, "hola".into());
        let from_b = ChatMessageDoc::new(b, a, "hola".into());
        assert_eq!(from_a.room_id, from_b.room_id);
    }
}
