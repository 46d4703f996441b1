use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of the participant that authored a [`Turn`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
}

/// A named binary blob attached to a turn. The core never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    /// File name supplied by the client.
    pub name: String,
    /// Raw bytes. Serialized as standard base64.
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates a new attachment.
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Size of the payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A single message in a conversation.
///
/// Turns are immutable once created: fields are only reachable through
/// accessors, and stores hand out clones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    id: Uuid,
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
    timestamp: DateTime<Utc>,
}

impl Turn {
    /// Creates a new turn with the given role, content and attachments.
    pub fn new(role: Role, content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            attachments,
            timestamp: Utc::now(),
        }
    }

    /// Creates a [`Role::User`] turn.
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self::new(Role::User, content, attachments)
    }

    /// Creates a [`Role::Assistant`] turn without attachments.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, Vec::new())
    }

    /// Unique identifier of this turn.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Author of this turn.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Text content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Attached blobs, in the order the client supplied them.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// UTC creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True when the turn carries neither text nor attachments.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.attachments.is_empty()
    }
}

/// Encodes raw bytes the same way [`Attachment`] serializes them.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("Hello", vec![]);
        assert_eq!(turn.role(), Role::User);
        assert_eq!(turn.content(), "Hello");
        assert!(turn.attachments().is_empty());
        assert!(!turn.is_empty());
    }

    #[test]
    fn test_attachment_only_turn_is_not_empty() {
        let turn = Turn::user("", vec![Attachment::new("notes.txt", b"hi".to_vec())]);
        assert!(!turn.is_empty());
        assert!(Turn::user("", vec![]).is_empty());
    }

    #[test]
    fn test_attachment_serializes_as_base64() {
        let att = Attachment::new("a.bin", vec![0u8, 1, 2, 255]);
        let json = serde_json::to_value(&att).unwrap();
        assert_eq!(json["data"], encode_base64(&[0, 1, 2, 255]));

        let back: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, att);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
