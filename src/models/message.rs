//! Message-related models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message identity. Provisional for optimistic sends, authoritative once
/// the service confirms the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Fresh locally-generated id for an optimistic message.
    pub fn provisional() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Delivery progress reported by the service for sent messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Delivering,
    Delivered,
    SomeRead,
    AllRead,
}

/// Kind of media carried by an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

/// Where attachment bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MediaSource {
    /// Plain remote URL.
    Url { url: String },
    /// Service-managed asset. `url` is empty until the upload completes.
    Asset { name: String, url: String },
}

/// Media attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub kind: MediaKind,
    pub source: MediaSource,
    pub mime_type: String,
    /// Free-form numeric metadata (e.g. `length` in ms for audio).
    #[serde(default)]
    pub metadata: BTreeMap<String, i64>,
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
    pub delivery_state: Option<DeliveryState>,
    /// Last send attempt errored.
    #[serde(default)]
    pub failed: bool,
}

impl Message {
    /// New optimistic message authored locally.
    pub fn outgoing(author_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::provisional(),
            author_id: author_id.to_string(),
            created_at,
            body: None,
            attachment: None,
            delivery_state: None,
            failed: false,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Body text, empty for media-only messages.
    pub fn text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Delivery state for display. Failed messages never report one.
    pub fn display_delivery_state(&self) -> Option<DeliveryState> {
        if self.failed {
            None
        } else {
            self.delivery_state
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisional_ids_are_unique() {
        assert_ne!(MessageId::provisional(), MessageId::provisional());
    }

    #[test]
    fn test_failed_message_hides_delivery_state() {
        let mut msg = Message::outgoing("me", Utc::now()).with_body("hi");
        msg.delivery_state = Some(DeliveryState::Delivered);
        assert_eq!(msg.display_delivery_state(), Some(DeliveryState::Delivered));

        msg.failed = true;
        assert_eq!(msg.display_delivery_state(), None);
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message::outgoing("alice", Utc::now()).with_body("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["authorId"], "alice");
        assert_eq!(json["body"], "hello");
        assert_eq!(json["failed"], false);

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }
}
