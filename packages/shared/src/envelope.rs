//! Wire envelope exchanged over the customer WebSocket.
//!
//! One JSON object per text frame:
//!
//! ```text
//! {messageType, content, senderType, metadata:{messageType, mediaUrl?, fileName?},
//!  sessionId?, senderId?, timestamp?}
//! ```
//!
//! Envelopes are immutable once emitted. The server is authoritative for the
//! persisted id and timestamp.

use serde::{Deserialize, Serialize};

/// Kind of frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    /// Client → server, first frame after the socket opens
    Auth,
    /// Client → server, customer message
    SendMessage,
    /// Server → client, message to render
    NewMessage,
    /// Anything this build does not understand
    #[serde(other)]
    Unknown,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Staff,
    #[serde(other)]
    Other,
}

/// Content kind of a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageType {
    #[default]
    Text,
    Image,
    File,
    Voice,
    System,
}

impl ChatMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Voice => "voice",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for ChatMessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            "voice" => Ok(Self::Voice),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message type '{other}'")),
        }
    }
}

/// Envelope metadata.
///
/// `apiKey` / `customerId` are only set on `auth` frames; `mediaUrl` /
/// `fileName` only on file messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<ChatMessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
}

/// One WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub message_type: EnvelopeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_type: Option<SenderType>,
    #[serde(default)]
    pub metadata: EnvelopeMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Unix timestamp in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Legacy top-level file URL, camel and snake spellings
    #[serde(default, alias = "file_url", skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Legacy top-level file name, camel and snake spellings
    #[serde(default, alias = "file_name", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl MessageEnvelope {
    fn empty(message_type: EnvelopeType) -> Self {
        Self {
            message_type,
            content: None,
            sender_type: None,
            metadata: EnvelopeMetadata::default(),
            session_id: None,
            sender_id: None,
            timestamp: None,
            file_url: None,
            file_name: None,
        }
    }

    /// `auth` frame sent right after the socket opens.
    pub fn auth(api_key: impl Into<String>, customer_id: impl Into<String>) -> Self {
        let mut envelope = Self::empty(EnvelopeType::Auth);
        envelope.metadata.api_key = Some(api_key.into());
        envelope.metadata.customer_id = Some(customer_id.into());
        envelope
    }

    /// Customer text (or other non-file) message.
    pub fn send_message(content: impl Into<String>, message_type: ChatMessageType) -> Self {
        let mut envelope = Self::empty(EnvelopeType::SendMessage);
        envelope.content = Some(content.into());
        envelope.sender_type = Some(SenderType::Customer);
        envelope.metadata.message_type = Some(message_type);
        envelope
    }

    /// Customer file message. Images show the file name, everything else the URL.
    pub fn send_file_message(
        file_url: impl Into<String>,
        file_name: impl Into<String>,
        message_type: ChatMessageType,
    ) -> Self {
        let file_url = file_url.into();
        let file_name = file_name.into();
        let content = if message_type == ChatMessageType::Image {
            file_name.clone()
        } else {
            file_url.clone()
        };
        let mut envelope = Self::send_message(content, message_type);
        envelope.metadata.media_url = Some(file_url);
        envelope.metadata.file_name = Some(file_name);
        envelope
    }

    /// Server push of a persisted message.
    pub fn new_message(
        content: impl Into<String>,
        sender_type: SenderType,
        metadata: EnvelopeMetadata,
    ) -> Self {
        let mut envelope = Self::empty(EnvelopeType::NewMessage);
        envelope.content = Some(content.into());
        envelope.sender_type = Some(sender_type);
        envelope.metadata = metadata;
        envelope
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// File URL carried by this envelope, preferring metadata over the legacy field.
    pub fn media_url(&self) -> Option<&str> {
        self.metadata
            .media_url
            .as_deref()
            .or(self.file_url.as_deref())
    }

    /// File name carried by this envelope, preferring metadata over the legacy field.
    pub fn media_file_name(&self) -> Option<&str> {
        self.metadata
            .file_name
            .as_deref()
            .or(self.file_name.as_deref())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_envelope_wire_shape() {
        // テスト項目: auth フレームは apiKey と customerId を metadata に持つ
        // given (前提条件):
        let envelope = MessageEnvelope::auth("shop-1", "guest-abc");

        // when (操作):
        let value: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        // then (期待する結果):
        assert_eq!(value["messageType"], "auth");
        assert_eq!(value["metadata"]["apiKey"], "shop-1");
        assert_eq!(value["metadata"]["customerId"], "guest-abc");
        assert!(value.get("content").is_none());
    }

    #[test]
    fn test_send_file_message_content_depends_on_type() {
        // テスト項目: 画像はファイル名、それ以外は URL を content に入れる
        // given (前提条件):
        let url = "https://cdn.example.com/a.png";

        // when (操作):
        let image = MessageEnvelope::send_file_message(url, "a.png", ChatMessageType::Image);
        let file = MessageEnvelope::send_file_message(url, "a.pdf", ChatMessageType::File);

        // then (期待する結果):
        assert_eq!(image.content.as_deref(), Some("a.png"));
        assert_eq!(file.content.as_deref(), Some(url));
        assert_eq!(image.metadata.media_url.as_deref(), Some(url));
        assert_eq!(image.sender_type, Some(SenderType::Customer));
    }

    #[test]
    fn test_unknown_message_type_is_tolerated() {
        // テスト項目: 未知の messageType でもパースに失敗しない
        // given (前提条件):
        let text = r#"{"messageType":"typing","content":"x"}"#;

        // when (操作):
        let envelope = MessageEnvelope::from_json(text).unwrap();

        // then (期待する結果):
        assert_eq!(envelope.message_type, EnvelopeType::Unknown);
    }

    #[test]
    fn test_legacy_snake_case_file_fields() {
        // テスト項目: file_url / file_name の旧フィールドも読み取れる
        // given (前提条件):
        let text = r#"{"messageType":"new_message","content":"f","senderType":"staff","file_url":"http://x/f.pdf","file_name":"f.pdf"}"#;

        // when (操作):
        let envelope = MessageEnvelope::from_json(text).unwrap();

        // then (期待する結果):
        assert_eq!(envelope.media_url(), Some("http://x/f.pdf"));
        assert_eq!(envelope.media_file_name(), Some("f.pdf"));
    }
}
