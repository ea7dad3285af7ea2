//! Inbound frame handling.
//!
//! Only staff-authored `new_message` envelopes with content reach listeners.
//! The customer's own messages are already shown locally, so their echo is
//! dropped here.

use quicktalk_shared::envelope::{ChatMessageType, EnvelopeType, MessageEnvelope, SenderType};

use crate::{page::PageContext, url_adapter::adapt_url_protocol};

/// Chat message handed to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub content: String,
    pub message_type: ChatMessageType,
    pub sender_type: SenderType,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    pub session_id: Option<String>,
    pub sender_id: Option<String>,
    /// Protocol-adapted file URL
    pub file_url: Option<String>,
    pub file_name: Option<String>,
}

/// Result of decoding one text frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Forward to listeners
    Message(ChatMessage),
    /// Customer message reflected back by the server
    Echo,
    /// Not a chat message, or empty
    Ignored,
    /// Not valid JSON
    Malformed(String),
}

/// Context needed to build a [`ChatMessage`]
pub struct InboundContext<'a> {
    pub page: &'a PageContext,
    pub public_server: Option<&'a str>,
    /// Used when the envelope carries no timestamp
    pub received_at: i64,
}

/// テキストフレームを解釈する
pub fn decode_frame(text: &str, ctx: &InboundContext<'_>) -> Inbound {
    let envelope = match MessageEnvelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => return Inbound::Malformed(e.to_string()),
    };

    if envelope.message_type != EnvelopeType::NewMessage {
        return Inbound::Ignored;
    }
    let Some(content) = envelope.content.as_deref().filter(|c| !c.is_empty()) else {
        return Inbound::Ignored;
    };

    // senderType がない場合はスタッフとみなす
    let sender_type = envelope.sender_type.unwrap_or(SenderType::Staff);
    if sender_type != SenderType::Staff {
        return Inbound::Echo;
    }

    let file_url = envelope
        .media_url()
        .map(|url| adapt_url_protocol(url, ctx.page, ctx.public_server));

    Inbound::Message(ChatMessage {
        content: content.to_string(),
        message_type: envelope.metadata.message_type.unwrap_or_default(),
        sender_type,
        timestamp: envelope.timestamp.unwrap_or(ctx.received_at),
        file_name: envelope.media_file_name().map(str::to_string),
        file_url,
        session_id: envelope.session_id,
        sender_id: envelope.sender_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(page: &PageContext) -> InboundContext<'_> {
        InboundContext {
            page,
            public_server: None,
            received_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_staff_message_is_forwarded() {
        // テスト項目: スタッフの new_message はリスナーに渡される
        // given (前提条件):
        let page = PageContext::default();
        let text = r#"{"messageType":"new_message","content":"hello","senderType":"staff","metadata":{"messageType":"text"},"timestamp":1672531200000,"senderId":"staff-1"}"#;

        // when (操作):
        let inbound = decode_frame(text, &ctx(&page));

        // then (期待する結果):
        let Inbound::Message(message) = inbound else {
            panic!("expected message, got {inbound:?}");
        };
        assert_eq!(message.content, "hello");
        assert_eq!(message.timestamp, 1672531200000);
        assert_eq!(message.sender_id.as_deref(), Some("staff-1"));
    }

    #[test]
    fn test_customer_echo_is_suppressed() {
        // テスト項目: 顧客自身のメッセージの反射は転送されない
        // given (前提条件):
        let page = PageContext::default();
        let text = r#"{"messageType":"new_message","content":"mine","senderType":"customer"}"#;

        // when (操作):
        let inbound = decode_frame(text, &ctx(&page));

        // then (期待する結果):
        assert_eq!(inbound, Inbound::Echo);
    }

    #[test]
    fn test_empty_and_non_chat_frames_are_ignored() {
        // テスト項目: content が空のもの、new_message 以外は無視され、壊れた JSON は区別される
        // given (前提条件):
        let page = PageContext::default();
        let empty = r#"{"messageType":"new_message","content":"","senderType":"staff"}"#;
        let auth = r#"{"messageType":"auth","metadata":{"apiKey":"shop-1"}}"#;

        // when (操作):
        let empty = decode_frame(empty, &ctx(&page));
        let auth = decode_frame(auth, &ctx(&page));
        let broken = decode_frame("{not json", &ctx(&page));

        // then (期待する結果):
        assert_eq!(empty, Inbound::Ignored);
        assert_eq!(auth, Inbound::Ignored);
        assert!(matches!(broken, Inbound::Malformed(_)));
    }

    #[test]
    fn test_file_url_is_protocol_adapted() {
        // テスト項目: metadata.mediaUrl が優先され、HTTPS ページでは https に変換される
        // given (前提条件):
        let page = PageContext::new("https", "shop.example.com", None);
        let text = r#"{"messageType":"new_message","content":"a.png","senderType":"staff","metadata":{"messageType":"image","mediaUrl":"http://cdn.example.com/a.png","fileName":"a.png"},"fileUrl":"http://cdn.example.com/legacy.png"}"#;

        // when (操作):
        let inbound = decode_frame(text, &ctx(&page));

        // then (期待する結果):
        let Inbound::Message(message) = inbound else {
            panic!("expected message, got {inbound:?}");
        };
        assert_eq!(message.message_type, ChatMessageType::Image);
        assert_eq!(
            message.file_url.as_deref(),
            Some("https://cdn.example.com/a.png")
        );
        assert_eq!(message.file_name.as_deref(), Some("a.png"));
        assert_eq!(message.timestamp, 1_700_000_000_000);
    }
}
