//! ドメインモデルと DTO の変換

use crate::{
    domain::{ChatMessage, Conversation, Shop},
    infrastructure::dto::http as dto,
    usecase::{ConnectOutcome, MessagePage, SendReceipt},
};

impl From<&Shop> for dto::ShopDto {
    fn from(shop: &Shop) -> Self {
        Self {
            id: shop.id.clone(),
            name: shop.name.clone(),
            domain: shop.domain.clone(),
        }
    }
}

impl From<&Conversation> for dto::ConversationDto {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            shop_id: conversation.shop_id.clone(),
            user_id: conversation.user_id.clone(),
            created_at: conversation.created_at,
        }
    }
}

impl From<ChatMessage> for dto::ChatMessageDto {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_type: message.sender_type,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            media_url: message.media_url,
            file_name: message.file_name,
            created_at: message.created_at,
            is_read: message.is_read,
        }
    }
}

impl From<ConnectOutcome> for dto::ConnectResponse {
    fn from(outcome: ConnectOutcome) -> Self {
        Self {
            session_id: outcome.session.session_id,
            shop: (&outcome.shop).into(),
            conversation: (&outcome.conversation).into(),
            expires_at: outcome.expires_at,
        }
    }
}

impl From<SendReceipt> for dto::SendMessageResponse {
    fn from(receipt: SendReceipt) -> Self {
        Self {
            message_id: receipt.message_id,
            conversation_id: receipt.conversation_id,
            status: "sent".to_string(),
            timestamp: receipt.timestamp,
        }
    }
}

impl From<MessagePage> for dto::MessagesResponse {
    fn from(page: MessagePage) -> Self {
        Self {
            messages: page.messages.into_iter().map(Into::into).collect(),
            conversation_id: page.conversation_id,
            has_more: page.has_more,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicktalk_shared::envelope::{ChatMessageType, SenderType};

    #[test]
    fn test_send_receipt_without_id_serializes_null() {
        // テスト項目: 永続化に失敗した送信は messageId: null, status: "sent" になる
        // given (前提条件):
        let receipt = SendReceipt {
            message_id: None,
            conversation_id: "conv_1".to_string(),
            timestamp: 10,
        };

        // when (操作):
        let body = serde_json::to_value(dto::Success::new(dto::SendMessageResponse::from(
            receipt,
        )))
        .unwrap();

        // then (期待する結果):
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "sent");
        assert!(body["messageId"].is_null());
    }

    #[test]
    fn test_chat_message_to_dto() {
        // テスト項目: メッセージが camelCase の DTO に変換される
        // given (前提条件):
        let message = ChatMessage {
            id: 3,
            conversation_id: "conv_1".to_string(),
            sender_type: SenderType::Staff,
            sender_id: "staff-1".to_string(),
            content: "hi".to_string(),
            message_type: ChatMessageType::Image,
            media_url: Some("http://x/a.png".to_string()),
            file_name: None,
            created_at: 42,
            is_read: false,
        };

        // when (操作):
        let value = serde_json::to_value(dto::ChatMessageDto::from(message)).unwrap();

        // then (期待する結果):
        assert_eq!(value["senderType"], "staff");
        assert_eq!(value["messageType"], "image");
        assert_eq!(value["mediaUrl"], "http://x/a.png");
        assert!(value.get("fileName").is_none());
    }
}
