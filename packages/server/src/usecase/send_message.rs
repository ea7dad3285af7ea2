//! UseCase: メッセージ送信
//!
//! ## 顧客からの送信（`execute`）
//!
//! 1. 必須パラメータと本文長（5000 文字まで）を検証
//! 2. 店舗 × 顧客の会話を取得、なければ作成
//! 3. メッセージを永続化し、顧客の開いているソケットへ `new_message` として返す
//! 4. 利用量カウンタを加算
//!
//! 3 と 4 の失敗はログに残すだけで呼び出し元には返さない（ベストエフォート）。
//! 永続化に失敗した場合、受領結果の `message_id` は `None` になる。
//!
//! ## スタッフからの返信（`reply_as_staff`）
//!
//! 永続化した上で、顧客のソケットが接続中なら `new_message` を push する。
//! 未接続の顧客はポーリングで受け取る。

use std::sync::Arc;

use quicktalk_shared::{
    envelope::{ChatMessageType, EnvelopeMetadata, MessageEnvelope, SenderType},
    time::Clock,
};

use crate::domain::{
    ChatMessage, ClientMeta, MessageContent, MessagePusher, MessageRepository, NewChatMessage,
    ShopRepository, SocketKey, UsageDelta,
};

use super::error::ServiceError;

/// 顧客メッセージの送信コマンド
#[derive(Debug, Clone, Default)]
pub struct SendMessageCommand {
    pub user_id: Option<String>,
    pub message: Option<String>,
    pub message_type: ChatMessageType,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub meta: ClientMeta,
}

impl SendMessageCommand {
    /// 必須項目と文字数を検査する。店舗の解決や副作用より先に呼ぶ
    pub fn validate(&self) -> Result<MessageContent, ServiceError> {
        ServiceError::require(&[
            ("userId", self.user_id.as_deref()),
            ("message", self.message.as_deref()),
        ])?;
        Ok(MessageContent::parse(self.message.as_deref().unwrap_or_default())?)
    }
}

/// 送信の受領結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<i64>,
    pub conversation_id: String,
    pub timestamp: i64,
}

/// スタッフ返信の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffReplyReceipt {
    pub message: ChatMessage,
    /// 顧客のソケットへ push できたか
    pub delivered: bool,
}

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    shops: Arc<dyn ShopRepository>,
    messages: Arc<dyn MessageRepository>,
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl SendMessageUseCase {
    pub fn new(
        shops: Arc<dyn ShopRepository>,
        messages: Arc<dyn MessageRepository>,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shops,
            messages,
            message_pusher,
            clock,
        }
    }

    /// 顧客メッセージを受け付ける
    pub async fn execute(
        &self,
        shop_id: &str,
        command: SendMessageCommand,
    ) -> Result<SendReceipt, ServiceError> {
        let content = command.validate()?;
        let user_id = command.user_id.as_deref().unwrap_or_default().trim();

        let now = self.clock.now_millis();
        let conversation = self
            .messages
            .create_or_get_conversation(shop_id, user_id, command.meta, now)
            .await?;

        let new_message = NewChatMessage {
            conversation_id: conversation.id.clone(),
            sender_type: SenderType::Customer,
            sender_id: user_id.to_string(),
            content: content.into_inner(),
            message_type: command.message_type,
            media_url: command.media_url,
            file_name: command.file_name,
            created_at: now,
        };
        let message_id = match self.messages.add_message(new_message).await {
            Ok(stored) => {
                self.reflect_to_customer(shop_id, &stored).await;
                Some(stored.id)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to persist message from {}/{}: {}",
                    shop_id,
                    user_id,
                    e
                );
                None
            }
        };

        if let Err(e) = self.shops.record_usage(shop_id, UsageDelta::message()).await {
            tracing::warn!("Failed to record message usage for '{}': {}", shop_id, e);
        }

        Ok(SendReceipt {
            message_id,
            conversation_id: conversation.id,
            timestamp: now,
        })
    }

    /// 顧客自身の開いているソケットへ `new_message` を返す（ベストエフォート）
    async fn reflect_to_customer(&self, shop_id: &str, stored: &ChatMessage) {
        let json = match message_envelope(stored).to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize message {}: {}", stored.id, e);
                return;
            }
        };
        let key = SocketKey::new(shop_id, stored.sender_id.clone());
        if let Err(e) = self.message_pusher.push_to(&key, &json).await {
            tracing::debug!("Message {} not reflected: {}", stored.id, e);
        }
    }

    /// スタッフの返信を永続化し、接続中なら顧客へ push する
    pub async fn reply_as_staff(
        &self,
        shop_id: &str,
        user_id: &str,
        staff_id: &str,
        message: &str,
    ) -> Result<StaffReplyReceipt, ServiceError> {
        ServiceError::require(&[("shopId", Some(shop_id)), ("userId", Some(user_id))])?;
        let content = MessageContent::parse(message)?;
        let now = self.clock.now_millis();

        let conversation = self
            .messages
            .create_or_get_conversation(shop_id, user_id, ClientMeta::default(), now)
            .await?;
        let stored = self
            .messages
            .add_message(NewChatMessage {
                conversation_id: conversation.id,
                sender_type: SenderType::Staff,
                sender_id: staff_id.to_string(),
                content: content.into_inner(),
                message_type: ChatMessageType::Text,
                media_url: None,
                file_name: None,
                created_at: now,
            })
            .await?;

        let envelope = message_envelope(&stored);
        let delivered = match envelope.to_json() {
            Ok(json) => self
                .message_pusher
                .push_to(&SocketKey::new(shop_id, user_id), &json)
                .await
                .inspect_err(|e| tracing::debug!("Staff reply not pushed: {}", e))
                .is_ok(),
            Err(e) => {
                tracing::error!("Failed to serialize staff reply: {}", e);
                false
            }
        };

        Ok(StaffReplyReceipt {
            message: stored,
            delivered,
        })
    }

    /// 店舗に接続中の全ソケットへシステムメッセージを送り、届いた数を返す
    pub async fn broadcast_system(
        &self,
        shop_id: &str,
        message: &str,
    ) -> Result<usize, ServiceError> {
        let content = MessageContent::parse(message)?;
        let envelope = MessageEnvelope::new_message(
            content.into_inner(),
            SenderType::Staff,
            EnvelopeMetadata {
                message_type: Some(ChatMessageType::System),
                ..EnvelopeMetadata::default()
            },
        )
        .with_timestamp(self.clock.now_millis());
        let json = envelope
            .to_json()
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let targets = self.message_pusher.connected(shop_id).await;
        Ok(self.message_pusher.broadcast(targets, &json).await)
    }
}

/// 永続化済みメッセージを `new_message` フレームに変換する
pub fn message_envelope(message: &ChatMessage) -> MessageEnvelope {
    MessageEnvelope::new_message(
        message.content.clone(),
        message.sender_type,
        EnvelopeMetadata {
            message_type: Some(message.message_type),
            media_url: message.media_url.clone(),
            file_name: message.file_name.clone(),
            ..EnvelopeMetadata::default()
        },
    )
    .with_sender_id(message.sender_id.clone())
    .with_timestamp(message.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            RepositoryError,
            repository::{MockMessageRepository, MockShopRepository},
        },
        infrastructure::{
            message_pusher::WebSocketMessagePusher,
            repository::inmemory::{InMemoryMessageRepository, InMemoryShopRepository},
        },
    };
    use quicktalk_shared::time::ManualClock;
    use tokio::sync::mpsc;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - 本文長の境界（5000 文字）
    // - 永続化失敗時もリクエスト自体は成功する（message_id = None）
    // - スタッフ返信が接続中の顧客ソケットに届く
    // ========================================

    fn command(user_id: &str, message: &str) -> SendMessageCommand {
        SendMessageCommand {
            user_id: Some(user_id.to_string()),
            message: Some(message.to_string()),
            ..SendMessageCommand::default()
        }
    }

    fn inmemory_usecase() -> (SendMessageUseCase, Arc<WebSocketMessagePusher>) {
        let pusher = Arc::new(WebSocketMessagePusher::new());
        let usecase = SendMessageUseCase::new(
            Arc::new(InMemoryShopRepository::new()),
            Arc::new(InMemoryMessageRepository::new()),
            pusher.clone(),
            Arc::new(ManualClock::new(5_000)),
        );
        (usecase, pusher)
    }

    #[tokio::test]
    async fn test_send_message_persists_and_returns_receipt() {
        // テスト項目: 100 文字のメッセージが永続化され ID が返る
        // given (前提条件):
        let (usecase, _pusher) = inmemory_usecase();

        // when (操作):
        let receipt = usecase
            .execute("shop-1", command("guest-1", &"a".repeat(100)))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(receipt.message_id, Some(1));
        assert_eq!(receipt.timestamp, 5_000);
        assert!(receipt.conversation_id.starts_with("conv_"));
    }

    #[tokio::test]
    async fn test_send_message_too_long() {
        // テスト項目: 6000 文字のメッセージは MESSAGE_TOO_LONG
        // given (前提条件):
        let (usecase, _pusher) = inmemory_usecase();

        // when (操作):
        let result = usecase
            .execute("shop-1", command("guest-1", &"a".repeat(6000)))
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ServiceError::MessageTooLong {
                length: 6000,
                max: 5000
            })
        );
    }

    #[tokio::test]
    async fn test_send_message_requires_user_and_body() {
        // テスト項目: userId と message が欠けていると MISSING_PARAMETERS
        // given (前提条件):
        let (usecase, _pusher) = inmemory_usecase();

        // when (操作):
        let result = usecase
            .execute("shop-1", SendMessageCommand::default())
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ServiceError::MissingParameters("userId, message".to_string()))
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_is_best_effort() {
        // テスト項目: 永続化と利用量の記録に失敗しても送信は成功し、message_id は None
        // given (前提条件):
        let mut messages = MockMessageRepository::new();
        messages
            .expect_create_or_get_conversation()
            .returning(|shop_id, user_id, meta, now| {
                Ok(crate::domain::Conversation {
                    id: "conv_x".to_string(),
                    shop_id: shop_id.to_string(),
                    user_id: user_id.to_string(),
                    created_at: now,
                    meta,
                })
            });
        messages
            .expect_add_message()
            .returning(|_| Err(RepositoryError::Storage("disk full".into())));
        let mut shops = MockShopRepository::new();
        shops
            .expect_record_usage()
            .returning(|_, _| Err(RepositoryError::Storage("down".into())));
        let usecase = SendMessageUseCase::new(
            Arc::new(shops),
            Arc::new(messages),
            Arc::new(WebSocketMessagePusher::new()),
            Arc::new(ManualClock::new(7)),
        );

        // when (操作):
        let receipt = usecase
            .execute("shop-1", command("guest-1", "hello"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(receipt.message_id, None);
        assert_eq!(receipt.conversation_id, "conv_x");
    }

    #[tokio::test]
    async fn test_staff_reply_is_pushed_to_connected_customer() {
        // テスト項目: スタッフ返信が接続中の顧客ソケットに new_message として届く
        // given (前提条件):
        let (usecase, pusher) = inmemory_usecase();
        let (tx, mut rx) = mpsc::unbounded_channel();
        pusher
            .register_client(SocketKey::new("shop-1", "guest-1"), tx)
            .await;

        // when (操作):
        let receipt = usecase
            .reply_as_staff("shop-1", "guest-1", "staff-7", "いらっしゃいませ")
            .await
            .unwrap();

        // then (期待する結果):
        assert!(receipt.delivered);
        let json = rx.recv().await.unwrap();
        let envelope = MessageEnvelope::from_json(&json).unwrap();
        assert_eq!(envelope.sender_type, Some(SenderType::Staff));
        assert_eq!(envelope.content.as_deref(), Some("いらっしゃいませ"));
        assert_eq!(envelope.sender_id.as_deref(), Some("staff-7"));
    }

    #[tokio::test]
    async fn test_customer_message_is_reflected_to_own_socket() {
        // テスト項目: 顧客メッセージは本人のソケットへ senderType=customer で返される
        // given (前提条件):
        let (usecase, pusher) = inmemory_usecase();
        let (tx, mut rx) = mpsc::unbounded_channel();
        pusher
            .register_client(SocketKey::new("shop-1", "guest-1"), tx)
            .await;

        // when (操作):
        usecase
            .execute("shop-1", command("guest-1", "hello"))
            .await
            .unwrap();

        // then (期待する結果):
        let envelope = MessageEnvelope::from_json(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(envelope.sender_type, Some(SenderType::Customer));
        assert_eq!(envelope.content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_staff_reply_to_offline_customer_is_stored() {
        // テスト項目: 未接続の顧客への返信は保存され、delivered = false
        // given (前提条件):
        let (usecase, _pusher) = inmemory_usecase();

        // when (操作):
        let receipt = usecase
            .reply_as_staff("shop-1", "guest-offline", "staff-7", "hi")
            .await
            .unwrap();

        // then (期待する結果):
        assert!(!receipt.delivered);
        assert_eq!(receipt.message.sender_type, SenderType::Staff);
    }
}
