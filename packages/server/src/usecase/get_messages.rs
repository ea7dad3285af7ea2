//! UseCase: メッセージの取得（ポーリング・履歴・既読更新）
//!
//! ポーリングは `last_id` より新しいメッセージを返す。同じカーソルで再度呼べば同じ結果になる。
//! 取得したスタッフメッセージは既読にするが、既読かどうかで結果は絞り込まない。

use std::sync::Arc;

use quicktalk_shared::{envelope::SenderType, time::Clock};

use crate::domain::{ChatMessage, ClientMeta, MessageRepository};

use super::error::ServiceError;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

/// 取得結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    pub conversation_id: String,
    pub messages: Vec<ChatMessage>,
    /// 取得件数が上限に達した（続きがある可能性がある）
    pub has_more: bool,
}

/// ページサイズを 1..=100 に丸める（未指定は 50）
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

pub struct GetMessagesUseCase {
    messages: Arc<dyn MessageRepository>,
    clock: Arc<dyn Clock>,
}

impl GetMessagesUseCase {
    pub fn new(messages: Arc<dyn MessageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { messages, clock }
    }

    /// `last_id` より新しいメッセージを取得する
    pub async fn poll(
        &self,
        shop_id: &str,
        user_id: Option<&str>,
        last_id: Option<i64>,
        limit: Option<usize>,
    ) -> Result<MessagePage, ServiceError> {
        ServiceError::require(&[("userId", user_id)])?;
        let user_id = user_id.unwrap_or_default().trim();
        let limit = clamp_limit(limit);

        let conversation_id = self.conversation_id(shop_id, user_id).await?;
        let messages = self
            .messages
            .get_new_messages(&conversation_id, last_id.unwrap_or(0), limit)
            .await?;

        let unread_staff: Vec<i64> = messages
            .iter()
            .filter(|m| m.sender_type == SenderType::Staff && !m.is_read)
            .map(|m| m.id)
            .collect();
        if !unread_staff.is_empty()
            && let Err(e) = self.messages.mark_as_read(&conversation_id, unread_staff).await
        {
            tracing::warn!(
                "Failed to mark messages as read in '{}': {}",
                conversation_id,
                e
            );
        }

        Ok(MessagePage {
            has_more: messages.len() == limit,
            conversation_id,
            messages,
        })
    }

    /// `before_id` より古いメッセージを取得する（未指定なら最新から）
    pub async fn history(
        &self,
        shop_id: &str,
        user_id: Option<&str>,
        before_id: Option<i64>,
        limit: Option<usize>,
    ) -> Result<MessagePage, ServiceError> {
        ServiceError::require(&[("userId", user_id)])?;
        let user_id = user_id.unwrap_or_default().trim();
        let limit = clamp_limit(limit);

        let conversation_id = self.conversation_id(shop_id, user_id).await?;
        let messages = self
            .messages
            .get_history(&conversation_id, before_id, limit)
            .await?;

        Ok(MessagePage {
            has_more: messages.len() == limit,
            conversation_id,
            messages,
        })
    }

    /// 指定メッセージを既読にし、更新件数を返す
    pub async fn mark_read(
        &self,
        shop_id: &str,
        user_id: Option<&str>,
        message_ids: Vec<i64>,
    ) -> Result<usize, ServiceError> {
        ServiceError::require(&[("userId", user_id)])?;
        if message_ids.is_empty() {
            return Err(ServiceError::MissingParameters("messageIds".to_string()));
        }
        let user_id = user_id.unwrap_or_default().trim();
        let conversation_id = self.conversation_id(shop_id, user_id).await?;
        Ok(self.messages.mark_as_read(&conversation_id, message_ids).await?)
    }

    async fn conversation_id(&self, shop_id: &str, user_id: &str) -> Result<String, ServiceError> {
        let conversation = self
            .messages
            .create_or_get_conversation(
                shop_id,
                user_id,
                ClientMeta::default(),
                self.clock.now_millis(),
            )
            .await?;
        Ok(conversation.id)
    }
}
