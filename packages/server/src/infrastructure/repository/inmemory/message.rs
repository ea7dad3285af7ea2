//! InMemory 会話・メッセージ Repository 実装
//!
//! 会話とメッセージを 1 つの `Mutex` で保護したテーブルに保持する。
//! メッセージ ID は全会話で共通の連番（1 始まり）。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    ChatMessage, ClientMeta, Conversation, MessageRepository, NewChatMessage, RepositoryError,
};

#[derive(Default)]
struct Tables {
    /// (shop_id, user_id) → Conversation
    conversations: HashMap<(String, String), Conversation>,
    /// conversation_id → 古い順のメッセージ
    messages: HashMap<String, Vec<ChatMessage>>,
    next_message_id: i64,
}

/// インメモリ会話・メッセージ Repository
#[derive(Default, Clone)]
pub struct InMemoryMessageRepository {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn create_or_get_conversation(
        &self,
        shop_id: &str,
        user_id: &str,
        meta: ClientMeta,
        now: i64,
    ) -> Result<Conversation, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let conversation = tables
            .conversations
            .entry((shop_id.to_string(), user_id.to_string()))
            .or_insert_with(|| {
                tracing::debug!("Created conversation for {}/{}", shop_id, user_id);
                Conversation {
                    id: format!("conv_{}", Uuid::new_v4().simple()),
                    shop_id: shop_id.to_string(),
                    user_id: user_id.to_string(),
                    created_at: now,
                    meta,
                }
            });
        Ok(conversation.clone())
    }

    async fn add_message(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if !tables
            .conversations
            .values()
            .any(|c| c.id == message.conversation_id)
        {
            return Err(RepositoryError::NotFound(message.conversation_id));
        }

        tables.next_message_id += 1;
        let stored = ChatMessage {
            id: tables.next_message_id,
            conversation_id: message.conversation_id,
            sender_type: message.sender_type,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            media_url: message.media_url,
            file_name: message.file_name,
            created_at: message.created_at,
            is_read: false,
        };
        tables
            .messages
            .entry(stored.conversation_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn get_new_messages(
        &self,
        conversation_id: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .messages
            .get(conversation_id)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.id > after_id)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_history(
        &self,
        conversation_id: &str,
        before_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let tables = self.tables.lock().await;
        let Some(messages) = tables.messages.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let mut page: Vec<ChatMessage> = messages
            .iter()
            .rev()
            .filter(|m| before_id.is_none_or(|before| m.id < before))
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        Ok(page)
    }

    async fn mark_as_read(
        &self,
        conversation_id: &str,
        message_ids: Vec<i64>,
    ) -> Result<usize, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(messages) = tables.messages.get_mut(conversation_id) else {
            return Ok(0);
        };
        let mut updated = 0;
        for message in messages
            .iter_mut()
            .filter(|m| !m.is_read && message_ids.contains(&m.id))
        {
            message.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicktalk_shared::envelope::{ChatMessageType, SenderType};

    fn new_message(conversation_id: &str, content: &str) -> NewChatMessage {
        NewChatMessage {
            conversation_id: conversation_id.to_string(),
            sender_type: SenderType::Customer,
            sender_id: "guest-1".to_string(),
            content: content.to_string(),
            message_type: ChatMessageType::Text,
            media_url: None,
            file_name: None,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_conversation_is_unique_per_shop_and_user() {
        // テスト項目: 店舗 × 顧客ごとに会話が 1 つだけ作られる
        // given (前提条件):
        let repo = InMemoryMessageRepository::new();

        // when (操作):
        let a = repo
            .create_or_get_conversation("shop-1", "guest-1", ClientMeta::default(), 1)
            .await
            .unwrap();
        let b = repo
            .create_or_get_conversation("shop-1", "guest-1", ClientMeta::default(), 2)
            .await
            .unwrap();
        let other_shop = repo
            .create_or_get_conversation("shop-2", "guest-1", ClientMeta::default(), 3)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(a.id, b.id);
        assert_eq!(b.created_at, 1);
        assert_ne!(a.id, other_shop.id);
    }

    #[tokio::test]
    async fn test_add_message_to_unknown_conversation_fails() {
        // テスト項目: 存在しない会話へのメッセージ追加は NotFound
        // given (前提条件):
        let repo = InMemoryMessageRepository::new();

        // when (操作):
        let result = repo.add_message(new_message("conv_missing", "x")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_as_read_counts_only_changes() {
        // テスト項目: 既読化は未読だったものだけを数える
        // given (前提条件):
        let repo = InMemoryMessageRepository::new();
        let conversation = repo
            .create_or_get_conversation("shop-1", "guest-1", ClientMeta::default(), 0)
            .await
            .unwrap();
        let first = repo
            .add_message(new_message(&conversation.id, "one"))
            .await
            .unwrap();

        // when (操作):
        let updated = repo
            .mark_as_read(&conversation.id, vec![first.id, 999])
            .await
            .unwrap();
        let again = repo
            .mark_as_read(&conversation.id, vec![first.id])
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(updated, 1);
        assert_eq!(again, 0);
    }
}
