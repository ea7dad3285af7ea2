//! Repository trait 定義
//!
//! ドメイン層が必要とするデータアクセスのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{
    ChatMessage, ClientMeta, Conversation, NewChatMessage, RepositoryError, Shop, ShopUsage,
    UsageDelta,
};

/// 店舗 Repository trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// API キーから店舗を取得（存在しなければ `None`）
    async fn get_shop_by_api_key(&self, api_key: &str) -> Result<Option<Shop>, RepositoryError>;

    /// 店舗 ID から店舗を取得（存在しなければ `None`）
    async fn get_shop_by_id(&self, shop_id: &str) -> Result<Option<Shop>, RepositoryError>;

    /// API キーの最終使用時刻を更新
    async fn update_last_used(&self, shop_id: &str, at: i64) -> Result<(), RepositoryError>;

    /// 利用量カウンタを加算
    async fn record_usage(&self, shop_id: &str, delta: UsageDelta) -> Result<(), RepositoryError>;

    /// 累計利用量を取得
    async fn get_usage(&self, shop_id: &str) -> Result<ShopUsage, RepositoryError>;
}

/// 会話・メッセージ Repository trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 店舗 × 顧客の会話を取得、なければ作成
    async fn create_or_get_conversation(
        &self,
        shop_id: &str,
        user_id: &str,
        meta: ClientMeta,
        now: i64,
    ) -> Result<Conversation, RepositoryError>;

    /// メッセージを追加し、採番済みのメッセージを返す
    async fn add_message(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError>;

    /// `after_id` より新しいメッセージを古い順に最大 `limit` 件取得
    async fn get_new_messages(
        &self,
        conversation_id: &str,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// `before_id` より古いメッセージを古い順に最大 `limit` 件取得（`None` なら最新から）
    async fn get_history(
        &self,
        conversation_id: &str,
        before_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// 指定 ID のメッセージを既読にし、状態が変わった件数を返す
    async fn mark_as_read(
        &self,
        conversation_id: &str,
        message_ids: Vec<i64>,
    ) -> Result<usize, RepositoryError>;
}
