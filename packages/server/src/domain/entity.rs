//! エンティティ定義

use quicktalk_shared::envelope::{ChatMessageType, SenderType};
use serde::Serialize;

/// 店舗の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShopStatus {
    Active,
    Suspended,
}

/// 店舗（テナント）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shop {
    pub id: String,
    pub name: String,
    /// 登録済みドメイン（正規化前の値を保持）
    pub domain: String,
    pub api_key: String,
    pub status: ShopStatus,
}

impl Shop {
    pub fn is_active(&self) -> bool {
        self.status == ShopStatus::Active
    }
}

/// 店舗ごとの利用量カウンタの増分
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageDelta {
    pub api_requests: u64,
    pub messages: u64,
    pub connections: u64,
}

impl UsageDelta {
    pub fn message() -> Self {
        Self {
            api_requests: 1,
            messages: 1,
            ..Self::default()
        }
    }

    pub fn connection() -> Self {
        Self {
            api_requests: 1,
            connections: 1,
            ..Self::default()
        }
    }
}

/// 店舗ごとの累計利用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopUsage {
    pub api_requests: u64,
    pub messages: u64,
    pub connections: u64,
    pub last_used_at: Option<i64>,
}

/// 会話の作成時に記録する接続元情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub domain: Option<String>,
}

/// 会話（店舗 × 顧客で一意）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    pub shop_id: String,
    pub user_id: String,
    pub created_at: i64,
    pub meta: ClientMeta,
}

/// 永続化済みメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// 会話内で単調増加する ID（ポーリングのカーソルに使う）
    pub id: i64,
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub sender_id: String,
    pub content: String,
    pub message_type: ChatMessageType,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub created_at: i64,
    pub is_read: bool,
}

/// 永続化前のメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChatMessage {
    pub conversation_id: String,
    pub sender_type: SenderType,
    pub sender_id: String,
    pub content: String,
    pub message_type: ChatMessageType,
    pub media_url: Option<String>,
    pub file_name: Option<String>,
    pub created_at: i64,
}

/// 顧客セッション
///
/// `last_activity_at` から TTL を超えたものは期限切れとして扱う。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub shop_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub meta: ClientMeta,
}

impl Session {
    pub fn is_expired(&self, now_millis: i64, ttl_millis: i64) -> bool {
        now_millis - self.last_activity_at > ttl_millis
    }

    pub fn expires_at(&self, ttl_millis: i64) -> i64 {
        self.last_activity_at + ttl_millis
    }
}
