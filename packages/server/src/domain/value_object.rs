//! Value Object 定義
//!
//! 生成時に検証を済ませ、以降は不変として扱う値の型。

use std::fmt;

use super::ValueObjectError;

/// 店舗 API キーの接頭辞
pub const API_KEY_PREFIX: &str = "sk_";

/// 1 メッセージあたりの最大文字数
pub const MAX_MESSAGE_CHARS: usize = 5000;

/// 店舗 API キー
///
/// 形式チェック（空でない・`sk_` で始まる）のみを行う。
/// 実在するキーかどうかは `ShopRepository` に問い合わせる。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn parse(raw: &str) -> Result<Self, ValueObjectError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValueObjectError::ApiKeyEmpty);
        }
        if !trimmed.starts_with(API_KEY_PREFIX) || trimmed.len() == API_KEY_PREFIX.len() {
            return Err(ValueObjectError::ApiKeyInvalidFormat {
                prefix: API_KEY_PREFIX,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ログにキー全体を出さない
impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.0.chars().take(7).collect();
        write!(f, "ApiKey({visible}***)")
    }
}

/// 顧客メッセージ本文
///
/// 前後の空白を除去した上で 1..=5000 文字（Unicode scalar 単位）に制限する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn parse(raw: &str) -> Result<Self, ValueObjectError> {
        let length = raw.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(ValueObjectError::MessageTooLong {
                length,
                max: MAX_MESSAGE_CHARS,
            });
        }
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValueObjectError::MessageEmpty);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// WebSocket の宛先キー（店舗 ID + 顧客 ID）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketKey {
    pub shop_id: String,
    pub customer_id: String,
}

impl SocketKey {
    pub fn new(shop_id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            shop_id: shop_id.into(),
            customer_id: customer_id.into(),
        }
    }
}

impl fmt::Display for SocketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shop_id, self.customer_id)
    }
}
