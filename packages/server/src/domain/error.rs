//! ドメイン層のエラー型

use thiserror::Error;

/// Value Object の生成時エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("API key is empty")]
    ApiKeyEmpty,

    #[error("API key must start with '{prefix}'")]
    ApiKeyInvalidFormat { prefix: &'static str },

    #[error("message is empty")]
    MessageEmpty,

    #[error("message is too long ({length} > {max} characters)")]
    MessageTooLong { length: usize, max: usize },
}

/// Repository 操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// MessagePusher のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    #[error("socket not found: {0}")]
    SocketNotFound(String),

    #[error("failed to push message: {0}")]
    PushFailed(String),
}
