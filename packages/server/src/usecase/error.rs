//! UseCase 層のエラー型
//!
//! UI 層はこのエラーを HTTP ステータスと `{success:false, error:{code, message}}` に変換する。
//! `code()` はクライアントが分岐に使う安定した文字列。

use thiserror::Error;

use crate::domain::{RepositoryError, ValueObjectError};

/// エラーの分類（HTTP ステータスの決定に使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 400
    Parameter,
    /// 401
    Authentication,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 429
    RateLimit,
    /// 500
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("Missing required parameters: {0}")]
    MissingParameters(String),

    #[error("Message too long ({length} > {max} characters)")]
    MessageTooLong { length: usize, max: usize },

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Invalid API key format")]
    InvalidApiKeyFormat,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Shop is disabled")]
    ShopDisabled,

    #[error("Shop ID does not match the API key")]
    ShopIdMismatch,

    #[error("Unauthorized access: {0}")]
    UnauthorizedAccess(String),

    #[error("Shop not found")]
    ShopNotFound,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Too many requests, retry after {retry_after_secs} seconds")]
    RateLimitExceeded { limit: u32, retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameters(_) => "MISSING_PARAMETERS",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::InvalidApiKeyFormat => "INVALID_API_KEY_FORMAT",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::ShopDisabled => "SHOP_DISABLED",
            Self::ShopIdMismatch => "SHOP_ID_MISMATCH",
            Self::UnauthorizedAccess(_) => "UNAUTHORIZED_ACCESS",
            Self::ShopNotFound => "SHOP_NOT_FOUND",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameters(_) | Self::MessageTooLong { .. } => ErrorKind::Parameter,
            Self::AuthenticationRequired
            | Self::InvalidApiKeyFormat
            | Self::InvalidApiKey => ErrorKind::Authentication,
            Self::ShopDisabled | Self::ShopIdMismatch | Self::UnauthorizedAccess(_) => {
                ErrorKind::Forbidden
            }
            Self::ShopNotFound | Self::SessionNotFound => ErrorKind::NotFound,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimit,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 必須パラメータの欠落をまとめて検査する
    ///
    /// 欠けている名前をカンマ区切りで持つ `MissingParameters` を返す。
    pub fn require(fields: &[(&str, Option<&str>)]) -> Result<(), Self> {
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.map(str::trim).is_none_or(str::is_empty))
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Self::MissingParameters(missing.join(", ")))
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<ValueObjectError> for ServiceError {
    fn from(e: ValueObjectError) -> Self {
        match e {
            ValueObjectError::ApiKeyEmpty | ValueObjectError::ApiKeyInvalidFormat { .. } => {
                Self::InvalidApiKeyFormat
            }
            ValueObjectError::MessageEmpty => Self::MissingParameters("message".to_string()),
            ValueObjectError::MessageTooLong { length, max } => {
                Self::MessageTooLong { length, max }
            }
        }
    }
}
