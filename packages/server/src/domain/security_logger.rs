//! セキュリティイベント記録の trait 定義

use std::fmt;

/// 認証・認可まわりの拒否イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventKind {
    ApiValidationFailed,
    ShopDisabled,
    ShopIdMismatch,
    InvalidDomain,
    RateLimitExceeded,
    UserMismatch,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiValidationFailed => "API_VALIDATION_FAILED",
            Self::ShopDisabled => "SHOP_DISABLED",
            Self::ShopIdMismatch => "SHOP_ID_MISMATCH",
            Self::InvalidDomain => "INVALID_DOMAIN",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::UserMismatch => "USER_MISMATCH",
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// セッションのライフサイクルイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEventKind {
    Connected,
    Disconnected,
    Expired,
}

impl ConnectionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "CONNECT_SUCCESS",
            Self::Disconnected => "DISCONNECT_SUCCESS",
            Self::Expired => "SESSION_EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub shop_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub ip: Option<String>,
    pub domain: Option<String>,
}

impl EventContext {
    pub fn shop(shop_id: impl Into<String>) -> Self {
        Self {
            shop_id: Some(shop_id.into()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_ip(mut self, ip: Option<&str>) -> Self {
        self.ip = ip.map(str::to_string);
        self
    }

    pub fn with_domain(mut self, domain: Option<&str>) -> Self {
        self.domain = domain.map(str::to_string);
        self
    }
}

/// 1 リクエスト分のアクセス記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: u64,
    pub identity: String,
}

/// 監査ログの出力先
///
/// 記録の失敗は呼び出し元に伝播しない。
#[cfg_attr(test, mockall::automock)]
pub trait SecurityLogger: Send + Sync {
    fn security_event(&self, kind: SecurityEventKind, context: &EventContext, detail: &str);

    fn connection_event(&self, kind: ConnectionEventKind, context: &EventContext);

    fn access(&self, record: &AccessRecord);
}
