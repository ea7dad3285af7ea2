//! UseCase 層
//!
//! ドメイン層の trait だけに依存し、具体的な実装は `AppState` の組み立て時に注入される。

pub mod authenticate_shop;
pub mod connection_registry;
pub mod error;
pub mod get_messages;
pub mod rate_limiter;
pub mod send_message;

pub use authenticate_shop::AuthenticateShopUseCase;
pub use connection_registry::{
    ConnectOutcome, ConnectRequest, ConnectTier, ConnectionRegistry, ConnectionStats,
    SESSION_TTL_MILLIS, SWEEP_INTERVAL, SessionStatus,
};
pub use error::{ErrorKind, ServiceError};
pub use get_messages::{GetMessagesUseCase, MessagePage};
pub use rate_limiter::{
    RateLimitDecision, RateLimitRule, RateLimitRules, RateLimitStatus, RateLimiter, RouteClass,
};
pub use send_message::{SendMessageCommand, SendMessageUseCase, SendReceipt, StaffReplyReceipt};
