//! ドメイン層
//!
//! エンティティ、Value Object、外部依存の trait（Repository / SessionStore /
//! MessagePusher / SecurityLogger）を定義する。この層は他の層に依存しない。

pub mod entity;
pub mod error;
pub mod message_pusher;
pub mod origin;
pub mod repository;
pub mod security_logger;
pub mod session_store;
pub mod value_object;

pub use entity::{
    ChatMessage, ClientMeta, Conversation, NewChatMessage, Session, Shop, ShopStatus, ShopUsage,
    UsageDelta,
};
pub use error::{MessagePushError, RepositoryError, ValueObjectError};
pub use message_pusher::{MessagePusher, PusherChannel};
pub use origin::{DomainMatch, match_domain, normalize_domain};
pub use repository::{MessageRepository, ShopRepository};
pub use security_logger::{
    AccessRecord, ConnectionEventKind, EventContext, SecurityEventKind, SecurityLogger,
};
pub use session_store::SessionStore;
pub use value_object::{API_KEY_PREFIX, ApiKey, MAX_MESSAGE_CHARS, MessageContent, SocketKey};
