//! Infrastructure 層
//!
//! ドメイン層の trait の具体的な実装と DTO を提供する。

pub mod dto;
pub mod message_pusher;
pub mod repository;
pub mod security_logger;
pub mod store;

pub use security_logger::TracingSecurityLogger;
