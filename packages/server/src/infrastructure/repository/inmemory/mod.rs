//! インメモリ Repository
//!
//! 単一プロセスでの運用とテスト用。データは再起動で失われる。

pub mod message;
pub mod shop;

pub use message::InMemoryMessageRepository;
pub use shop::InMemoryShopRepository;
