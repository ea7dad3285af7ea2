//! セッションストアの実装

pub mod session;

pub use session::DashMapSessionStore;
