//! UI 層（HTTP / WebSocket）
//!
//! axum のルーター、ミドルウェア、ハンドラーを持つ。

pub mod error;
pub mod extract;
mod handler;
pub mod middleware;
mod router;
mod server;
mod signal;
pub mod state;

pub use router::build_router;
pub use server::Server;
pub use state::AppState;
