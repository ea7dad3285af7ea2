//! メッセージ送信（通知）の実装
//!
//! - `websocket`: 顧客 WebSocket を使った実装

pub mod websocket;

pub use websocket::WebSocketMessagePusher;
