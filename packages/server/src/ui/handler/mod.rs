//! HTTP / WebSocket handlers.

mod admin;
mod connection;
mod message;
mod system;
mod websocket;

pub use admin::{broadcast, send_reply};
pub use connection::{basic_connect, disconnect, secure_connect, status};
pub use message::{history, poll, send, update_status};
pub use system::{MAX_UPLOAD_BYTES, discovery, health, sdk_version, stats_connections, upload};
pub use websocket::customer_socket;
