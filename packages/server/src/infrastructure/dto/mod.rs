//! Data Transfer Objects (DTOs)
//!
//! - `http`: HTTP API のリクエスト / レスポンス
//! - `conversion`: ドメインモデルとの変換
//!
//! WebSocket のフレームは `quicktalk_shared::envelope` を直接使う。

pub mod conversion;
pub mod http;
