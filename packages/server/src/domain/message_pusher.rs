//! メッセージ通知（push）の trait 定義
//!
//! 接続中の顧客 WebSocket へサーバー側からメッセージを送るための抽象。
//! ソケットの生成は UI 層、送信先の管理は Infrastructure 層が担う。

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{MessagePushError, SocketKey};

/// 1 ソケット分の送信チャネル（JSON 文字列を流す）
pub type PusherChannel = mpsc::UnboundedSender<String>;

#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// ソケットを登録する。同じキーで既に登録があれば置き換える
    async fn register_client(&self, key: SocketKey, sender: PusherChannel);

    /// ソケットの登録を解除する
    ///
    /// 登録済みのチャネルが `sender` と同一の場合のみ削除する。
    async fn unregister_client(&self, key: &SocketKey, sender: &PusherChannel);

    async fn push_to(&self, key: &SocketKey, content: &str) -> Result<(), MessagePushError>;

    /// 複数の宛先へ送信する。一部の宛先への失敗は許容し、届いた件数を返す
    async fn broadcast(&self, targets: Vec<SocketKey>, content: &str) -> usize;

    /// 店舗に接続中のソケット一覧
    async fn connected(&self, shop_id: &str) -> Vec<SocketKey>;

    async fn count(&self) -> usize;
}
