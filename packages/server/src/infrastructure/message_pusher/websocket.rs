//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 顧客ソケットの `UnboundedSender` を (店舗 ID, 顧客 ID) で管理
//! - 顧客へのメッセージ送信（push_to, broadcast）
//!
//! ソケットの受付と sender の生成は UI 層（`ui/handler/websocket.rs`）で行われ、
//! この実装は受け取った sender を送信に使うだけです。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{MessagePushError, MessagePusher, PusherChannel, SocketKey};

/// WebSocket を使った MessagePusher 実装
#[derive(Default)]
pub struct WebSocketMessagePusher {
    /// 接続中の顧客ソケット
    clients: Mutex<HashMap<SocketKey, PusherChannel>>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, key: SocketKey, sender: PusherChannel) {
        let mut clients = self.clients.lock().await;
        if clients.insert(key.clone(), sender).is_some() {
            tracing::debug!("Socket '{}' replaced by a newer connection", key);
        } else {
            tracing::debug!("Socket '{}' registered to MessagePusher", key);
        }
    }

    async fn unregister_client(&self, key: &SocketKey, sender: &PusherChannel) {
        let mut clients = self.clients.lock().await;
        if clients
            .get(key)
            .is_some_and(|current| current.same_channel(sender))
        {
            clients.remove(key);
            tracing::debug!("Socket '{}' unregistered from MessagePusher", key);
        }
    }

    async fn push_to(&self, key: &SocketKey, content: &str) -> Result<(), MessagePushError> {
        let clients = self.clients.lock().await;

        let sender = clients
            .get(key)
            .ok_or_else(|| MessagePushError::SocketNotFound(key.to_string()))?;
        sender
            .send(content.to_string())
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;
        tracing::debug!("Pushed message to '{}'", key);
        Ok(())
    }

    async fn broadcast(&self, targets: Vec<SocketKey>, content: &str) -> usize {
        let clients = self.clients.lock().await;

        let mut delivered = 0;
        for target in targets {
            match clients.get(&target) {
                // ブロードキャストでは一部の送信失敗を許容
                Some(sender) => match sender.send(content.to_string()) {
                    Ok(()) => delivered += 1,
                    Err(e) => tracing::warn!("Failed to push message to '{}': {}", target, e),
                },
                None => tracing::warn!("Socket '{}' not found during broadcast, skipping", target),
            }
        }
        delivered
    }

    async fn connected(&self, shop_id: &str) -> Vec<SocketKey> {
        let clients = self.clients.lock().await;
        let mut keys: Vec<SocketKey> = clients
            .keys()
            .filter(|key| key.shop_id == shop_id)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    async fn count(&self) -> usize {
        self.clients.lock().await.len()
    }
}
