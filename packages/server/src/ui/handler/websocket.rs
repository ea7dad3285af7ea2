//! Customer WebSocket endpoint.

use std::sync::Arc;

use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use quicktalk_shared::envelope::{EnvelopeType, MessageEnvelope};
use tokio::sync::mpsc;

use crate::{
    domain::{ClientMeta, SocketKey},
    ui::{error::ApiError, extract::ClientInfo, state::AppState},
    usecase::{SendMessageCommand, ServiceError},
};

/// GET /ws/customer/{shop_id}/{customer_id}
///
/// 存在しない店舗・停止中の店舗はアップグレード前に拒否する。
pub async fn customer_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((shop_id, customer_id)): Path<(String, String)>,
    client: ClientInfo,
) -> Result<impl IntoResponse, ApiError> {
    let shop = state
        .shops
        .get_shop_by_id(&shop_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::ShopNotFound)?;
    if !shop.is_active() {
        tracing::warn!("Rejecting socket for disabled shop '{}'", shop.id);
        return Err(ServiceError::ShopDisabled.into());
    }

    let key = SocketKey::new(shop.id, customer_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, key, client)))
}

/// Spawns a task that forwards pushed frames from `rx` to the WebSocket sink.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    key: SocketKey,
    client: ClientInfo,
) {
    let (sender, mut receiver) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel();
    state
        .message_pusher
        .register_client(key.clone(), tx.clone())
        .await;
    tracing::info!("Customer socket '{}' opened", key);

    let recv_state = state.clone();
    let recv_key = key.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error on '{}': {}", recv_key, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    handle_frame(&recv_state, &recv_key, &client, text.as_str()).await;
                }
                Message::Close(frame) => {
                    tracing::info!(
                        "Customer '{}' closed the socket (code: {:?})",
                        recv_key,
                        frame.map(|f| f.code)
                    );
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = pusher_loop(rx, sender);

    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state.message_pusher.unregister_client(&key, &tx).await;
    tracing::info!("Customer socket '{}' closed", key);
}

/// Handles one text frame from a customer socket.
///
/// `send_message` frames are intentionally not counted against the message-send
/// rate class. The socket is gated by the shop check at upgrade time, and each
/// frame only passes the content checks of `SendMessageUseCase`.
async fn handle_frame(state: &AppState, key: &SocketKey, client: &ClientInfo, text: &str) {
    let envelope = match MessageEnvelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Ignoring unparseable frame from '{}': {}", key, e);
            return;
        }
    };

    match envelope.message_type {
        EnvelopeType::Auth => {
            tracing::info!(
                "Customer '{}' authenticated (customerId: {:?})",
                key,
                envelope.metadata.customer_id
            );
        }
        EnvelopeType::SendMessage => {
            let command = SendMessageCommand {
                user_id: Some(key.customer_id.clone()),
                media_url: envelope.media_url().map(str::to_string),
                file_name: envelope.media_file_name().map(str::to_string),
                message: envelope.content,
                message_type: envelope.metadata.message_type.unwrap_or_default(),
                meta: ClientMeta {
                    ip: client.ip.clone(),
                    user_agent: client.user_agent.clone(),
                    domain: client.domain.clone(),
                },
            };
            if let Err(e) = state
                .send_message_usecase
                .execute(&key.shop_id, command)
                .await
            {
                tracing::warn!("Dropped message from '{}': {}", key, e);
            }
        }
        other => {
            tracing::debug!("Ignoring {:?} frame from '{}'", other, key);
        }
    }
}
