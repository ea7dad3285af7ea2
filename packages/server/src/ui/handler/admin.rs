//! Staff console endpoints that push into customer sockets.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    infrastructure::dto::http::{
        BroadcastRequest, BroadcastResponse, StaffReplyRequest, StaffReplyResponse, Success,
    },
    ui::{
        error::ApiError,
        extract::{ApiJson, AuthedShop},
        state::AppState,
    },
    usecase::ServiceError,
};

const DEFAULT_STAFF_ID: &str = "staff";

/// POST /api/admin/send-reply
pub async fn send_reply(
    State(state): State<Arc<AppState>>,
    AuthedShop(shop): AuthedShop,
    ApiJson(body): ApiJson<StaffReplyRequest>,
) -> Result<Json<Success<StaffReplyResponse>>, ApiError> {
    ServiceError::require(&[
        ("userId", body.user_id.as_deref()),
        ("message", body.message.as_deref()),
    ])?;
    let user_id = body.user_id.as_deref().unwrap_or_default().trim();
    let staff_id = body
        .staff_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_STAFF_ID);

    let receipt = state
        .send_message_usecase
        .reply_as_staff(
            &shop.id,
            user_id,
            staff_id,
            body.message.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(Success::new(StaffReplyResponse {
        message_id: receipt.message.id,
        delivered: receipt.delivered,
    })))
}

/// POST /api/admin/broadcast
pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    AuthedShop(shop): AuthedShop,
    ApiJson(body): ApiJson<BroadcastRequest>,
) -> Result<Json<Success<BroadcastResponse>>, ApiError> {
    ServiceError::require(&[("message", body.message.as_deref())])?;
    let delivered = state
        .send_message_usecase
        .broadcast_system(&shop.id, body.message.as_deref().unwrap_or_default())
        .await?;
    tracing::info!("Broadcast to {} sockets of shop '{}'", delivered, shop.id);
    Ok(Json(Success::new(BroadcastResponse { delivered })))
}
