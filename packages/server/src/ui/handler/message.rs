//! Customer message endpoints: send, poll, history and read status.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};

use crate::{
    domain::ClientMeta,
    infrastructure::dto::http::{
        HistoryQuery, MessagesResponse, PollQuery, SendMessageRequest, SendMessageResponse,
        Success, UpdateStatusRequest, UpdateStatusResponse,
    },
    ui::{
        error::ApiError,
        extract::{ApiJson, ApiQuery, AuthedShop, ClientInfo, MaybeShop, X_SHOP_KEY, header_str},
        state::AppState,
    },
    usecase::{SendMessageCommand, ServiceError},
};

/// POST /api/send
///
/// パラメータを検査してから店舗を解決する。店舗はミドルウェアの検証結果、
/// 無ければボディの `shopKey` / `apiKey` か `x-shop-key` ヘッダーから解決する。
pub async fn send(
    State(state): State<Arc<AppState>>,
    MaybeShop(shop): MaybeShop,
    client: ClientInfo,
    headers: HeaderMap,
    ApiJson(body): ApiJson<SendMessageRequest>,
) -> Result<Json<Success<SendMessageResponse>>, ApiError> {
    let command = SendMessageCommand {
        user_id: body.user_id,
        message: body.message,
        message_type: body.message_type.unwrap_or_default(),
        media_url: body.media_url,
        file_name: body.file_name,
        meta: ClientMeta {
            ip: client.ip.clone(),
            user_agent: client.user_agent,
            domain: client.domain,
        },
    };
    command.validate()?;

    let shop = match shop {
        Some(shop) => shop,
        None => {
            let api_key = body
                .shop_key
                .or_else(|| header_str(&headers, X_SHOP_KEY))
                .ok_or(ServiceError::InvalidApiKey)?;
            state
                .authenticate_shop_usecase
                .execute(&api_key, client.ip.as_deref())
                .await?
        }
    };

    let receipt = state.send_message_usecase.execute(&shop.id, command).await?;
    Ok(Json(Success::new(receipt.into())))
}

/// GET /api/client/messages?userId&lastId&limit
///
/// 同じカーソルで何度呼んでも、新着が無ければ同じ結果を返す。
pub async fn poll(
    State(state): State<Arc<AppState>>,
    MaybeShop(shop): MaybeShop,
    ApiQuery(query): ApiQuery<PollQuery>,
) -> Result<Json<Success<MessagesResponse>>, ApiError> {
    let shop = shop.ok_or(ServiceError::AuthenticationRequired)?;
    let page = state
        .get_messages_usecase
        .poll(
            &shop.id,
            query.user_id.as_deref(),
            query.last_id,
            query.limit,
        )
        .await?;
    Ok(Json(Success::new(page.into())))
}

/// GET /api/client/messages/{user_id}/history?before&limit
pub async fn history(
    State(state): State<Arc<AppState>>,
    AuthedShop(shop): AuthedShop,
    Path(user_id): Path<String>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Success<MessagesResponse>>, ApiError> {
    let page = state
        .get_messages_usecase
        .history(&shop.id, Some(&user_id), query.before, query.limit)
        .await?;
    Ok(Json(Success::new(page.into())))
}

/// PUT /api/client/messages/{user_id}/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AuthedShop(shop): AuthedShop,
    Path(user_id): Path<String>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Result<Json<Success<UpdateStatusResponse>>, ApiError> {
    let updated = state
        .get_messages_usecase
        .mark_read(&shop.id, Some(&user_id), body.message_ids)
        .await?;
    Ok(Json(Success::new(UpdateStatusResponse { updated })))
}
