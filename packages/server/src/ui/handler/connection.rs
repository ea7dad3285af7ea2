//! Session endpoints: secure / basic connect, status and disconnect.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};

use crate::{
    infrastructure::dto::http::{
        BasicConnectRequest, ConnectResponse, DisconnectRequest, DisconnectResponse,
        SecureConnectRequest, StatusResponse, Success,
    },
    ui::{
        error::ApiError,
        extract::{ApiJson, ClientInfo, X_SHOP_KEY, header_str},
        state::AppState,
    },
    usecase::{ConnectRequest, ConnectTier, ServiceError},
};

/// POST /api/secure-connect
///
/// Body fields win over headers; the domain falls back to the request's
/// `x-domain` / `Origin` / `Referer` / `Host`.
pub async fn secure_connect(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    headers: HeaderMap,
    ApiJson(body): ApiJson<SecureConnectRequest>,
) -> Result<Json<Success<ConnectResponse>>, ApiError> {
    let request = ConnectRequest {
        api_key: body.shop_key.or_else(|| header_str(&headers, X_SHOP_KEY)),
        shop_id: body.shop_id,
        user_id: body.user_id,
        domain: body.domain.or(client.domain),
        ip: client.ip,
        user_agent: client.user_agent,
    };
    let outcome = state.registry.connect(ConnectTier::Secure, request).await?;
    Ok(Json(Success::new(outcome.into())))
}

/// POST /api/connect
pub async fn basic_connect(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    ApiJson(body): ApiJson<BasicConnectRequest>,
) -> Result<Json<Success<ConnectResponse>>, ApiError> {
    let request = ConnectRequest {
        api_key: None,
        shop_id: body.shop_id,
        user_id: body.user_id,
        domain: client.domain,
        ip: client.ip,
        user_agent: client.user_agent,
    };
    let outcome = state.registry.connect(ConnectTier::Basic, request).await?;
    Ok(Json(Success::new(outcome.into())))
}

/// GET /api/status/{session_id}
///
/// Unknown or expired sessions are reported as disconnected, not as an error.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Success<StatusResponse>>, ApiError> {
    let response = match state.registry.status(&session_id) {
        Ok(session) => StatusResponse::connected(session),
        Err(ServiceError::SessionNotFound) => StatusResponse::disconnected(),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(Success::new(response)))
}

/// POST /api/disconnect
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    ApiJson(body): ApiJson<DisconnectRequest>,
) -> Result<Json<Success<DisconnectResponse>>, ApiError> {
    ServiceError::require(&[("sessionId", body.session_id.as_deref())])?;
    let session_id = body.session_id.as_deref().unwrap_or_default().trim();

    let removed = state
        .registry
        .disconnect(session_id, body.user_id.as_deref())?;
    if !removed {
        tracing::debug!("Disconnect for unknown session '{}'", session_id);
    }
    Ok(Json(Success::new(DisconnectResponse {
        disconnected: removed,
    })))
}
