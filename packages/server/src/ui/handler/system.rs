//! Health, statistics, discovery and upload endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
};
use quicktalk_shared::{envelope::ChatMessageType, time::millis_to_rfc3339};
use uuid::Uuid;

use crate::{
    infrastructure::dto::http::{
        ConnectionStatsResponse, DiscoveryEndpoints, DiscoveryResponse, HealthResponse,
        StatsQuery, Success, UploadResponse, VersionResponse, WebSocketEndpoints,
    },
    ui::{error::ApiError, extract::ApiQuery, state::AppState},
    usecase::ServiceError,
};

/// Upper bound for an uploaded file
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const MAX_STORED_NAME_CHARS: usize = 100;

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Success<HealthResponse>> {
    Json(Success::new(HealthResponse {
        status: "healthy",
        timestamp: millis_to_rfc3339(state.clock.now_millis()),
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections: state.registry.stats(),
        open_sockets: state.message_pusher.count().await,
        version: state.config.sdk_version.clone(),
    }))
}

/// GET /api/stats/connections?shopId
pub async fn stats_connections(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> Json<Success<ConnectionStatsResponse>> {
    Json(Success::new(ConnectionStatsResponse {
        stats: state.registry.stats(),
        sessions: state.registry.active_connections(query.shop_id.as_deref()),
    }))
}

/// GET /api/config
pub async fn discovery(State(state): State<Arc<AppState>>) -> Json<Success<DiscoveryResponse>> {
    let config = &state.config;
    let ws_url = config.public_ws_url();
    Json(Success::new(DiscoveryResponse {
        version: config.sdk_version.clone(),
        server_url: config.public_url.clone(),
        endpoints: DiscoveryEndpoints {
            websocket: WebSocketEndpoints {
                customer: format!("{ws_url}/ws/customer"),
            },
            upload: format!("{}/api/customer/upload", config.public_url),
        },
        ws_url,
    }))
}

/// GET /api/sdk/version
pub async fn sdk_version(State(state): State<Arc<AppState>>) -> Json<Success<VersionResponse>> {
    Json(Success::new(VersionResponse {
        version: state.config.sdk_version.clone(),
    }))
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError(ServiceError::MissingParameters(e.body_text()))
}

/// POST /api/customer/upload
///
/// multipart `{file, shopId, messageType, customerCode}` を受け取り、
/// `{upload_dir}/{millis}_{uuid}_{name}` に保存する。
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Success<UploadResponse>>, ApiError> {
    let mut file = None;
    let mut message_type = None;
    let mut shop_id = None;
    let mut customer_code = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let guessed = guess_message_type(field.content_type());
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, guessed, data));
            }
            Some("messageType") => {
                let text = field.text().await.map_err(multipart_error)?;
                message_type = text.parse::<ChatMessageType>().ok();
            }
            Some("shopId") => shop_id = Some(field.text().await.map_err(multipart_error)?),
            Some("customerCode") => {
                customer_code = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let Some((original_name, guessed, data)) = file else {
        return Err(ServiceError::MissingParameters("file".to_string()).into());
    };
    let message_type = message_type.unwrap_or(guessed);

    let stored_name = format!(
        "{}_{}_{}",
        state.clock.now_millis(),
        Uuid::new_v4().simple(),
        sanitize_file_name(&original_name)
    );
    let upload_dir = &state.config.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| ServiceError::Internal(format!("create upload dir: {e}")))?;
    tokio::fs::write(upload_dir.join(&stored_name), &data)
        .await
        .map_err(|e| ServiceError::Internal(format!("write upload: {e}")))?;

    tracing::info!(
        "Stored upload '{}' ({} bytes, shop: {:?}, customer: {:?})",
        stored_name,
        data.len(),
        shop_id,
        customer_code
    );

    Ok(Json(Success::new(UploadResponse {
        url: format!("{}/uploads/{}", state.config.public_url, stored_name),
        file_name: original_name,
        message_type,
    })))
}

fn guess_message_type(content_type: Option<&str>) -> ChatMessageType {
    match content_type {
        Some(ct) if ct.starts_with("image/") => ChatMessageType::Image,
        Some(ct) if ct.starts_with("audio/") => ChatMessageType::Voice,
        _ => ChatMessageType::File,
    }
}

/// パス区切りや制御文字を `_` に置き換え、長さを制限する
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STORED_NAME_CHARS)
        .collect();
    let trimmed = sanitized.trim_start_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        // テスト項目: ディレクトリ部分と危険な文字が取り除かれる
        // given (前提条件):
        let cases = [
            ("photo.png", "photo.png"),
            ("../../etc/passwd", "passwd"),
            ("C:\\Users\\me\\見積書 v2.pdf", "____v2.pdf"),
            ("..hidden", "hidden"),
            ("", "file"),
        ];

        for (input, expected) in cases {
            // when (操作):
            let sanitized = sanitize_file_name(input);

            // then (期待する結果):
            assert_eq!(sanitized, expected, "input: {input}");
        }
    }

    #[test]
    fn test_guess_message_type_from_content_type() {
        // テスト項目: Content-Type から画像・音声・その他を推定する
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(
            guess_message_type(Some("image/png")),
            ChatMessageType::Image
        );
        assert_eq!(
            guess_message_type(Some("audio/webm")),
            ChatMessageType::Voice
        );
        assert_eq!(
            guess_message_type(Some("application/pdf")),
            ChatMessageType::File
        );
        assert_eq!(guess_message_type(None), ChatMessageType::File);
    }
}
