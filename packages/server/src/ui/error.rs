//! HTTP error responses.
//!
//! Every failing handler or middleware returns [`ApiError`], which renders as
//! `{success: false, error: {code, message}}` with the status code derived from
//! the error kind.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    infrastructure::dto::http::{ErrorBody, ErrorResponse},
    usecase::{ErrorKind, ServiceError},
};

#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Parameter => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::MissingParameters(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(ServiceError::MissingParameters(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, details) = match &self.0 {
            ServiceError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                ("Internal server error".to_string(), None)
            }
            ServiceError::RateLimitExceeded {
                limit,
                retry_after_secs,
            } => (
                self.0.to_string(),
                Some(json!({ "limit": limit, "retryAfter": retry_after_secs })),
            ),
            other => (other.to_string(), None),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.0.code(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ServiceError::RateLimitExceeded {
            retry_after_secs, ..
        } = self.0
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        // テスト項目: エラー分類から HTTP ステータスが決まる
        // given (前提条件):
        let cases = [
            (ServiceError::MissingParameters("x".into()), 400),
            (ServiceError::InvalidApiKey, 401),
            (ServiceError::ShopIdMismatch, 403),
            (ServiceError::SessionNotFound, 404),
            (
                ServiceError::RateLimitExceeded {
                    limit: 1,
                    retry_after_secs: 1,
                },
                429,
            ),
            (ServiceError::Internal("db".into()), 500),
        ];

        for (error, expected) in cases {
            // when (操作):
            let status = ApiError(error).status();

            // then (期待する結果):
            assert_eq!(status.as_u16(), expected);
        }
    }

    #[test]
    fn test_rate_limit_response_has_retry_after() {
        // テスト項目: 429 レスポンスに Retry-After ヘッダーが付く
        // given (前提条件):
        let error = ApiError(ServiceError::RateLimitExceeded {
            limit: 10,
            retry_after_secs: 42,
        });

        // when (操作):
        let response = error.into_response();

        // then (期待する結果):
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
