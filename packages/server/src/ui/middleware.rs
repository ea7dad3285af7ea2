//! Middleware chain in front of the API handlers.
//!
//! Order per route: access log → rate limit → auth → domain → handler.

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Query, Request, State},
    http::{Extensions, HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::{
    domain::{AccessRecord, EventContext, SecurityEventKind, Shop, match_domain},
    usecase::{RateLimitDecision, RouteClass, ServiceError},
};

use super::{
    error::ApiError,
    extract::{ClientInfo, ShopContext, X_SHOP_ID, X_SHOP_KEY, header_str},
    state::AppState,
};

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyQuery {
    shop_key: Option<String>,
    api_key: Option<String>,
}

/// API キーを `x-shop-key` → `Authorization: Bearer` → クエリの順に探す
fn api_key_of(req: &Request) -> Option<String> {
    header_str(req.headers(), X_SHOP_KEY)
        .or_else(|| {
            header_str(req.headers(), header::AUTHORIZATION)
                .and_then(|v| v.strip_prefix("Bearer ").map(|k| k.trim().to_string()))
                .filter(|k| !k.is_empty())
        })
        .or_else(|| {
            let Query(query) = Query::<KeyQuery>::try_from_uri(req.uri()).ok()?;
            query
                .shop_key
                .or(query.api_key)
                .filter(|k| !k.trim().is_empty())
        })
}

/// レート制限の識別子（API キー、無ければ接続元 IP）
fn client_identity(req: &Request) -> String {
    api_key_of(req)
        .or_else(|| ClientInfo::from_head(req.headers(), req.extensions()).ip)
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn access_log(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let identity = client_identity(&req);
    let started = Instant::now();

    let response = next.run(req).await;

    state.security_logger.access(&AccessRecord {
        method,
        path,
        status: response.status().as_u16(),
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        identity,
    });
    response
}

/// ルート分類ごとの固定ウィンドウ制限
///
/// 複数の制限が重なる場合、`X-RateLimit-*` は最も内側（ルート固有）の値が残る。
pub async fn rate_limit(
    State((state, class)): State<(Arc<AppState>, RouteClass)>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = client_identity(&req);
    let decision = state.rate_limiter.check(&identity, class).into_result()?;

    let mut response = next.run(req).await;
    set_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let reset_secs = decision.reset_at.div_euclid(1000) + i64::from(decision.reset_at % 1000 != 0);
    let values = [
        (X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit)),
        (X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining)),
        (X_RATELIMIT_RESET, HeaderValue::from(reset_secs)),
    ];
    for (name, value) in values {
        headers.entry(name).or_insert(value);
    }
}

/// API キー必須
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(api_key) = api_key_of(&req) else {
        return Err(ServiceError::AuthenticationRequired.into());
    };
    let shop = authenticate(&state, &api_key, req.headers(), req.extensions()).await?;
    req.extensions_mut().insert(ShopContext(shop));
    Ok(next.run(req).await)
}

/// API キーがあれば検証し、無ければそのまま通す
///
/// キーが付いていて検証に失敗した場合は拒否する。
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(api_key) = api_key_of(&req) {
        let shop = authenticate(&state, &api_key, req.headers(), req.extensions()).await?;
        req.extensions_mut().insert(ShopContext(shop));
    }
    Ok(next.run(req).await)
}

fn authenticate<'a>(
    state: &'a AppState,
    api_key: &'a str,
    headers: &HeaderMap,
    extensions: &Extensions,
) -> impl Future<Output = Result<Shop, ApiError>> + Send + use<'a> {
    // Request は Sync ではないため、await 前に必要な値を取り出しておく
    let client = ClientInfo::from_head(headers, extensions);
    let asserted_shop_id = header_str(headers, X_SHOP_ID);

    async move {
        let shop = state
            .authenticate_shop_usecase
            .execute(api_key, client.ip.as_deref())
            .await?;

        if let Some(asserted) = asserted_shop_id
            && asserted != shop.id
        {
            state.security_logger.security_event(
                SecurityEventKind::ShopIdMismatch,
                &EventContext::shop(&shop.id)
                    .with_ip(client.ip.as_deref())
                    .with_domain(client.domain.as_deref()),
                &format!("x-shop-id '{asserted}' does not own the key"),
            );
            return Err(ServiceError::ShopIdMismatch.into());
        }
        Ok(shop)
    }
}

/// 埋め込み元ドメインを店舗の登録ドメインと照合する（認証の後に置く）
pub async fn require_domain(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(ShopContext(shop)) = req.extensions().get::<ShopContext>() else {
        return Err(ServiceError::AuthenticationRequired.into());
    };
    let client = ClientInfo::from_head(req.headers(), req.extensions());
    let domain = client.domain.as_deref().unwrap_or_default();

    if match_domain(domain, &shop.domain).is_none() {
        state.security_logger.security_event(
            SecurityEventKind::InvalidDomain,
            &EventContext::shop(&shop.id)
                .with_ip(client.ip.as_deref())
                .with_domain(client.domain.as_deref()),
            &format!("'{domain}' is not authorized for '{}'", shop.domain),
        );
        return Err(ServiceError::UnauthorizedAccess("domain not authorized".to_string()).into());
    }
    Ok(next.run(req).await)
}

/// ドメイン不一致を記録するだけで拒否はしない
pub async fn optional_domain(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(ShopContext(shop)) = req.extensions().get::<ShopContext>() {
        let client = ClientInfo::from_head(req.headers(), req.extensions());
        if let Some(domain) = client.domain.as_deref()
            && match_domain(domain, &shop.domain).is_none()
        {
            state.security_logger.security_event(
                SecurityEventKind::InvalidDomain,
                &EventContext::shop(&shop.id)
                    .with_ip(client.ip.as_deref())
                    .with_domain(Some(domain)),
                "domain not authorized (not enforced)",
            );
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_rate_limit_headers_win() {
        // テスト項目: 既に設定済みの X-RateLimit-* は外側の制限で上書きされない
        // given (前提条件):
        let inner = RateLimitDecision {
            allowed: true,
            limit: 30,
            remaining: 29,
            reset_at: 60_000,
            retry_after_secs: 60,
        };
        let outer = RateLimitDecision {
            limit: 60,
            remaining: 59,
            ..inner
        };
        let mut headers = HeaderMap::new();

        // when (操作):
        set_rate_limit_headers(&mut headers, &inner);
        set_rate_limit_headers(&mut headers, &outer);

        // then (期待する結果):
        assert_eq!(headers[&X_RATELIMIT_LIMIT], "30");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "29");
        assert_eq!(headers[&X_RATELIMIT_RESET], "60");
    }

    #[test]
    fn test_api_key_sources() {
        // テスト項目: ヘッダー・Bearer・クエリのいずれからもキーを読める
        // given (前提条件):
        let by_header = axum::http::Request::builder()
            .header("x-shop-key", "sk_a")
            .body(axum::body::Body::empty())
            .unwrap();
        let by_bearer = axum::http::Request::builder()
            .header("authorization", "Bearer sk_b")
            .body(axum::body::Body::empty())
            .unwrap();
        let by_query = axum::http::Request::builder()
            .uri("/api/client/messages?userId=u&shopKey=sk_c")
            .body(axum::body::Body::empty())
            .unwrap();
        let none = axum::http::Request::builder()
            .uri("/api/client/messages?userId=u")
            .body(axum::body::Body::empty())
            .unwrap();

        // when (操作) / then (期待する結果):
        assert_eq!(api_key_of(&by_header).as_deref(), Some("sk_a"));
        assert_eq!(api_key_of(&by_bearer).as_deref(), Some("sk_b"));
        assert_eq!(api_key_of(&by_query).as_deref(), Some("sk_c"));
        assert_eq!(api_key_of(&none), None);
    }
}
