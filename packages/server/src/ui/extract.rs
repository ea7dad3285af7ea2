//! Request extractors shared by handlers and middleware.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequest, FromRequestParts, Query},
    http::{Extensions, HeaderMap, header, request::Parts},
};

use crate::{domain::Shop, domain::normalize_domain, usecase::ServiceError};

use super::error::ApiError;

pub const X_SHOP_KEY: &str = "x-shop-key";
pub const X_SHOP_ID: &str = "x-shop-id";
pub const X_DOMAIN: &str = "x-domain";
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// 空でないヘッダー値を文字列で取り出す
pub fn header_str(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 呼び出し元の IP・User-Agent・埋め込み元ドメイン
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// 正規化済みのホスト名
    pub domain: Option<String>,
}

impl ClientInfo {
    /// IP はソケットの接続元を優先し、ヘッダーは接続元が取れない場合だけ使う
    pub fn from_head(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let ip = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .or_else(|| {
                header_str(headers, X_FORWARDED_FOR)
                    .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
                    .filter(|ip| !ip.is_empty())
            })
            .or_else(|| header_str(headers, X_REAL_IP));

        let domain = [
            header_str(headers, X_DOMAIN),
            header_str(headers, header::ORIGIN),
            header_str(headers, header::REFERER),
            header_str(headers, header::HOST),
        ]
        .into_iter()
        .flatten()
        .map(|raw| normalize_domain(&raw))
        .find(|domain| !domain.is_empty());

        Self {
            ip,
            user_agent: header_str(headers, header::USER_AGENT),
            domain,
        }
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_head(&parts.headers, &parts.extensions))
    }
}

/// 認証ミドルウェアが検証済みの店舗をリクエストに載せる
#[derive(Debug, Clone)]
pub struct ShopContext(pub Shop);

/// 検証済みの店舗（optional auth のルートでは `None` がありうる）
#[derive(Debug, Clone)]
pub struct MaybeShop(pub Option<Shop>);

impl<S> FromRequestParts<S> for MaybeShop
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ShopContext>()
                .map(|ShopContext(shop)| shop.clone()),
        ))
    }
}

/// 検証済みの店舗（無ければ `AUTHENTICATION_REQUIRED`）
#[derive(Debug, Clone)]
pub struct AuthedShop(pub Shop);

impl<S> FromRequestParts<S> for AuthedShop
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ShopContext>()
            .map(|ShopContext(shop)| Self(shop.clone()))
            .ok_or(ApiError(ServiceError::AuthenticationRequired))
    }
}

/// JSON ボディ（パース失敗は `MISSING_PARAMETERS`）
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// クエリ文字列（パース失敗は `MISSING_PARAMETERS`）
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
