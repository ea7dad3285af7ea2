//! UseCase: 接続レジストリ
//!
//! 顧客セッションの発行・検証・失効・切断を行う。
//!
//! - セッションは `last_activity_at` から 30 分（`SESSION_TTL_MILLIS`）で失効する
//! - 検証に成功するたびに `last_activity_at` を更新する（スライディング TTL）
//! - 失効判定は検証時と定期スイープの両方で同じ TTL を使う
//! - 全ての時刻は注入された `Clock` から取得する
//!
//! 接続には 2 つの段階がある。
//!
//! - `ConnectTier::Secure`: API キー・店舗 ID・ドメインを全て検証する
//! - `ConnectTier::Basic`: 店舗 ID の存在確認のみ（キーを持たない埋め込みウィジェット向け）

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use quicktalk_shared::time::Clock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{
    ClientMeta, ConnectionEventKind, Conversation, EventContext, MessageRepository,
    SecurityEventKind, SecurityLogger, Session, SessionStore, Shop, ShopRepository, UsageDelta,
    match_domain,
};

use super::{authenticate_shop::AuthenticateShopUseCase, error::ServiceError};

/// セッションの TTL（最終アクティビティからの経過時間）
pub const SESSION_TTL_MILLIS: i64 = 30 * 60 * 1000;

/// 期限切れセッションのスイープ間隔
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTier {
    Secure,
    Basic,
}

/// 接続要求
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub api_key: Option<String>,
    pub shop_id: Option<String>,
    pub user_id: Option<String>,
    /// 埋め込み元ドメイン（Secure では必須）
    pub domain: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// 接続結果
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    pub session: Session,
    pub shop: Shop,
    pub conversation: Conversation,
    pub expires_at: i64,
}

/// セッションの状態（外部公開用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub shop_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub connected_at: i64,
    pub last_activity_at: i64,
    pub expires_at: i64,
    pub duration_ms: i64,
    pub ip: Option<String>,
    pub domain: Option<String>,
}

impl SessionStatus {
    fn from_session(session: &Session, now_millis: i64) -> Self {
        Self {
            session_id: session.session_id.clone(),
            shop_id: session.shop_id.clone(),
            user_id: session.user_id.clone(),
            conversation_id: session.conversation_id.clone(),
            connected_at: session.created_at,
            last_activity_at: session.last_activity_at,
            expires_at: session.expires_at(SESSION_TTL_MILLIS),
            duration_ms: (now_millis - session.created_at).max(0),
            ip: session.meta.ip.clone(),
            domain: session.meta.domain.clone(),
        }
    }
}

/// 接続統計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub total_sessions: usize,
    pub sessions_by_shop: BTreeMap<String, usize>,
    pub oldest_activity_at: Option<i64>,
    pub newest_activity_at: Option<i64>,
}

/// 接続レジストリ
pub struct ConnectionRegistry {
    store: Arc<dyn SessionStore>,
    shops: Arc<dyn ShopRepository>,
    messages: Arc<dyn MessageRepository>,
    authenticator: Arc<AuthenticateShopUseCase>,
    security_logger: Arc<dyn SecurityLogger>,
    clock: Arc<dyn Clock>,
}

impl ConnectionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        shops: Arc<dyn ShopRepository>,
        messages: Arc<dyn MessageRepository>,
        authenticator: Arc<AuthenticateShopUseCase>,
        security_logger: Arc<dyn SecurityLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            shops,
            messages,
            authenticator,
            security_logger,
            clock,
        }
    }

    /// 接続を受け付け、新しいセッションを発行する
    ///
    /// 同じ顧客が何度接続しても会話は同じものが返り、セッションは毎回新しく発行される。
    pub async fn connect(
        &self,
        tier: ConnectTier,
        request: ConnectRequest,
    ) -> Result<ConnectOutcome, ServiceError> {
        let shop = match tier {
            ConnectTier::Secure => self.authorize_secure(&request).await?,
            ConnectTier::Basic => self.authorize_basic(&request).await?,
        };
        // 必須チェック済み
        let user_id = request.user_id.as_deref().unwrap_or_default().trim();

        let now = self.clock.now_millis();
        let meta = ClientMeta {
            ip: request.ip.clone(),
            user_agent: request.user_agent.clone(),
            domain: request.domain.clone(),
        };
        let conversation = self
            .messages
            .create_or_get_conversation(&shop.id, user_id, meta.clone(), now)
            .await?;

        let session = Session {
            session_id: generate_session_id(now),
            shop_id: shop.id.clone(),
            user_id: user_id.to_string(),
            conversation_id: conversation.id.clone(),
            created_at: now,
            last_activity_at: now,
            meta,
        };
        self.store.set(session.clone());

        if let Err(e) = self
            .shops
            .record_usage(&shop.id, UsageDelta::connection())
            .await
        {
            tracing::warn!("Failed to record connection usage for '{}': {}", shop.id, e);
        }

        self.security_logger.connection_event(
            ConnectionEventKind::Connected,
            &EventContext::shop(&shop.id)
                .with_user(Some(user_id))
                .with_session(&session.session_id)
                .with_ip(request.ip.as_deref())
                .with_domain(request.domain.as_deref()),
        );
        tracing::info!(
            "Session '{}' opened for {}/{} ({:?})",
            session.session_id,
            shop.id,
            user_id,
            tier
        );

        Ok(ConnectOutcome {
            expires_at: session.expires_at(SESSION_TTL_MILLIS),
            session,
            shop,
            conversation,
        })
    }

    async fn authorize_secure(&self, request: &ConnectRequest) -> Result<Shop, ServiceError> {
        ServiceError::require(&[
            ("shopKey", request.api_key.as_deref()),
            ("shopId", request.shop_id.as_deref()),
            ("userId", request.user_id.as_deref()),
            ("domain", request.domain.as_deref()),
        ])?;
        let api_key = request.api_key.as_deref().unwrap_or_default();
        let shop_id = request.shop_id.as_deref().unwrap_or_default().trim();
        let domain = request.domain.as_deref().unwrap_or_default();
        let ip = request.ip.as_deref();

        let shop = self.authenticator.execute(api_key, ip).await?;

        if shop.id != shop_id {
            self.security_logger.security_event(
                SecurityEventKind::ShopIdMismatch,
                &EventContext::shop(shop_id).with_ip(ip),
                &format!("key belongs to '{}'", shop.id),
            );
            return Err(ServiceError::ShopIdMismatch);
        }

        if match_domain(domain, &shop.domain).is_none() {
            self.security_logger.security_event(
                SecurityEventKind::InvalidDomain,
                &EventContext::shop(&shop.id)
                    .with_ip(ip)
                    .with_domain(Some(domain)),
                &format!("registered domain is '{}'", shop.domain),
            );
            return Err(ServiceError::UnauthorizedAccess(
                "domain is not authorized for this shop".to_string(),
            ));
        }

        Ok(shop)
    }

    async fn authorize_basic(&self, request: &ConnectRequest) -> Result<Shop, ServiceError> {
        ServiceError::require(&[
            ("shopId", request.shop_id.as_deref()),
            ("userId", request.user_id.as_deref()),
        ])?;
        let shop_id = request.shop_id.as_deref().unwrap_or_default().trim();

        let shop = self
            .shops
            .get_shop_by_id(shop_id)
            .await?
            .ok_or(ServiceError::ShopNotFound)?;
        if !shop.is_active() {
            self.security_logger.security_event(
                SecurityEventKind::ShopDisabled,
                &EventContext::shop(&shop.id).with_ip(request.ip.as_deref()),
                "shop is not active",
            );
            return Err(ServiceError::ShopDisabled);
        }
        Ok(shop)
    }

    /// セッションを検証する
    ///
    /// 有効なら `last_activity_at` を現在時刻に更新して返す。
    /// 期限切れならストアから削除して `None` を返す。
    pub fn validate_session(&self, session_id: &str) -> Option<Session> {
        let session = self.store.get(session_id)?;
        let now = self.clock.now_millis();

        if session.is_expired(now, SESSION_TTL_MILLIS) {
            self.expire(session_id, now);
            return None;
        }

        self.store.touch(session_id, now)
    }

    fn expire(&self, session_id: &str, now: i64) {
        let removed = self.store.sweep(&|s: &Session| {
            s.session_id == session_id && s.is_expired(now, SESSION_TTL_MILLIS)
        });
        for session in removed {
            self.log_expired(&session);
        }
    }

    fn log_expired(&self, session: &Session) {
        self.security_logger.connection_event(
            ConnectionEventKind::Expired,
            &EventContext::shop(&session.shop_id)
                .with_user(Some(&session.user_id))
                .with_session(&session.session_id),
        );
    }

    /// セッションの状態を返す（期限切れ・不明なら `SessionNotFound`）
    pub fn status(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        self.validate_session(session_id)
            .map(|s| SessionStatus::from_session(&s, self.clock.now_millis()))
            .ok_or(ServiceError::SessionNotFound)
    }

    /// セッションを切断する
    ///
    /// 存在しないセッションの切断は成功扱い（`Ok(false)`）。
    /// `user_id` が指定され、セッションの所有者と異なる場合は拒否する。
    pub fn disconnect(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let Some(session) = self.store.get(session_id) else {
            return Ok(false);
        };

        if let Some(user_id) = user_id.filter(|u| !u.is_empty())
            && user_id != session.user_id
        {
            self.security_logger.security_event(
                SecurityEventKind::UserMismatch,
                &EventContext::shop(&session.shop_id)
                    .with_user(Some(user_id))
                    .with_session(session_id),
                "disconnect requested by another user",
            );
            return Err(ServiceError::UnauthorizedAccess(
                "session belongs to another user".to_string(),
            ));
        }

        let Some(removed) = self.store.delete(session_id) else {
            return Ok(false);
        };
        self.security_logger.connection_event(
            ConnectionEventKind::Disconnected,
            &EventContext::shop(&removed.shop_id)
                .with_user(Some(&removed.user_id))
                .with_session(session_id),
        );
        tracing::info!("Session '{}' closed", session_id);
        Ok(true)
    }

    /// 期限切れセッションを一括削除し、削除件数を返す
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let removed = self
            .store
            .sweep(&|s: &Session| s.is_expired(now, SESSION_TTL_MILLIS));
        for session in &removed {
            self.log_expired(session);
        }
        if !removed.is_empty() {
            tracing::info!("Swept {} expired session(s)", removed.len());
        }
        removed.len()
    }

    /// 定期スイープのタスクを起動する
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 初回の即時 tick を捨てる
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.sweep_expired();
                    }
                }
            }
        })
    }

    /// 有効なセッション一覧（店舗で絞り込み可）
    pub fn active_connections(&self, shop_id: Option<&str>) -> Vec<SessionStatus> {
        let now = self.clock.now_millis();
        let mut sessions: Vec<SessionStatus> = self
            .store
            .list()
            .iter()
            .filter(|s| !s.is_expired(now, SESSION_TTL_MILLIS))
            .filter(|s| shop_id.is_none_or(|id| s.shop_id == id))
            .map(|s| SessionStatus::from_session(s, now))
            .collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }

    pub fn stats(&self) -> ConnectionStats {
        let now = self.clock.now_millis();
        let mut stats = ConnectionStats::default();
        for session in self.store.list() {
            if session.is_expired(now, SESSION_TTL_MILLIS) {
                continue;
            }
            stats.total_sessions += 1;
            *stats
                .sessions_by_shop
                .entry(session.shop_id.clone())
                .or_default() += 1;
            let at = session.last_activity_at;
            stats.oldest_activity_at = Some(stats.oldest_activity_at.map_or(at, |o| o.min(at)));
            stats.newest_activity_at = Some(stats.newest_activity_at.map_or(at, |n| n.max(at)));
        }
        stats
    }
}

/// `sess_<millis>_<uuid>` 形式のセッション ID
fn generate_session_id(now_millis: i64) -> String {
    format!("sess_{}_{}", now_millis, Uuid::new_v4().simple())
}
