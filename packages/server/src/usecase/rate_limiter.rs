//! UseCase: 固定ウィンドウのレート制限
//!
//! クライアント識別子 × ルート分類ごとにカウンタを持つ。
//! カウンタの読み取り・リセット・加算は `DashMap::entry` のロック内で行う。
//!
//! ウィンドウの境界:
//! - `now - window_start > window_ms` になった最初のリクエストでカウンタを 0 に戻す
//! - 加算後のカウントが上限を超えたら拒否する（上限ちょうどまでは許可）

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use quicktalk_shared::time::Clock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{EventContext, SecurityEventKind, SecurityLogger};

use super::error::ServiceError;

/// ルートの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteClass {
    /// 接続系（secure-connect / connect）
    Connection,
    /// メッセージ送信
    MessageSend,
    /// その他の API 全般
    General,
}

impl RouteClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::MessageSend => "message_send",
            Self::General => "general",
        }
    }
}

/// ウィンドウ長と上限回数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub window_ms: i64,
    pub max_requests: u32,
}

impl RateLimitRule {
    pub const fn new(window_ms: i64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
        }
    }
}

/// ルート分類ごとのルール
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRules {
    pub connection: RateLimitRule,
    pub message_send: RateLimitRule,
    pub general: RateLimitRule,
}

impl RateLimitRules {
    pub fn rule_for(&self, class: RouteClass) -> RateLimitRule {
        match class {
            RouteClass::Connection => self.connection,
            RouteClass::MessageSend => self.message_send,
            RouteClass::General => self.general,
        }
    }
}

impl Default for RateLimitRules {
    /// 接続 10 回 / 5 分、送信 30 回 / 1 分、その他 60 回 / 1 分
    fn default() -> Self {
        Self {
            connection: RateLimitRule::new(5 * 60 * 1000, 10),
            message_send: RateLimitRule::new(60 * 1000, 30),
            general: RateLimitRule::new(60 * 1000, 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bucket {
    window_start: i64,
    count: u32,
}

/// 判定結果
///
/// 許可・拒否のどちらでも `X-RateLimit-*` ヘッダーの値として使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// ウィンドウがリセットされる時刻（Unix ミリ秒）
    pub reset_at: i64,
    /// 拒否時に待つべき秒数（切り上げ、最低 1）
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    pub fn into_result(self) -> Result<Self, ServiceError> {
        if self.allowed {
            Ok(self)
        } else {
            Err(ServiceError::RateLimitExceeded {
                limit: self.limit,
                retry_after_secs: self.retry_after_secs,
            })
        }
    }
}

/// キー単位の現在状態（管理用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub class: RouteClass,
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: i64,
}

pub struct RateLimiter {
    buckets: DashMap<(String, RouteClass), Bucket>,
    rules: RateLimitRules,
    security_logger: Arc<dyn SecurityLogger>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(
        rules: RateLimitRules,
        security_logger: Arc<dyn SecurityLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            buckets: DashMap::new(),
            rules,
            security_logger,
            clock,
        }
    }

    pub fn rules(&self) -> &RateLimitRules {
        &self.rules
    }

    /// 1 リクエスト分をカウントし、許可するかを判定する
    pub fn check(&self, identity: &str, class: RouteClass) -> RateLimitDecision {
        let rule = self.rules.rule_for(class);
        let now = self.clock.now_millis();

        let bucket = {
            let mut entry = self
                .buckets
                .entry((identity.to_string(), class))
                .or_insert(Bucket {
                    window_start: now,
                    count: 0,
                });
            if now - entry.window_start > rule.window_ms {
                entry.window_start = now;
                entry.count = 0;
            }
            entry.count = entry.count.saturating_add(1);
            *entry
        };

        let reset_at = bucket.window_start + rule.window_ms;
        let allowed = bucket.count <= rule.max_requests;
        let decision = RateLimitDecision {
            allowed,
            limit: rule.max_requests,
            remaining: rule.max_requests.saturating_sub(bucket.count),
            reset_at,
            retry_after_secs: retry_after_secs(reset_at - now),
        };

        if !allowed {
            tracing::warn!(
                "Rate limit exceeded for '{}' on {} ({} > {})",
                identity,
                class.as_str(),
                bucket.count,
                rule.max_requests
            );
            self.security_logger.security_event(
                SecurityEventKind::RateLimitExceeded,
                &EventContext::default().with_ip(Some(identity)),
                class.as_str(),
            );
        }

        decision
    }

    /// カウントせずに現在の状態を返す
    pub fn status(&self, identity: &str) -> Vec<RateLimitStatus> {
        let now = self.clock.now_millis();
        [
            RouteClass::Connection,
            RouteClass::MessageSend,
            RouteClass::General,
        ]
        .into_iter()
        .filter_map(|class| {
            let rule = self.rules.rule_for(class);
            let bucket = *self.buckets.get(&(identity.to_string(), class))?;
            let count = if now - bucket.window_start > rule.window_ms {
                0
            } else {
                bucket.count
            };
            Some(RateLimitStatus {
                class,
                count,
                limit: rule.max_requests,
                remaining: rule.max_requests.saturating_sub(count),
                reset_at: bucket.window_start + rule.window_ms,
            })
        })
        .collect()
    }

    /// 識別子のカウンタを削除する（`class` が `None` なら全分類）
    pub fn reset_key(&self, identity: &str, class: Option<RouteClass>) {
        self.buckets
            .retain(|(key, c), _| key != identity || class.is_some_and(|class| class != *c));
    }

    pub fn reset_all(&self) {
        self.buckets.clear();
    }

    /// ウィンドウを過ぎたカウンタを削除する
    pub fn prune(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.buckets.len();
        self.buckets.retain(|(_, class), bucket| {
            now - bucket.window_start <= self.rules.rule_for(*class).window_ms
        });
        before.saturating_sub(self.buckets.len())
    }

    /// 期限切れカウンタの定期削除タスクを起動する
    pub fn spawn_pruner(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = limiter.prune();
                        if pruned > 0 {
                            tracing::debug!("Pruned {} rate limit bucket(s)", pruned);
                        }
                    }
                }
            }
        })
    }
}

fn retry_after_secs(remaining_ms: i64) -> u64 {
    let secs = (remaining_ms.max(0) as u64).div_ceil(1000);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::security_logger::MockSecurityLogger;
    use quicktalk_shared::time::ManualClock;

    fn limiter_with(rules: RateLimitRules) -> (Arc<RateLimiter>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let mut logger = MockSecurityLogger::new();
        logger.expect_security_event().return_const(());
        let limiter = Arc::new(RateLimiter::new(rules, Arc::new(logger), clock.clone()));
        (limiter, clock)
    }

    #[test]
    fn test_connection_class_allows_ten_then_rejects() {
        // テスト項目: 接続は 5 分間に 10 回まで、11 回目は拒否される
        // given (前提条件):
        let (limiter, _clock) = limiter_with(RateLimitRules::default());

        // when (操作):
        let decisions: Vec<_> = (0..11)
            .map(|_| limiter.check("203.0.113.1", RouteClass::Connection))
            .collect();

        // then (期待する結果):
        assert!(decisions[..10].iter().all(|d| d.allowed));
        assert_eq!(decisions[9].remaining, 0);
        let rejected = decisions[10];
        assert!(!rejected.allowed);
        assert_eq!(rejected.limit, 10);
        assert_eq!(rejected.retry_after_secs, 300);
        assert_eq!(rejected.reset_at, 1_000_000 + 300_000);
    }

    #[test]
    fn test_window_resets_only_after_full_window() {
        // テスト項目: ウィンドウ長ちょうどではリセットされず、超えた後の最初のリクエストでリセット
        // given (前提条件):
        let rules = RateLimitRules {
            general: RateLimitRule::new(60_000, 2),
            ..RateLimitRules::default()
        };
        let (limiter, clock) = limiter_with(rules);
        limiter.check("k", RouteClass::General);
        limiter.check("k", RouteClass::General);

        // when (操作):
        clock.advance(60_000);
        let at_boundary = limiter.check("k", RouteClass::General);
        clock.advance(1);
        let after_boundary = limiter.check("k", RouteClass::General);

        // then (期待する結果):
        assert!(!at_boundary.allowed);
        assert!(after_boundary.allowed);
        assert_eq!(after_boundary.remaining, 1);
    }

    #[test]
    fn test_classes_and_identities_are_independent() {
        // テスト項目: 分類・識別子ごとにカウンタが独立している
        // given (前提条件):
        let rules = RateLimitRules {
            message_send: RateLimitRule::new(60_000, 1),
            ..RateLimitRules::default()
        };
        let (limiter, _clock) = limiter_with(rules);
        limiter.check("a", RouteClass::MessageSend);

        // when (操作):
        let same = limiter.check("a", RouteClass::MessageSend);
        let other_class = limiter.check("a", RouteClass::General);
        let other_identity = limiter.check("b", RouteClass::MessageSend);

        // then (期待する結果):
        assert!(!same.allowed);
        assert!(other_class.allowed);
        assert!(other_identity.allowed);
    }

    #[test]
    fn test_concurrent_checks_are_counted_exactly() {
        // テスト項目: 同時リクエストでも許可数が上限を超えない
        // given (前提条件):
        let rules = RateLimitRules {
            general: RateLimitRule::new(60_000, 50),
            ..RateLimitRules::default()
        };
        let (limiter, _clock) = limiter_with(rules);

        // when (操作):
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| limiter.check("shared", RouteClass::General).allowed)
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // then (期待する結果):
        assert_eq!(allowed, 50);
    }

    #[test]
    fn test_status_and_reset() {
        // テスト項目: status はカウントせずに状態を返し、reset_key で消える
        // given (前提条件):
        let (limiter, _clock) = limiter_with(RateLimitRules::default());
        limiter.check("k", RouteClass::MessageSend);
        limiter.check("k", RouteClass::MessageSend);

        // when (操作):
        let status = limiter.status("k");
        limiter.reset_key("k", Some(RouteClass::MessageSend));
        let after_reset = limiter.status("k");

        // then (期待する結果):
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].count, 2);
        assert_eq!(status[0].remaining, 28);
        assert!(after_reset.is_empty());
    }

    #[test]
    fn test_reset_all_clears_every_identity() {
        // テスト項目: reset_all で全識別子のカウンタが消え、再びカウント 1 から始まる
        // given (前提条件):
        let (limiter, _clock) = limiter_with(RateLimitRules::default());
        limiter.check("a", RouteClass::General);
        limiter.check("b", RouteClass::Connection);

        // when (操作):
        limiter.reset_all();
        let decision = limiter.check("a", RouteClass::General);

        // then (期待する結果):
        assert!(limiter.status("b").is_empty());
        assert_eq!(decision.remaining, 59);
    }

    #[test]
    fn test_rejection_maps_to_service_error() {
        // テスト項目: 拒否の判定は RATE_LIMIT_EXCEEDED に変換される
        // given (前提条件):
        let rules = RateLimitRules {
            general: RateLimitRule::new(60_000, 0),
            ..RateLimitRules::default()
        };
        let (limiter, _clock) = limiter_with(rules);

        // when (操作):
        let result = limiter.check("k", RouteClass::General).into_result();

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ServiceError::RateLimitExceeded {
                limit: 0,
                retry_after_secs: 60
            })
        );
    }
}
