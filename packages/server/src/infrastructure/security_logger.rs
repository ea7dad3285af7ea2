//! tracing によるセキュリティログ実装
//!
//! 全てのイベントを `security` ターゲットに出力する。
//! `RUST_LOG=security=info` のようにアプリケーションログと分けて絞り込める。

use crate::domain::{
    AccessRecord, ConnectionEventKind, EventContext, SecurityEventKind, SecurityLogger,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSecurityLogger;

impl SecurityLogger for TracingSecurityLogger {
    fn security_event(&self, kind: SecurityEventKind, context: &EventContext, detail: &str) {
        tracing::warn!(
            target: "security",
            event = kind.as_str(),
            shop_id = context.shop_id.as_deref(),
            user_id = context.user_id.as_deref(),
            session_id = context.session_id.as_deref(),
            ip = context.ip.as_deref(),
            domain = context.domain.as_deref(),
            "{}",
            detail
        );
    }

    fn connection_event(&self, kind: ConnectionEventKind, context: &EventContext) {
        tracing::info!(
            target: "security",
            event = kind.as_str(),
            shop_id = context.shop_id.as_deref(),
            user_id = context.user_id.as_deref(),
            session_id = context.session_id.as_deref(),
            ip = context.ip.as_deref(),
            domain = context.domain.as_deref(),
            "connection event"
        );
    }

    fn access(&self, record: &AccessRecord) {
        let level_is_error = record.status >= 500;
        if level_is_error {
            tracing::error!(
                target: "security",
                method = %record.method,
                path = %record.path,
                status = record.status,
                latency_ms = record.latency_ms,
                identity = %record.identity,
                "request failed"
            );
        } else {
            tracing::info!(
                target: "security",
                method = %record.method,
                path = %record.path,
                status = record.status,
                latency_ms = record.latency_ms,
                identity = %record.identity,
                "request"
            );
        }
    }
}
