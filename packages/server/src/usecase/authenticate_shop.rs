//! UseCase: 店舗 API キーの検証
//!
//! 形式チェック → キーの照合 → 店舗状態の確認 → 最終使用時刻の更新 の順に行う。
//! 拒否した場合はセキュリティイベントを記録する。

use std::sync::Arc;

use quicktalk_shared::time::Clock;

use crate::domain::{ApiKey, EventContext, SecurityEventKind, SecurityLogger, Shop, ShopRepository};

use super::error::ServiceError;

/// API キー検証のユースケース
pub struct AuthenticateShopUseCase {
    shops: Arc<dyn ShopRepository>,
    security_logger: Arc<dyn SecurityLogger>,
    clock: Arc<dyn Clock>,
}

impl AuthenticateShopUseCase {
    pub fn new(
        shops: Arc<dyn ShopRepository>,
        security_logger: Arc<dyn SecurityLogger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shops,
            security_logger,
            clock,
        }
    }

    /// API キーを検証し、有効な店舗を返す
    ///
    /// # Errors
    ///
    /// * `InvalidApiKeyFormat` - 空、または `sk_` で始まらない
    /// * `InvalidApiKey` - 該当する店舗がない
    /// * `ShopDisabled` - 店舗が active でない
    /// * `Internal` - Repository の失敗
    pub async fn execute(&self, raw_key: &str, ip: Option<&str>) -> Result<Shop, ServiceError> {
        let context = EventContext::default().with_ip(ip);

        let api_key = match ApiKey::parse(raw_key) {
            Ok(key) => key,
            Err(e) => {
                self.security_logger.security_event(
                    SecurityEventKind::ApiValidationFailed,
                    &context,
                    &e.to_string(),
                );
                return Err(e.into());
            }
        };

        let shop = match self.shops.get_shop_by_api_key(api_key.as_str()).await? {
            Some(shop) => shop,
            None => {
                self.security_logger.security_event(
                    SecurityEventKind::ApiValidationFailed,
                    &context,
                    &format!("unknown key {api_key:?}"),
                );
                return Err(ServiceError::InvalidApiKey);
            }
        };

        if !shop.is_active() {
            self.security_logger.security_event(
                SecurityEventKind::ShopDisabled,
                &EventContext::shop(&shop.id).with_ip(ip),
                "shop is not active",
            );
            return Err(ServiceError::ShopDisabled);
        }

        if let Err(e) = self
            .shops
            .update_last_used(&shop.id, self.clock.now_millis())
            .await
        {
            tracing::warn!(
                "Failed to update last used time for shop '{}': {}",
                shop.id,
                e
            );
        }

        Ok(shop)
    }
}
