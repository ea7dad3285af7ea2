//! InMemory 店舗 Repository 実装

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{RepositoryError, Shop, ShopRepository, ShopUsage, UsageDelta};

/// インメモリ店舗 Repository
///
/// 店舗は起動時（またはテスト）に `insert` で登録する。
#[derive(Default)]
pub struct InMemoryShopRepository {
    shops: DashMap<String, Shop>,
    usage: DashMap<String, ShopUsage>,
}

impl InMemoryShopRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, shop: Shop) {
        tracing::debug!("Registered shop '{}' ({})", shop.id, shop.domain);
        self.shops.insert(shop.id.clone(), shop);
    }

    pub fn len(&self) -> usize {
        self.shops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shops.is_empty()
    }
}

#[async_trait]
impl ShopRepository for InMemoryShopRepository {
    async fn get_shop_by_api_key(&self, api_key: &str) -> Result<Option<Shop>, RepositoryError> {
        Ok(self
            .shops
            .iter()
            .find(|entry| entry.api_key == api_key)
            .map(|entry| entry.value().clone()))
    }

    async fn get_shop_by_id(&self, shop_id: &str) -> Result<Option<Shop>, RepositoryError> {
        Ok(self.shops.get(shop_id).map(|entry| entry.value().clone()))
    }

    async fn update_last_used(&self, shop_id: &str, at: i64) -> Result<(), RepositoryError> {
        if !self.shops.contains_key(shop_id) {
            return Err(RepositoryError::NotFound(shop_id.to_string()));
        }
        self.usage.entry(shop_id.to_string()).or_default().last_used_at = Some(at);
        Ok(())
    }

    async fn record_usage(&self, shop_id: &str, delta: UsageDelta) -> Result<(), RepositoryError> {
        let mut usage = self.usage.entry(shop_id.to_string()).or_default();
        usage.api_requests += delta.api_requests;
        usage.messages += delta.messages;
        usage.connections += delta.connections;
        Ok(())
    }

    async fn get_usage(&self, shop_id: &str) -> Result<ShopUsage, RepositoryError> {
        Ok(self
            .usage
            .get(shop_id)
            .map(|entry| *entry.value())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ShopStatus;

    fn shop() -> Shop {
        Shop {
            id: "shop-1".to_string(),
            name: "Demo".to_string(),
            domain: "shop.example".to_string(),
            api_key: "sk_live_1".to_string(),
            status: ShopStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_key_and_id() {
        // テスト項目: API キーと店舗 ID のどちらでも取得できる
        // given (前提条件):
        let repo = InMemoryShopRepository::new();
        repo.insert(shop());

        // when (操作):
        let by_key = repo.get_shop_by_api_key("sk_live_1").await.unwrap();
        let by_id = repo.get_shop_by_id("shop-1").await.unwrap();
        let missing = repo.get_shop_by_api_key("sk_live_2").await.unwrap();

        // then (期待する結果):
        assert_eq!(by_key, Some(shop()));
        assert_eq!(by_id, Some(shop()));
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_usage_counters_accumulate() {
        // テスト項目: 利用量カウンタが加算され、最終使用時刻が記録される
        // given (前提条件):
        let repo = InMemoryShopRepository::new();
        repo.insert(shop());

        // when (操作):
        repo.record_usage("shop-1", UsageDelta::message()).await.unwrap();
        repo.record_usage("shop-1", UsageDelta::connection()).await.unwrap();
        repo.update_last_used("shop-1", 99).await.unwrap();
        let usage = repo.get_usage("shop-1").await.unwrap();

        // then (期待する結果):
        assert_eq!(usage.api_requests, 2);
        assert_eq!(usage.messages, 1);
        assert_eq!(usage.connections, 1);
        assert_eq!(usage.last_used_at, Some(99));
    }
}
