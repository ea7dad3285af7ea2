//! Shared application state.

use std::{sync::Arc, time::Instant};

use quicktalk_shared::time::Clock;

use crate::{
    config::ServerConfig,
    domain::{MessagePusher, SecurityLogger, ShopRepository},
    infrastructure::{
        TracingSecurityLogger,
        message_pusher::WebSocketMessagePusher,
        repository::inmemory::{InMemoryMessageRepository, InMemoryShopRepository},
        store::DashMapSessionStore,
    },
    usecase::{
        AuthenticateShopUseCase, ConnectionRegistry, GetMessagesUseCase, RateLimiter,
        SendMessageUseCase,
    },
};

/// Shared application state
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// ConnectionRegistry（セッションの発行・検証・失効）
    pub registry: Arc<ConnectionRegistry>,
    /// RateLimiter（固定ウィンドウのリクエスト制限）
    pub rate_limiter: Arc<RateLimiter>,
    pub authenticate_shop_usecase: Arc<AuthenticateShopUseCase>,
    pub send_message_usecase: Arc<SendMessageUseCase>,
    pub get_messages_usecase: Arc<GetMessagesUseCase>,
    pub shops: Arc<dyn ShopRepository>,
    /// MessagePusher（顧客ソケットへの通知の抽象化）
    pub message_pusher: Arc<dyn MessagePusher>,
    pub security_logger: Arc<dyn SecurityLogger>,
    pub clock: Arc<dyn Clock>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the in-memory collaborators together
    ///
    /// Initialization order:
    /// 1. Repositories and session store
    /// 2. MessagePusher and SecurityLogger
    /// 3. UseCases
    pub fn with_in_memory(
        config: ServerConfig,
        shops: Arc<InMemoryShopRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // 1. Repositories
        let shops: Arc<dyn ShopRepository> = shops;
        let messages = Arc::new(InMemoryMessageRepository::new());
        let store = Arc::new(DashMapSessionStore::new());

        // 2. MessagePusher / SecurityLogger
        let message_pusher: Arc<dyn MessagePusher> = Arc::new(WebSocketMessagePusher::new());
        let security_logger: Arc<dyn SecurityLogger> = Arc::new(TracingSecurityLogger);

        // 3. UseCases
        let authenticate_shop_usecase = Arc::new(AuthenticateShopUseCase::new(
            shops.clone(),
            security_logger.clone(),
            clock.clone(),
        ));
        let registry = Arc::new(ConnectionRegistry::new(
            store,
            shops.clone(),
            messages.clone(),
            authenticate_shop_usecase.clone(),
            security_logger.clone(),
            clock.clone(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limits,
            security_logger.clone(),
            clock.clone(),
        ));
        let send_message_usecase = Arc::new(SendMessageUseCase::new(
            shops.clone(),
            messages.clone(),
            message_pusher.clone(),
            clock.clone(),
        ));
        let get_messages_usecase = Arc::new(GetMessagesUseCase::new(messages, clock.clone()));

        Self {
            config: Arc::new(config),
            registry,
            rate_limiter,
            authenticate_shop_usecase,
            send_message_usecase,
            get_messages_usecase,
            shops,
            message_pusher,
            security_logger,
            clock,
            started_at: Instant::now(),
        }
    }
}
