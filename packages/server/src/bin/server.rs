//! QuickTalk customer chat server.
//!
//! Serves the session / message API under `/api` and customer sockets under
//! `/ws/customer/{shopId}/{customerId}`.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin quicktalk-server
//! cargo run --bin quicktalk-server -- --host 0.0.0.0 --port 3000 --seed-demo-shop
//! ```

use std::sync::Arc;

use clap::Parser;
use quicktalk_server::{
    config::{ServerArgs, ServerConfig},
    domain::{Shop, ShopStatus},
    infrastructure::repository::inmemory::InMemoryShopRepository,
    ui::{AppState, Server},
};
use quicktalk_shared::{logger::setup_logger, time::SystemClock};

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = ServerArgs::parse();
    let seed_demo_shop = args.seed_demo_shop;
    let config = ServerConfig::from(args);

    // Initialize dependencies in order:
    // 1. Shop repository (optionally seeded)
    // 2. AppState (repositories, MessagePusher, UseCases)
    // 3. Server

    // 1. Create Shop repository
    let shops = Arc::new(InMemoryShopRepository::new());
    if seed_demo_shop {
        shops.insert(Shop {
            id: "demo-shop".to_string(),
            name: "Demo Shop".to_string(),
            domain: "localhost".to_string(),
            api_key: "sk_demo_key".to_string(),
            status: ShopStatus::Active,
        });
        tracing::info!("Seeded demo shop 'demo-shop' (key: sk_demo_key, domain: localhost)");
    }
    if shops.is_empty() {
        tracing::warn!("No shops registered; every connect will be rejected");
    }

    // 2. Create AppState
    let state = AppState::with_in_memory(config, shops, Arc::new(SystemClock));

    // 3. Create and run the server
    if let Err(e) = Server::new(state).run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
