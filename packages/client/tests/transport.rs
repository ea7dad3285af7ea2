//! Drives the client against a real server on an ephemeral port.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use quicktalk_client::{
    ClientError, ClientTransport, ConfigResolver, PageContext, TransportEvent, TransportOptions,
    transport::{ConnectionState, TransportFailure},
};
use quicktalk_server::{
    config::{SDK_VERSION, ServerConfig},
    domain::{Shop, ShopStatus},
    infrastructure::repository::inmemory::InMemoryShopRepository,
    ui::{AppState, build_router},
};
use quicktalk_shared::{envelope::ChatMessageType, time::SystemClock};
use serde_json::{Value, json};
use tokio::sync::broadcast;

const SHOP_ID: &str = "shop-1";
const SHOP_KEY: &str = "sk_live_1";

struct TestServer {
    base_url: String,
    upload_dir: PathBuf,
}

async fn start_server() -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upload_dir =
        std::env::temp_dir().join(format!("quicktalk-client-test-{}", uuid::Uuid::new_v4()));

    let shops = Arc::new(InMemoryShopRepository::new());
    shops.insert(Shop {
        id: SHOP_ID.to_string(),
        name: "Shop One".to_string(),
        domain: "localhost".to_string(),
        api_key: SHOP_KEY.to_string(),
        status: ShopStatus::Active,
    });
    let config = ServerConfig {
        port: addr.port(),
        public_url: format!("http://{addr}"),
        upload_dir: upload_dir.clone(),
        ..ServerConfig::default()
    };
    let state = AppState::with_in_memory(config, shops, Arc::new(SystemClock));
    let app = build_router(Arc::new(state));

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        upload_dir,
    }
}

fn options(customer_id: &str) -> TransportOptions {
    let mut options = TransportOptions::new(SHOP_ID);
    options.customer_id = Some(customer_id.to_string());
    options
}

/// Resolver whose cache already points at `base_url`
async fn resolver_for(base_url: &str) -> ConfigResolver {
    let resolver = ConfigResolver::new(PageContext::default());
    resolver.find_available_server(Some(base_url)).await.unwrap();
    resolver
}

async fn next_event(events: &mut broadcast::Receiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

async fn next_message(
    events: &mut broadcast::Receiver<TransportEvent>,
) -> quicktalk_client::transport::ChatMessage {
    loop {
        if let TransportEvent::Message(message) = next_event(events).await {
            return message;
        }
    }
}

async fn poll_messages(base_url: &str, user_id: &str) -> Vec<Value> {
    let body: Value = reqwest::Client::new()
        .get(format!("{base_url}/api/client/messages?userId={user_id}"))
        .header("x-shop-key", SHOP_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["messages"].as_array().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_discovery_reads_server_config() {
    // テスト項目: /api/config の応答から接続先が組み立てられ、キャッシュされる
    // given (前提条件):
    let server = start_server().await;
    let resolver = ConfigResolver::new(PageContext::default());

    // when (操作):
    let config = resolver
        .find_available_server(Some(&server.base_url))
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(config.server_url, server.base_url);
    assert_eq!(config.version, SDK_VERSION);
    assert_eq!(
        config.customer_socket_base(),
        format!(
            "{}/ws/customer",
            server.base_url.replace("http://", "ws://")
        )
    );
    assert_eq!(
        config.upload_url(),
        format!("{}/api/customer/upload", server.base_url)
    );
    // loopback サーバーは公開サーバーとして扱わない
    assert_eq!(resolver.known_public_server(), None);
}

#[tokio::test]
async fn test_staff_reply_reaches_customer_and_echo_is_suppressed() {
    // テスト項目: 顧客の送信は保存されるが反射は転送されず、スタッフの返信は届く
    // given (前提条件):
    let server = start_server().await;
    let transport =
        ClientTransport::with_resolver(options("alice"), resolver_for(&server.base_url).await);
    let mut events = transport.subscribe();
    transport.connect(None).await.unwrap();
    assert!(matches!(next_event(&mut events).await, TransportEvent::Connected(_)));
    assert_eq!(transport.state(), ConnectionState::Open);

    // when (操作):
    assert!(transport.send_message("hi from alice", ChatMessageType::Text));
    let mut stored = Vec::new();
    for _ in 0..50 {
        stored = poll_messages(&server.base_url, "alice").await;
        if !stored.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let reply: Value = reqwest::Client::new()
        .post(format!("{}/api/admin/send-reply", server.base_url))
        .header("x-shop-key", SHOP_KEY)
        .json(&json!({"userId": "alice", "message": "hello alice", "staffId": "bob"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let message = next_message(&mut events).await;

    // then (期待する結果):
    assert_eq!(stored[0]["content"], "hi from alice");
    assert_eq!(stored[0]["senderType"], "customer");
    assert_eq!(reply["delivered"], true);
    assert_eq!(message.content, "hello alice");
    assert_eq!(message.sender_id.as_deref(), Some("bob"));

    transport.cleanup().await;
}

#[tokio::test]
async fn test_disconnect_closes_without_reconnect() {
    // テスト項目: disconnect は正常切断となり、その後は再接続もイベント通知も行われない
    // given (前提条件):
    let server = start_server().await;
    let mut options = options("carol");
    options.reconnect_base = Duration::from_millis(20);
    let transport = ClientTransport::with_resolver(options, resolver_for(&server.base_url).await);
    let mut events = transport.subscribe();
    transport.connect(None).await.unwrap();
    assert!(matches!(next_event(&mut events).await, TransportEvent::Connected(_)));

    // when (操作):
    transport.disconnect().await;
    let event = next_event(&mut events).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut late = Vec::new();
    while let Ok(event) = events.try_recv() {
        late.push(format!("{event:?}"));
    }

    // then (期待する結果):
    assert!(matches!(event, TransportEvent::Disconnected));
    assert_eq!(transport.state(), ConnectionState::Closed);
    assert!(late.is_empty(), "events after disconnect: {late:?}");
    assert!(!transport.send_message("too late", ChatMessageType::Text));
}

#[tokio::test]
async fn test_unreachable_server_exhausts_reconnects() {
    // テスト項目: 接続できないサーバーでは再接続を上限まで試し、最後に終端エラーを通知する
    // given (前提条件):
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let mut options = options("dave");
    options.reconnect_base = Duration::from_millis(10);
    options.max_reconnect_attempts = 2;
    let transport = ClientTransport::new(options);
    let mut events = transport.subscribe();

    // when (操作):
    let first = transport.connect(Some(&dead)).await;
    let mut failures = Vec::new();
    loop {
        let TransportEvent::Error(failure) = next_event(&mut events).await else {
            continue;
        };
        let done = matches!(failure, TransportFailure::ReconnectExhausted { .. });
        failures.push(failure);
        if done {
            break;
        }
    }

    // then (期待する結果):
    assert!(matches!(first, Err(ClientError::WebSocket(_))));
    assert_eq!(failures.len(), 4);
    assert!(
        failures[..3]
            .iter()
            .all(|f| matches!(f, TransportFailure::Connect(_)))
    );
    assert_eq!(
        failures[3],
        TransportFailure::ReconnectExhausted { attempts: 2 }
    );
    assert_eq!(transport.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_upload_stores_file_and_announces_it() {
    // テスト項目: アップロードしたファイルが配信され、ファイルメッセージとして保存される
    // given (前提条件):
    let server = start_server().await;
    let transport =
        ClientTransport::with_resolver(options("erin"), resolver_for(&server.base_url).await);
    let mut events = transport.subscribe();
    transport.connect(None).await.unwrap();
    assert!(matches!(next_event(&mut events).await, TransportEvent::Connected(_)));
    let source =
        std::env::temp_dir().join(format!("quicktalk-upload-{}.txt", uuid::Uuid::new_v4()));
    tokio::fs::write(&source, b"receipt #42").await.unwrap();

    // when (操作):
    let uploaded = transport
        .upload_file(&source, ChatMessageType::File)
        .await
        .unwrap();
    let served = reqwest::get(&uploaded.url).await.unwrap().text().await.unwrap();
    let mut stored = Vec::new();
    for _ in 0..50 {
        stored = poll_messages(&server.base_url, "erin").await;
        if !stored.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // then (期待する結果):
    assert!(uploaded.url.starts_with(&format!("{}/uploads/", server.base_url)));
    assert_eq!(served, "receipt #42");
    assert_eq!(stored[0]["messageType"], "file");
    assert_eq!(stored[0]["content"], uploaded.url.as_str());

    transport.cleanup().await;
    let _ = tokio::fs::remove_file(&source).await;
    let _ = tokio::fs::remove_dir_all(&server.upload_dir).await;
}
