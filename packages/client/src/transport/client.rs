//! Customer socket transport.
//!
//! [`ClientTransport`] owns one socket at a time. Lifecycle decisions go
//! through [`ConnectionMachine`]; this module performs the I/O the machine
//! asks for and publishes [`TransportEvent`]s to subscribers.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::{
    SinkExt, StreamExt,
    future::BoxFuture,
    stream::{SplitSink, SplitStream},
};
use quicktalk_shared::{
    envelope::{ChatMessageType, MessageEnvelope},
    time::now_millis,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use uuid::Uuid;

use crate::{
    config_resolver::{ConfigResolver, ServerConfig},
    error::ClientError,
    lock,
    page::PageContext,
    url_adapter::adapt_url_protocol,
};

use super::{
    inbound::{ChatMessage, Inbound, InboundContext, decode_frame},
    machine::{Action, ConnectionMachine, ConnectionState, LifecycleEvent},
};

pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CAPACITY: usize = 64;
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport settings
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub shop_id: String,
    /// Generated as `guest-…` when absent
    pub customer_id: Option<String>,
    pub page: PageContext,
    /// Skip discovery and connect here
    pub server_url: Option<String>,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
    pub connect_timeout: Duration,
}

impl TransportOptions {
    pub fn new(shop_id: impl Into<String>) -> Self {
        Self {
            shop_id: shop_id.into(),
            customer_id: None,
            page: PageContext::default(),
            server_url: None,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Failure reported to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("WebSocket connection failed: {0}")]
    Connect(String),

    #[error("WebSocket error: {0}")]
    Socket(String),

    /// 自動再接続を使い切った。`reconnect()` を呼ぶ必要がある
    #[error("Connection lost after {attempts} reconnect attempts; call reconnect() to retry")]
    ReconnectExhausted { attempts: u32 },
}

/// What subscribers receive
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected(ServerConfig),
    Message(ChatMessage),
    Disconnected,
    Error(TransportFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub url: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    url: String,
}

/// Realtime connection of one customer to one shop
///
/// Cloning is cheap; clones share the same socket.
///
/// # Example
///
/// ```ignore
/// let transport = ClientTransport::new(TransportOptions::new("shop-1"));
/// let mut events = transport.subscribe();
/// transport.connect(None).await?;
/// transport.send_message("hello", ChatMessageType::Text);
/// ```
#[derive(Clone)]
pub struct ClientTransport {
    inner: Arc<Inner>,
}

struct Inner {
    shop_id: String,
    customer_id: String,
    connect_timeout: Duration,
    max_reconnect_attempts: u32,
    resolver: ConfigResolver,
    http: reqwest::Client,
    machine: Mutex<ConnectionMachine>,
    server_config: Mutex<Option<ServerConfig>>,
    server_override: Mutex<Option<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    retry: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<TransportEvent>,
}

impl ClientTransport {
    pub fn new(options: TransportOptions) -> Self {
        let resolver = ConfigResolver::new(options.page.clone());
        Self::with_resolver(options, resolver)
    }

    pub fn with_resolver(options: TransportOptions, resolver: ConfigResolver) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let customer_id = options
            .customer_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_customer_id);

        Self {
            inner: Arc::new(Inner {
                shop_id: options.shop_id,
                customer_id,
                connect_timeout: options.connect_timeout,
                max_reconnect_attempts: options.max_reconnect_attempts,
                resolver,
                http: reqwest::Client::new(),
                machine: Mutex::new(ConnectionMachine::new(
                    options.reconnect_base,
                    options.max_reconnect_attempts,
                )),
                server_config: Mutex::new(None),
                server_override: Mutex::new(options.server_url),
                outbound: Mutex::new(None),
                writer: Mutex::new(None),
                reader: Mutex::new(None),
                retry: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.machine).state()
    }

    pub fn server_config(&self) -> Option<ServerConfig> {
        lock(&self.inner.server_config).clone()
    }

    pub fn customer_id(&self) -> &str {
        &self.inner.customer_id
    }

    pub fn shop_id(&self) -> &str {
        &self.inner.shop_id
    }

    /// Connect, discovering the server unless `server_url` is given
    ///
    /// A given `server_url` is remembered for automatic reconnects. Calling
    /// this while an attempt is in flight or the socket is open does nothing.
    ///
    /// # Errors
    ///
    /// Discovery, handshake or timeout failure of this attempt. Subscribers
    /// also get [`TransportEvent::Error`] and a reconnect may be scheduled.
    pub async fn connect(&self, server_url: Option<&str>) -> Result<(), ClientError> {
        if let Some(url) = server_url {
            *lock(&self.inner.server_override) = Some(url.to_string());
        }

        match self.inner.transition(LifecycleEvent::Connect) {
            Action::Dial { epoch } => self.inner.clone().dial(epoch).await,
            _ => {
                tracing::debug!("Connect ignored in state {:?}", self.state());
                Ok(())
            }
        }
    }

    /// Close with code 1000. No reconnect follows
    pub async fn disconnect(&self) {
        let (action, outbound) = {
            let mut machine = lock(&self.inner.machine);
            let action = machine.transition(LifecycleEvent::Disconnect);
            (action, lock(&self.inner.outbound).take())
        };

        if let Some(retry) = lock(&self.inner.retry).take() {
            retry.abort();
        }

        if action == Action::CloseSocket {
            if let Some(tx) = outbound {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: String::from("client disconnect").into(),
                };
                let _ = tx.send(Message::Close(Some(frame)));
            }
            let writer = lock(&self.inner.writer).take();
            if let Some(writer) = writer
                && tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await.is_err()
            {
                tracing::warn!("Close frame was not flushed in time");
            }
            tracing::info!("Disconnected from server");
            self.inner.emit(TransportEvent::Disconnected);
        }

        // 切断後に読み取りエラーや受信が通知されないよう止める
        if let Some(reader) = lock(&self.inner.reader).take() {
            reader.abort();
        }

        self.inner.transition(LifecycleEvent::CloseCompleted);
    }

    /// Manual reconnect after automatic attempts ran out
    ///
    /// Clears the cached server config so discovery runs again.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.disconnect().await;
        self.inner.resolver.invalidate();
        self.inner.transition(LifecycleEvent::Reset);
        self.connect(None).await
    }

    pub async fn cleanup(&self) {
        self.disconnect().await;
    }

    /// Send a customer message. Returns `false` when the socket is not open
    pub fn send_message(&self, content: &str, message_type: ChatMessageType) -> bool {
        self.inner
            .send_envelope(&MessageEnvelope::send_message(content, message_type))
    }

    /// Send a message referencing an uploaded file
    pub fn send_file_message(
        &self,
        file_url: &str,
        file_name: &str,
        message_type: ChatMessageType,
    ) -> bool {
        self.inner.send_envelope(&MessageEnvelope::send_file_message(
            file_url,
            file_name,
            message_type,
        ))
    }

    /// Upload a file, then announce it on the socket
    ///
    /// The returned URL is protocol-adapted. Upload and announcement form one
    /// operation; a failed announcement is only logged.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConfigured`] before the first successful connect,
    /// otherwise I/O, HTTP or non-2xx upload failures.
    pub async fn upload_file(
        &self,
        path: &Path,
        message_type: ChatMessageType,
    ) -> Result<UploadedFile, ClientError> {
        let config = self.server_config().ok_or(ClientError::NotConfigured)?;
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone()),
            )
            .text("shopId", self.inner.shop_id.clone())
            .text("messageType", message_type.as_str())
            .text("customerCode", self.inner.customer_id.clone());

        let response = self
            .inner
            .http
            .post(config.upload_url())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::UploadFailed(status.as_u16()));
        }
        let body: UploadBody = response.json().await?;

        let url = self.inner.adapt_url(&body.url);
        if !self.send_file_message(&url, &file_name, message_type) {
            tracing::warn!("Uploaded '{}' but could not announce it", file_name);
        }
        tracing::info!("Uploaded '{}' to {}", file_name, url);

        Ok(UploadedFile { url, file_name })
    }
}

impl Inner {
    fn transition(&self, event: LifecycleEvent) -> Action {
        lock(&self.machine).transition(event)
    }

    /// `epoch` の接続がまだ有効か（切断や新しい試行で無効になる）
    fn is_current(&self, epoch: u64) -> bool {
        lock(&self.machine).epoch() == epoch
    }

    fn emit(&self, event: TransportEvent) {
        // 購読者がいない場合は捨てる
        let _ = self.events.send(event);
    }

    fn adapt_url(&self, url: &str) -> String {
        let public = self.resolver.known_public_server();
        adapt_url_protocol(url, self.resolver.page(), public.as_deref())
    }

    fn dial(self: Arc<Self>, epoch: u64) -> BoxFuture<'static, Result<(), ClientError>> {
        Box::pin(async move {
            let Err(e) = self.open_socket(epoch).await else {
                return Ok(());
            };

            let action = self.transition(LifecycleEvent::Failed { epoch });
            if action != Action::Stale {
                tracing::warn!("Connection attempt failed: {}", e);
                self.emit(TransportEvent::Error(TransportFailure::Connect(
                    e.to_string(),
                )));
                self.clone().follow_up(action);
            }
            Err(e)
        })
    }

    async fn open_socket(self: &Arc<Self>, epoch: u64) -> Result<(), ClientError> {
        let server_override = lock(&self.server_override).clone();
        let config = match server_override {
            Some(url) => ServerConfig::manual(&url),
            None => self.resolver.find_available_server(None).await?,
        };
        let auth = MessageEnvelope::auth(&self.shop_id, &self.customer_id).to_json()?;

        let url = format!(
            "{}/{}/{}",
            config.customer_socket_base(),
            self.shop_id,
            self.customer_id
        );
        tracing::info!("Connecting to {}", url);

        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| ClientError::Timeout(self.connect_timeout.as_millis()))??;

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut machine = lock(&self.machine);
            if machine.transition(LifecycleEvent::Opened { epoch }) != Action::Authenticate {
                tracing::debug!("Dropping socket of superseded attempt {}", epoch);
                return Ok(());
            }
            *lock(&self.outbound) = Some(tx.clone());
            *lock(&self.server_config) = Some(config.clone());
        }

        let (write, read) = socket.split();
        let _ = tx.send(Message::Text(auth.into()));
        *lock(&self.writer) = Some(writer_loop(rx, write));
        *lock(&self.reader) = Some(self.spawn_reader(epoch, read));

        tracing::info!(
            "Connected as '{}' to shop '{}'",
            self.customer_id,
            self.shop_id
        );
        self.emit(TransportEvent::Connected(config.clone()));

        let this = self.clone();
        tokio::spawn(async move {
            this.resolver.check_for_updates(&config.server_url).await;
        });

        Ok(())
    }

    fn spawn_reader(self: &Arc<Self>, epoch: u64, mut read: SplitStream<Socket>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut close_code = None;
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => this.handle_text(epoch, text.as_str()),
                    Ok(Message::Close(frame)) => {
                        close_code = frame.map(|f| u16::from(f.code));
                        tracing::info!("Server closed the connection (code: {:?})", close_code);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if this.is_current(epoch) {
                            tracing::warn!("WebSocket read error: {}", e);
                            this.emit(TransportEvent::Error(TransportFailure::Socket(
                                e.to_string(),
                            )));
                        } else {
                            tracing::debug!("Read error on superseded socket {}: {}", epoch, e);
                        }
                        break;
                    }
                }
            }
            this.on_closed(epoch, close_code);
        })
    }

    fn handle_text(&self, epoch: u64, text: &str) {
        let public = self.resolver.known_public_server();
        let ctx = InboundContext {
            page: self.resolver.page(),
            public_server: public.as_deref(),
            received_at: now_millis(),
        };

        match decode_frame(text, &ctx) {
            Inbound::Message(message) if self.is_current(epoch) => {
                tracing::debug!("Staff message: {}", message.content);
                self.emit(TransportEvent::Message(message));
            }
            Inbound::Message(_) => tracing::debug!("Dropping message for superseded socket"),
            Inbound::Echo => tracing::debug!("Ignoring echo of own message"),
            Inbound::Ignored => {}
            Inbound::Malformed(e) => tracing::warn!("Ignoring unparseable frame: {}", e),
        }
    }

    fn on_closed(self: &Arc<Self>, epoch: u64, code: Option<u16>) {
        let action = {
            let mut machine = lock(&self.machine);
            let action = machine.transition(LifecycleEvent::Closed { epoch, code });
            if action != Action::Stale {
                lock(&self.outbound).take();
            }
            action
        };
        if action == Action::Stale {
            return;
        }

        self.emit(TransportEvent::Disconnected);
        self.clone().follow_up(action);
    }

    fn follow_up(self: Arc<Self>, action: Action) {
        match action {
            Action::ScheduleReconnect {
                attempt,
                delay,
                epoch,
            } => {
                tracing::info!(
                    "Reconnecting in {} ms (attempt {}/{})",
                    delay.as_millis(),
                    attempt,
                    self.max_reconnect_attempts
                );
                let this = self.clone();
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Action::Dial { epoch } =
                        this.transition(LifecycleEvent::RetryDue { epoch })
                    {
                        // 失敗は dial 内で通知済み
                        let _ = this.dial(epoch).await;
                    }
                });
                *lock(&self.retry) = Some(handle);
            }
            Action::GiveUp { attempts } => {
                tracing::error!("Failed to reconnect after {} attempts", attempts);
                self.emit(TransportEvent::Error(TransportFailure::ReconnectExhausted {
                    attempts,
                }));
            }
            _ => {}
        }
    }

    fn send_envelope(&self, envelope: &MessageEnvelope) -> bool {
        let Some(tx) = lock(&self.outbound).clone() else {
            tracing::warn!("Socket is not open, message dropped");
            return false;
        };
        match envelope.to_json() {
            Ok(json) => tx.send(Message::Text(json.into())).is_ok(),
            Err(e) => {
                tracing::warn!("Failed to serialize envelope: {}", e);
                false
            }
        }
    }
}

/// Spawns a task that forwards queued frames to the socket sink.
fn writer_loop(
    mut rx: mpsc::UnboundedReceiver<Message>,
    mut sink: SplitSink<Socket, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                tracing::warn!("WebSocket write error: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    })
}

/// `guest-` + random base36 + current time base36
pub fn generate_customer_id() -> String {
    let random = to_base36(Uuid::new_v4().as_u128());
    let time = to_base36(now_millis().max(0) as u128);
    format!("guest-{}{}", &random[..random.len().min(11)], time)
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
