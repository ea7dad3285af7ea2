//! Server discovery.
//!
//! Candidates are tried in preference order through `GET /api/config`; the
//! first well-formed answer is cached for ten minutes.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use quicktalk_shared::{
    time::{Clock, SystemClock},
    url::{is_loopback_host, to_ws_url},
};
use reqwest::Url;
use serde::Deserialize;

use crate::{error::ClientError, lock, page::PageContext};

/// Version reported to `/api/sdk/version` comparisons
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Alternate port tried on the page's own host
pub const ALTERNATE_PORT: u16 = 8443;

const CACHE_TTL: Duration = Duration::from_secs(10 * 60);
const CANDIDATE_TIMEOUT: Duration = Duration::from_secs(5);

const LOCAL_FALLBACKS: [&str; 4] = [
    "https://localhost:8443",
    "http://localhost:8080",
    "https://127.0.0.1:8443",
    "http://127.0.0.1:8080",
];

/// Resolved server endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub version: String,
    pub server_url: String,
    pub ws_url: String,
    pub endpoints: Option<Endpoints>,
}

impl ServerConfig {
    /// `connect(Some(url))` 用の手動設定。探索は行わない
    pub fn manual(server_url: &str) -> Self {
        let server_url = server_url.trim_end_matches('/').to_string();
        Self {
            version: "manual".to_string(),
            ws_url: to_ws_url(&server_url),
            server_url,
            endpoints: None,
        }
    }

    /// Customer socket base, without the `/{shopId}/{customerId}` suffix
    pub fn customer_socket_base(&self) -> String {
        self.endpoints
            .as_ref()
            .and_then(|e| e.websocket.as_ref())
            .map(|ws| ws.customer.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("{}/ws/customer", self.ws_url.trim_end_matches('/')))
    }

    pub fn upload_url(&self) -> String {
        self.endpoints
            .as_ref()
            .and_then(|e| e.upload.clone())
            .unwrap_or_else(|| format!("{}/api/customer/upload", self.server_url))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(default)]
    pub websocket: Option<SocketEndpoints>,
    #[serde(default)]
    pub upload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketEndpoints {
    pub customer: String,
}

/// `/api/config` の応答本体。`success` などの余分なフィールドは無視する
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigBody {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    ws_url: Option<String>,
    #[serde(default)]
    endpoints: Option<Endpoints>,
}

#[derive(Debug, Deserialize)]
struct VersionBody {
    #[serde(default)]
    version: Option<String>,
}

struct CachedConfig {
    config: ServerConfig,
    fetched_at: i64,
}

/// Finds a reachable QuickTalk server for a page
pub struct ConfigResolver {
    http: reqwest::Client,
    page: PageContext,
    clock: Arc<dyn Clock>,
    candidate_timeout: Duration,
    cache: Mutex<Option<CachedConfig>>,
}

impl ConfigResolver {
    pub fn new(page: PageContext) -> Self {
        Self {
            http: reqwest::Client::new(),
            page,
            clock: Arc::new(SystemClock),
            candidate_timeout: CANDIDATE_TIMEOUT,
            cache: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.candidate_timeout = timeout;
        self
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    /// 接続候補を優先順に並べる
    ///
    /// 1. 手動指定のサーバー
    /// 2. ページが localhost 以外なら `{scheme}://{host}:8443` とページのオリジン
    /// 3. localhost / 127.0.0.1 の https:8443 と http:8080
    ///
    /// 重複は最初の出現だけを残す。
    pub fn detect_server_candidates(&self, manual_server_url: Option<&str>) -> Vec<String> {
        let mut candidates = Vec::new();

        if let Some(manual) = manual_server_url {
            candidates.push(manual.trim_end_matches('/').to_string());
        }

        if !self.page.is_loopback() {
            candidates.push(format!(
                "{}://{}:{}",
                self.page.scheme(),
                self.page.host(),
                ALTERNATE_PORT
            ));
            candidates.push(self.page.origin());
        }

        candidates.extend(LOCAL_FALLBACKS.iter().map(|c| c.to_string()));

        let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        tracing::debug!("Server candidates ({}): {:?}", unique.len(), unique);
        unique
    }

    /// Return a reachable server, probing candidates in order
    ///
    /// The cache is only consulted when no manual server is given.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoServerAvailable`] listing every candidate's failure.
    pub async fn find_available_server(
        &self,
        manual_server_url: Option<&str>,
    ) -> Result<ServerConfig, ClientError> {
        if manual_server_url.is_none()
            && let Some(config) = self.cached()
        {
            tracing::debug!("Using cached server config for {}", config.server_url);
            return Ok(config);
        }

        let candidates = self.detect_server_candidates(manual_server_url);
        let mut failures = Vec::with_capacity(candidates.len());

        for url in &candidates {
            match self.fetch_candidate(url).await {
                Ok(config) => {
                    tracing::info!("Server found at {} (version {})", url, config.version);
                    self.store(config.clone());
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!("Server candidate {} failed: {}", url, e);
                    failures.push(format!("{url}: {e}"));
                }
            }
        }

        Err(ClientError::NoServerAvailable(failures))
    }

    /// Fetch one candidate's config within the candidate timeout
    async fn fetch_candidate(&self, url: &str) -> Result<ServerConfig, ClientError> {
        let request = async {
            let response = self
                .http
                .get(format!("{url}/api/config"))
                .send()
                .await?
                .error_for_status()?;
            let text = response.text().await?;
            Ok::<_, ClientError>(text)
        };

        let text = tokio::time::timeout(self.candidate_timeout, request)
            .await
            .map_err(|_| ClientError::Timeout(self.candidate_timeout.as_millis()))??;

        let body: ConfigBody =
            serde_json::from_str(&text).map_err(|e| ClientError::InvalidConfig {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ServerConfig {
            version: body.version.unwrap_or_else(|| "unknown".to_string()),
            server_url: url.to_string(),
            ws_url: body.ws_url.unwrap_or_else(|| to_ws_url(url)),
            endpoints: body.endpoints,
        })
    }

    /// Compare the server's SDK version with ours; never fails
    pub async fn check_for_updates(&self, server_url: &str) {
        let fetch = async {
            let body: VersionBody = self
                .http
                .get(format!("{server_url}/api/sdk/version"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            Ok::<_, reqwest::Error>(body)
        };

        match tokio::time::timeout(self.candidate_timeout, fetch).await {
            Ok(Ok(VersionBody {
                version: Some(version),
            })) if version != CLIENT_VERSION => {
                tracing::info!(
                    "New SDK version available: {} (current: {})",
                    version,
                    CLIENT_VERSION
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!("Version check failed: {}", e),
            Err(_) => tracing::debug!("Version check timed out"),
        }
    }

    /// キャッシュ済みサーバーのオリジン。loopback のときは `None`
    pub fn known_public_server(&self) -> Option<String> {
        let guard = lock(&self.cache);
        let cached = guard.as_ref()?;
        let url = Url::parse(&cached.config.server_url).ok()?;
        let host = url.host_str()?;
        if is_loopback_host(host) {
            return None;
        }
        Some(match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        })
    }

    /// Drop the cached config so the next lookup tries the candidates again
    pub fn invalidate(&self) {
        *lock(&self.cache) = None;
    }

    fn cached(&self) -> Option<ServerConfig> {
        let guard = lock(&self.cache);
        let cached = guard.as_ref()?;
        let age = self.clock.now_millis() - cached.fetched_at;
        (age < CACHE_TTL.as_millis() as i64).then(|| cached.config.clone())
    }

    fn store(&self, config: ServerConfig) {
        let fetched_at = self.clock.now_millis();
        *lock(&self.cache) = Some(CachedConfig { config, fetched_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicktalk_shared::time::ManualClock;

    fn config_at(server_url: &str) -> ServerConfig {
        ServerConfig {
            version: "1.0.0".to_string(),
            server_url: server_url.to_string(),
            ws_url: to_ws_url(server_url),
            endpoints: None,
        }
    }

    #[test]
    fn test_candidates_for_public_page() {
        // テスト項目: 公開ページでは手動指定、代替ポート、オリジン、ローカル候補の順になる
        // given (前提条件):
        let resolver = ConfigResolver::new(PageContext::new("https", "shop.example.com", None));

        // when (操作):
        let candidates = resolver.detect_server_candidates(Some("https://chat.example.com/"));

        // then (期待する結果):
        assert_eq!(
            candidates,
            vec![
                "https://chat.example.com",
                "https://shop.example.com:8443",
                "https://shop.example.com",
                "https://localhost:8443",
                "http://localhost:8080",
                "https://127.0.0.1:8443",
                "http://127.0.0.1:8080",
            ]
        );
    }

    #[test]
    fn test_candidates_for_local_page_are_deduplicated() {
        // テスト項目: localhost ページではページ由来の候補がなく、重複は除かれる
        // given (前提条件):
        let resolver = ConfigResolver::new(PageContext::new("http", "localhost", Some(8080)));

        // when (操作):
        let candidates = resolver.detect_server_candidates(Some("http://localhost:8080"));

        // then (期待する結果):
        assert_eq!(
            candidates,
            vec![
                "http://localhost:8080",
                "https://localhost:8443",
                "https://127.0.0.1:8443",
                "http://127.0.0.1:8080",
            ]
        );
    }

    #[test]
    fn test_cache_expires_after_ten_minutes() {
        // テスト項目: キャッシュは 10 分未満なら使われ、10 分経つと破棄される
        // given (前提条件):
        let clock = Arc::new(ManualClock::new(1_000_000));
        let resolver = ConfigResolver::new(PageContext::default()).with_clock(clock.clone());
        resolver.store(config_at("https://chat.example.com"));

        // when (操作):
        clock.advance(10 * 60 * 1000 - 1);
        let fresh = resolver.cached();
        clock.advance(1);
        let stale = resolver.cached();

        // then (期待する結果):
        assert!(fresh.is_some());
        assert!(stale.is_none());
    }

    #[test]
    fn test_known_public_server_ignores_loopback() {
        // テスト項目: loopback サーバーは公開サーバーとして扱わない
        // given (前提条件):
        let resolver = ConfigResolver::new(PageContext::default());

        // when (操作):
        resolver.store(config_at("http://127.0.0.1:8080"));
        let loopback = resolver.known_public_server();
        resolver.store(config_at("https://chat.example.com:8443"));
        let public = resolver.known_public_server();
        resolver.invalidate();
        let cleared = resolver.known_public_server();

        // then (期待する結果):
        assert_eq!(loopback, None);
        assert_eq!(public.as_deref(), Some("https://chat.example.com:8443"));
        assert_eq!(cleared, None);
    }

    #[test]
    fn test_endpoint_fallbacks() {
        // テスト項目: endpoints がない場合は wsUrl / serverUrl から組み立てる
        // given (前提条件):
        let manual = ServerConfig::manual("https://chat.example.com/");

        // when (操作):
        let socket = manual.customer_socket_base();
        let upload = manual.upload_url();

        // then (期待する結果):
        assert_eq!(manual.version, "manual");
        assert_eq!(socket, "wss://chat.example.com/ws/customer");
        assert_eq!(upload, "https://chat.example.com/api/customer/upload");
    }

    #[tokio::test]
    async fn test_all_candidates_failing_yields_aggregate_error() {
        // テスト項目: すべての候補に失敗すると候補ごとの失敗を含む 1 つのエラーになる
        // given (前提条件):
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let resolver = ConfigResolver::new(PageContext::default())
            .with_candidate_timeout(Duration::from_millis(200));

        // when (操作):
        let result = resolver.find_available_server(Some(&dead)).await;

        // then (期待する結果):
        match result {
            Err(ClientError::NoServerAvailable(failures)) => {
                assert_eq!(failures.len(), 5);
                assert!(failures[0].starts_with(&dead));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
