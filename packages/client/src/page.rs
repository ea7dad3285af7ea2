//! The page the chat widget is embedded in.
//!
//! Discovery candidates and URL protocol adaptation both depend on the
//! scheme and host of the embedding page, so callers pass it in explicitly.

use quicktalk_shared::url::is_loopback_host;
use reqwest::Url;

use crate::error::ClientError;

/// Scheme, host and port of the embedding page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl PageContext {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into().trim_end_matches(':').to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// `https://shop.example.com:8443` のようなオリジン文字列から作る
    ///
    /// 既定ポート（http:80 / https:443）は `port` に入らない。
    pub fn parse(origin: &str) -> Result<Self, ClientError> {
        let url = Url::parse(origin).map_err(|e| {
            ClientError::ConnectionError(format!("invalid page origin '{origin}': {e}"))
        })?;
        let host = url.host_str().ok_or_else(|| {
            ClientError::ConnectionError(format!("page origin '{origin}' has no host"))
        })?;
        Ok(Self::new(url.scheme(), host, url.port()))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    pub fn is_loopback(&self) -> bool {
        is_loopback_host(&self.host)
    }

    /// `{scheme}://{host}[:{port}]`
    pub fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }
}

impl Default for PageContext {
    /// A local page served over plain HTTP
    fn default() -> Self {
        Self::new("http", "localhost", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drops_default_port() {
        // テスト項目: 既定ポートは origin に含まれず、明示ポートは保持される
        // given (前提条件):
        let plain = "https://Shop.Example.com";
        let with_port = "http://shop.example.com:3000/";

        // when (操作):
        let plain = PageContext::parse(plain).unwrap();
        let with_port = PageContext::parse(with_port).unwrap();

        // then (期待する結果):
        assert_eq!(plain.origin(), "https://shop.example.com");
        assert!(plain.is_https());
        assert_eq!(with_port.origin(), "http://shop.example.com:3000");
        assert_eq!(with_port.port(), Some(3000));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        // テスト項目: URL として解釈できないオリジンはエラーになる
        // given (前提条件):
        let origin = "not a url";

        // when (操作):
        let result = PageContext::parse(origin);

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::ConnectionError(_))));
    }
}
