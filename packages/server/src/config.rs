//! Server configuration.
//!
//! Command-line flags (with environment fallbacks) are parsed into
//! [`ServerArgs`] and then resolved into a [`ServerConfig`] that the rest of
//! the server reads.

use std::path::PathBuf;

use clap::Parser;
use quicktalk_shared::url::to_ws_url;

use crate::usecase::RateLimitRules;

/// SDK version advertised by `/api/config` and `/api/sdk/version`
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug, Clone)]
#[command(name = "quicktalk-server")]
#[command(about = "QuickTalk customer chat server", long_about = None)]
pub struct ServerArgs {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "QUICKTALK_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "QUICKTALK_PORT", default_value = "8080")]
    pub port: u16,

    /// Public base URL advertised to clients (defaults to http://host:port)
    #[arg(long, env = "QUICKTALK_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Directory uploaded files are written to
    #[arg(long, env = "QUICKTALK_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Register a demo shop (id `demo-shop`, key `sk_demo_key`, domain `localhost`)
    #[arg(long)]
    pub seed_demo_shop: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL without trailing slash, e.g. `https://chat.example.com`
    pub public_url: String,
    pub upload_dir: PathBuf,
    pub sdk_version: String,
    pub rate_limits: RateLimitRules,
}

impl ServerConfig {
    /// `ws://` / `wss://` form of the public URL
    pub fn public_ws_url(&self) -> String {
        to_ws_url(&self.public_url)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_url: "http://127.0.0.1:8080".to_string(),
            upload_dir: PathBuf::from("uploads"),
            sdk_version: SDK_VERSION.to_string(),
            rate_limits: RateLimitRules::default(),
        }
    }
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        let public_url = args
            .public_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}:{}", args.host, args.port));
        Self {
            host: args.host,
            port: args.port,
            public_url,
            upload_dir: args.upload_dir,
            sdk_version: SDK_VERSION.to_string(),
            rate_limits: RateLimitRules::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_defaults_to_bind_address() {
        // テスト項目: public_url 未指定時は bind アドレスから組み立てられる
        // given (前提条件):
        let args = ServerArgs::parse_from(["quicktalk-server", "--port", "9000"]);

        // when (操作):
        let config = ServerConfig::from(args);

        // then (期待する結果):
        assert_eq!(config.public_url, "http://127.0.0.1:9000");
        assert_eq!(config.public_ws_url(), "ws://127.0.0.1:9000");
    }

    #[test]
    fn test_public_url_trailing_slash_is_trimmed() {
        // テスト項目: public_url の末尾スラッシュが除去され、https は wss になる
        // given (前提条件):
        let args = ServerArgs::parse_from([
            "quicktalk-server",
            "--public-url",
            "https://chat.example.com/",
        ]);

        // when (操作):
        let config = ServerConfig::from(args);

        // then (期待する結果):
        assert_eq!(config.public_url, "https://chat.example.com");
        assert_eq!(config.public_ws_url(), "wss://chat.example.com");
    }
}
