//! Scheme and host helpers for server addresses.

/// `http` → `ws`, `https` → `wss`
pub fn to_ws_url(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        http_url.to_string()
    }
}

/// `localhost` または `127.0.0.1` かどうか
pub fn is_loopback_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}
