//! Protocol adaptation for file URLs handed out by the server.
//!
//! An HTTPS page cannot load `http://` resources, so such URLs are upgraded.
//! Loopback URLs are left alone because a local dev server has no
//! certificate, unless a public server is already known, in which case the
//! loopback origin is swapped for the public one.

use quicktalk_shared::url::is_loopback_host;
use reqwest::Url;

use crate::page::PageContext;

/// `url` をページのスキームに合わせる
///
/// # Arguments
///
/// * `url` - Absolute or relative URL received from the server
/// * `page` - The embedding page
/// * `public_server` - Origin of a previously resolved non-loopback server, if any
///
/// # Returns
///
/// The URL to hand to listeners
pub fn adapt_url_protocol(url: &str, page: &PageContext, public_server: Option<&str>) -> String {
    if url.is_empty()
        || url.starts_with('/')
        || url.starts_with("data:")
        || url.starts_with("https://")
    {
        return url.to_string();
    }

    if !(page.is_https() && url.starts_with("http://")) {
        return url.to_string();
    }

    let Ok(parsed) = Url::parse(url) else {
        tracing::debug!("Leaving unparseable URL untouched: {}", url);
        return url.to_string();
    };

    if parsed.host_str().is_some_and(is_loopback_host) {
        return match public_server {
            Some(public) => rebase(&parsed, public),
            None => url.to_string(),
        };
    }

    format!("https://{}", &url["http://".len()..])
}

/// `parsed` のパスとクエリを `origin` の下に付け替える
fn rebase(parsed: &Url, origin: &str) -> String {
    let mut rebased = format!("{}{}", origin.trim_end_matches('/'), parsed.path());
    if let Some(query) = parsed.query() {
        rebased.push('?');
        rebased.push_str(query);
    }
    rebased
}
