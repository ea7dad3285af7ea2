//! 埋め込み元ドメインの検証
//!
//! リクエスト元のドメインが店舗の登録ドメインと一致するかを判定する。
//! 比較の前に両方を正規化する（小文字化、スキーム・`www.`・ポート・パス・末尾スラッシュの除去）。

/// 一致の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainMatch {
    /// 正規化後の完全一致
    Exact,
    /// 登録ドメインのサブドメイン
    Subdomain,
    /// localhost / 127.0.0.1 からの開発用アクセス
    Development,
}

/// ドメインを比較用に正規化する
///
/// `https://WWW.Shop.example:8443/path/` → `shop.example`
pub fn normalize_domain(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let without_scheme = match lowered.find("://") {
        Some(idx) => &lowered[idx + 3..],
        None => lowered.as_str(),
    };
    let host_port = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // userinfo@host
    let host_port = host_port.rsplit('@').next().unwrap_or_default();
    let host = strip_port(host_port);
    let host = host.strip_prefix("www.").unwrap_or(host);
    host.trim_end_matches('.').to_string()
}

fn strip_port(host_port: &str) -> &str {
    // IPv6 literal
    if host_port.starts_with('[') {
        return match host_port.find(']') {
            Some(end) => &host_port[..=end],
            None => host_port,
        };
    }
    match host_port.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => host_port,
    }
}

fn is_development_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "[::1]"
}

/// リクエストドメインが登録ドメインに対して許可されるかを判定する
///
/// 許可されない場合は `None`。
pub fn match_domain(request_domain: &str, registered_domain: &str) -> Option<DomainMatch> {
    let request = normalize_domain(request_domain);
    let registered = normalize_domain(registered_domain);

    if request.is_empty() {
        return None;
    }
    if !registered.is_empty() && request == registered {
        return Some(DomainMatch::Exact);
    }
    if !registered.is_empty() && request.ends_with(&format!(".{registered}")) {
        return Some(DomainMatch::Subdomain);
    }
    if is_development_host(&request) {
        return Some(DomainMatch::Development);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain_strips_decorations() {
        // テスト項目: スキーム・www・ポート・パス・末尾スラッシュが除去され小文字化される
        // given (前提条件):
        let raw = "https://WWW.Shop.Example:8443/products/?q=1";

        // when (操作):
        let normalized = normalize_domain(raw);

        // then (期待する結果):
        assert_eq!(normalized, "shop.example");
    }

    #[test]
    fn test_normalize_domain_plain_host() {
        // テスト項目: ホスト名だけの入力はそのまま（小文字化のみ）
        // given (前提条件):
        let raw = "Shop.Example/";

        // when (操作):
        let normalized = normalize_domain(raw);

        // then (期待する結果):
        assert_eq!(normalized, "shop.example");
    }

    #[test]
    fn test_match_domain_exact_and_subdomain() {
        // テスト項目: 完全一致とサブドメインが許可される
        // given (前提条件):
        let registered = "shop.example";

        // when (操作):
        let exact = match_domain("https://www.shop.example", registered);
        let sub = match_domain("blog.shop.example", registered);

        // then (期待する結果):
        assert_eq!(exact, Some(DomainMatch::Exact));
        assert_eq!(sub, Some(DomainMatch::Subdomain));
    }

    #[test]
    fn test_match_domain_rejects_lookalike_suffix() {
        // テスト項目: 末尾が一致するだけの別ドメインは拒否される
        // given (前提条件):
        let registered = "shop.example";

        // when (操作):
        let result = match_domain("evilshop.example", registered);

        // then (期待する結果):
        assert_eq!(result, None);
    }

    #[test]
    fn test_match_domain_allows_localhost() {
        // テスト項目: localhost / 127.0.0.1 は開発用として許可される
        // given (前提条件):
        let registered = "shop.example";

        // when (操作):
        let localhost = match_domain("http://localhost:3000", registered);
        let loopback = match_domain("127.0.0.1:8080", registered);

        // then (期待する結果):
        assert_eq!(localhost, Some(DomainMatch::Development));
        assert_eq!(loopback, Some(DomainMatch::Development));
    }

    #[test]
    fn test_match_domain_rejects_empty_request() {
        // テスト項目: 空のドメインは拒否される
        // given (前提条件):
        let registered = "shop.example";

        // when (操作):
        let result = match_domain("", registered);

        // then (期待する結果):
        assert_eq!(result, None);
    }
}
