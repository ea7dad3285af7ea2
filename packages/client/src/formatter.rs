//! Message formatting utilities for client display.

use quicktalk_shared::{envelope::ChatMessageType, time::millis_to_rfc3339};

use crate::{
    config_resolver::ServerConfig,
    transport::{ChatMessage, TransportFailure, UploadedFile},
};

const RULE: &str = "============================================================";
const SEPARATOR: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the connected banner
    ///
    /// # Arguments
    ///
    /// * `config` - The resolved server configuration
    /// * `shop_id` - The shop this customer is talking to
    /// * `customer_id` - The current customer's ID
    ///
    /// # Returns
    ///
    /// A formatted string with the connection summary
    pub fn format_connected(config: &ServerConfig, shop_id: &str, customer_id: &str) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{RULE}\n"));
        output.push_str(&format!(
            "Connected to {} (version {})\n",
            config.server_url, config.version
        ));
        output.push_str(&format!("Shop: {shop_id}\n"));
        output.push_str(&format!("You: {customer_id}\n"));
        output.push_str(&format!("{RULE}\n"));
        output
    }

    /// Format a staff message
    ///
    /// # Arguments
    ///
    /// * `message` - The message received from staff
    ///
    /// # Returns
    ///
    /// A formatted string with sender, content, attachment and time
    pub fn format_staff_message(message: &ChatMessage) -> String {
        let sender = message.sender_id.as_deref().unwrap_or("staff");
        let mut output = format!("\n{SEPARATOR}\n@{sender}: {}\n", message.content);

        if message.message_type != ChatMessageType::Text
            && let Some(url) = message.file_url.as_deref()
        {
            let name = message.file_name.as_deref().unwrap_or(url);
            output.push_str(&format!(
                "[{}] {} <{}>\n",
                message.message_type.as_str(),
                name,
                url
            ));
        }

        output.push_str(&format!(
            "    sent at {}\n{SEPARATOR}\n",
            millis_to_rfc3339(message.timestamp)
        ));
        output
    }

    /// Format the confirmation line shown after sending
    pub fn format_sent_confirmation(sent_at: i64) -> String {
        format!("    sent at {}\n", millis_to_rfc3339(sent_at))
    }

    /// Format the result of a successful upload
    pub fn format_uploaded(file: &UploadedFile) -> String {
        format!("\n📎 {} uploaded: {}\n", file.file_name, file.url)
    }

    /// Format a disconnect notification
    pub fn format_disconnected() -> String {
        "\n- disconnected from server\n".to_string()
    }

    /// Format a transport failure
    ///
    /// Exhausted reconnects get a hint since only a manual reconnect helps.
    pub fn format_failure(failure: &TransportFailure) -> String {
        match failure {
            TransportFailure::ReconnectExhausted { .. } => {
                format!("\n! {failure}\n  Type /reconnect to try again.\n")
            }
            _ => format!("\n! {failure}\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicktalk_shared::envelope::SenderType;

    /// 2023-01-01T00:00:00Z
    const NEW_YEAR_UTC: i64 = 1_672_531_200_000;

    fn staff_message(message_type: ChatMessageType, file_url: Option<&str>) -> ChatMessage {
        ChatMessage {
            content: "Hello, world!".to_string(),
            message_type,
            sender_type: SenderType::Staff,
            timestamp: NEW_YEAR_UTC,
            session_id: None,
            sender_id: Some("alice".to_string()),
            file_url: file_url.map(str::to_string),
            file_name: file_url.map(|_| "a.pdf".to_string()),
        }
    }

    #[test]
    fn test_format_connected() {
        // テスト項目: 接続バナーにサーバー、店舗、自分の ID が表示される
        // given (前提条件):
        let config = ServerConfig::manual("http://127.0.0.1:8080");

        // when (操作):
        let result = MessageFormatter::format_connected(&config, "shop-1", "guest-abc");

        // then (期待する結果):
        assert!(result.contains("Connected to http://127.0.0.1:8080 (version manual)"));
        assert!(result.contains("Shop: shop-1"));
        assert!(result.contains("You: guest-abc"));
        assert!(result.contains(RULE));
    }

    #[test]
    fn test_format_staff_text_message() {
        // テスト項目: テキストメッセージが送信者と時刻付きでフォーマットされる
        // given (前提条件):
        let message = staff_message(ChatMessageType::Text, None);

        // when (操作):
        let result = MessageFormatter::format_staff_message(&message);

        // then (期待する結果):
        assert!(result.contains("@alice: Hello, world!"));
        assert!(result.contains("sent at 2023-01-01T00:00:00+00:00"));
        assert!(result.contains(SEPARATOR));
        assert!(!result.contains("[text]"));
    }

    #[test]
    fn test_format_staff_file_message() {
        // テスト項目: ファイルメッセージには種別、ファイル名、URL が表示される
        // given (前提条件):
        let message = staff_message(ChatMessageType::File, Some("https://cdn.example.com/a.pdf"));

        // when (操作):
        let result = MessageFormatter::format_staff_message(&message);

        // then (期待する結果):
        assert!(result.contains("[file] a.pdf <https://cdn.example.com/a.pdf>"));
    }

    #[test]
    fn test_format_sent_confirmation() {
        // テスト項目: 送信確認メッセージが正しくフォーマットされる
        // given (前提条件):
        let sent_at = NEW_YEAR_UTC;

        // when (操作):
        let result = MessageFormatter::format_sent_confirmation(sent_at);

        // then (期待する結果):
        assert_eq!(result, "    sent at 2023-01-01T00:00:00+00:00\n");
    }

    #[test]
    fn test_format_failure_hints_manual_reconnect() {
        // テスト項目: 再接続を使い切った場合だけ /reconnect の案内が付く
        // given (前提条件):
        let exhausted = TransportFailure::ReconnectExhausted { attempts: 5 };
        let socket = TransportFailure::Socket("reset".to_string());

        // when (操作):
        let exhausted = MessageFormatter::format_failure(&exhausted);
        let socket = MessageFormatter::format_failure(&socket);

        // then (期待する結果):
        assert!(exhausted.contains("/reconnect"));
        assert!(exhausted.contains("5 reconnect attempts"));
        assert!(!socket.contains("/reconnect"));
    }
}
