//! Interactive line client on top of [`ClientTransport`].

use std::path::PathBuf;

use quicktalk_shared::{envelope::ChatMessageType, time::now_millis};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::{broadcast::error::RecvError, mpsc};

use crate::{
    error::ClientError,
    formatter::MessageFormatter,
    transport::{ClientTransport, TransportEvent, TransportOptions},
    ui::redisplay_prompt,
};

/// One line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Upload {
        path: PathBuf,
        message_type: ChatMessageType,
    },
    Reconnect,
    Quit,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        match parts.next() {
            Some("quit" | "exit") => Self::Quit,
            Some("reconnect") => Self::Reconnect,
            Some("upload") => {
                let Some(path) = parts.next() else {
                    return Self::Invalid("usage: /upload <path> [image|file|voice]".to_string());
                };
                let message_type = match parts.next().map(str::parse::<ChatMessageType>) {
                    None => ChatMessageType::File,
                    Some(Ok(message_type)) => message_type,
                    Some(Err(e)) => return Self::Invalid(e),
                };
                Self::Upload {
                    path: PathBuf::from(path),
                    message_type,
                }
            }
            Some(other) => Self::Invalid(format!("unknown command '/{other}'")),
            None => Self::Invalid("empty command".to_string()),
        }
    }
}

/// Run the chat client until `/quit`, Ctrl+C or Ctrl+D
///
/// Drops after a successful connect are retried by the transport; the first
/// connect is not.
pub async fn run_client(options: TransportOptions) -> Result<(), ClientError> {
    let transport = ClientTransport::new(options);
    let customer_id = transport.customer_id().to_string();
    let shop_id = transport.shop_id().to_string();

    // Spawn a task to print transport events
    let mut events = transport.subscribe();
    let customer_id_for_events = customer_id.clone();
    let event_task = tokio::spawn(async move {
        loop {
            let formatted = match events.recv().await {
                Ok(TransportEvent::Connected(config)) => {
                    MessageFormatter::format_connected(&config, &shop_id, &customer_id_for_events)
                }
                Ok(TransportEvent::Message(message)) => {
                    MessageFormatter::format_staff_message(&message)
                }
                Ok(TransportEvent::Disconnected) => MessageFormatter::format_disconnected(),
                Ok(TransportEvent::Error(failure)) => MessageFormatter::format_failure(&failure),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} transport events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            print!("{}", formatted);
            redisplay_prompt(&customer_id_for_events);
        }
    });

    if let Err(e) = transport.connect(None).await {
        transport.cleanup().await;
        event_task.abort();
        return Err(e);
    }

    println!(
        "\nYou are '{}'. Type messages and press Enter to send.\nCommands: /upload <path> [image|file|voice], /reconnect, /quit\n",
        customer_id
    );

    // Create channel for rustyline input
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // Spawn a blocking thread for rustyline (synchronous readline)
    let customer_id_for_prompt = customer_id.clone();
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        let prompt = format!("{}> ", customer_id_for_prompt);

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    while let Some(line) = input_rx.recv().await {
        match Command::parse(&line) {
            Command::Send(text) => {
                if transport.send_message(&text, ChatMessageType::Text) {
                    print!(
                        "{}",
                        MessageFormatter::format_sent_confirmation(now_millis())
                    );
                } else {
                    println!("(not connected, message dropped)");
                }
            }
            Command::Upload { path, message_type } => {
                match transport.upload_file(&path, message_type).await {
                    Ok(file) => print!("{}", MessageFormatter::format_uploaded(&file)),
                    Err(e) => println!("Upload of {} failed: {}", path.display(), e),
                }
            }
            Command::Reconnect => {
                if let Err(e) = transport.reconnect().await {
                    println!("Reconnect failed: {}", e);
                }
            }
            Command::Quit => break,
            Command::Invalid(reason) => println!("{}", reason),
        }
    }

    transport.cleanup().await;
    event_task.abort();
    tracing::info!("Client session ended");

    Ok(())
}
