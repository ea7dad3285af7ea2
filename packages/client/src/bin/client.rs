//! QuickTalk customer chat client.
//!
//! Finds a QuickTalk server (or uses `--server-url`), opens the customer
//! socket for `--shop-id` and sends lines typed at the prompt. Staff replies
//! are printed as they arrive. Dropped connections are retried with
//! exponential backoff (1s, 2s, 4s, 8s, 16s); after that `/reconnect` starts
//! over.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin quicktalk-client -- --shop-id demo-shop
//! cargo run --bin quicktalk-client -- -s demo-shop -u http://127.0.0.1:8080 -c alice
//! ```

use clap::Parser;

use quicktalk_client::{PageContext, TransportOptions, run_client};
use quicktalk_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "quicktalk-client")]
#[command(about = "QuickTalk customer chat client", long_about = None)]
struct Args {
    /// Shop to talk to
    #[arg(short = 's', long, env = "QUICKTALK_SHOP_ID")]
    shop_id: String,

    /// Customer ID (a guest ID is generated when omitted)
    #[arg(short = 'c', long)]
    customer_id: Option<String>,

    /// Server base URL; skips discovery
    #[arg(short = 'u', long, env = "QUICKTALK_SERVER_URL")]
    server_url: Option<String>,

    /// Origin of the page the chat is embedded in
    #[arg(long, default_value = "http://localhost")]
    page_origin: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    let page = match PageContext::parse(&args.page_origin) {
        Ok(page) => page,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut options = TransportOptions::new(args.shop_id);
    options.customer_id = args.customer_id;
    options.server_url = args.server_url;
    options.page = page;

    // Run the client
    if let Err(e) = run_client(options).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
