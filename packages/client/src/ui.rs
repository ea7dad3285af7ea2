//! UI utilities for the client.

use std::io::Write;

/// Redisplay the prompt after printing an incoming event
pub fn redisplay_prompt(customer_id: &str) {
    print!("{}> ", customer_id);
    std::io::stdout().flush().ok();
}
