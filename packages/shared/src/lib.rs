//! Code shared by the QuickTalk server and client.
//!
//! - `envelope`: the JSON frame exchanged over the customer WebSocket
//! - `logger`: tracing subscriber setup for the binaries
//! - `time`: clock abstraction used by every TTL and window computation
//! - `url`: scheme and host helpers for server addresses

pub mod envelope;
pub mod logger;
pub mod time;
pub mod url;
