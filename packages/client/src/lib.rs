//! QuickTalk customer client.
//!
//! - `config_resolver`: finds a reachable server through `/api/config`
//! - `transport`: the customer socket with reconnect and echo suppression
//! - `runner`: the interactive CLI built on the transport

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config_resolver;
pub mod error;
pub mod formatter;
pub mod page;
pub mod runner;
pub mod transport;
pub mod url_adapter;

mod ui;

pub use config_resolver::{ConfigResolver, ServerConfig};
pub use error::ClientError;
pub use page::PageContext;
pub use runner::run_client;
pub use transport::{ClientTransport, TransportEvent, TransportOptions};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
