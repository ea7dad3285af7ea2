//! Customer socket transport: lifecycle machine, inbound filtering and the
//! [`ClientTransport`] that ties them to a live socket.

mod client;
mod inbound;
mod machine;

pub use client::{
    ClientTransport, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_BASE, TransportEvent, TransportFailure, TransportOptions, UploadedFile,
    generate_customer_id,
};
pub use inbound::{ChatMessage, Inbound, InboundContext, decode_frame};
pub use machine::{Action, ConnectionMachine, ConnectionState, LifecycleEvent, NORMAL_CLOSURE};
