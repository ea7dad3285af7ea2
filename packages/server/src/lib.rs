//! QuickTalk chat server library.
//!
//! Session registry, rate limiter and request router for the customer chat
//! widget, plus the customer WebSocket endpoint.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
