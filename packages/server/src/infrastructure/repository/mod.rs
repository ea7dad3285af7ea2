//! Repository の実装

pub mod inmemory;
