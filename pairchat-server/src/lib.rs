//! pairchat server library.
//!
//! Exposes the server for use in tests and embedding. The server keeps one
//! durable chat session per pair of identities, an append-only message log
//! per session, and pushes each new message to its receiver over a live
//! WebSocket when one is registered.

pub mod api;
pub mod auth;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod journal;
pub mod presence;
pub mod server;
pub mod store;
