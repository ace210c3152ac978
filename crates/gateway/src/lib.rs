//! HTTP/WebSocket gateway for the charla engine.
//!
//! Exposes the operator surface: session lifecycle over REST, QR retrieval,
//! and a WebSocket push stream for session events. All engine semantics live
//! in the inner crates; this one only wires them to the network.

pub mod config;
pub mod push;
pub mod server;

pub use {
    config::CharlaConfig,
    push::BroadcastEventSink,
    server::{AppState, build_app},
};
