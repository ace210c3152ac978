//! Messaging-transport capability for charla.
//!
//! The transport itself is an external collaborator: this crate exposes it as
//! a pair of traits ([`TransportClient`] for the per-tenant connection handle,
//! [`TransportFactory`] for opening one) plus the event vocabulary the session
//! router consumes. The [`bridge`] module implements both over a WebSocket
//! connection to an external transport sidecar process.

pub mod bridge;
pub mod client;
pub mod event;

pub use {
    bridge::BridgeTransportFactory,
    client::{EventStream, TransportClient, TransportFactory},
    event::{NullEventSink, SessionEvent, SessionEventSink, TransportEvent},
};
