//! Shared types and error definitions used across all charla crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, Result},
    types::{
        ContentKind, ConvKey, ConversationInfo, Credentials, InboundMessage, SessionStatus,
    },
};
