//! Per-conversation message aggregation.
//!
//! Messaging users frequently spread one thought across several rapid
//! messages. The [`AggregationWindow`] buffers fragments per
//! (tenant, conversation) key and fires a single coalesced question once the
//! conversation has been quiet for the configured period, trading a fixed
//! latency for query coherence and fewer backend calls.

pub mod clean;
pub mod window;

pub use {
    clean::clean_text,
    window::{AggregationWindow, DEFAULT_QUIET_PERIOD, Dispatcher},
};
