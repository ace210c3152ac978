//! Dispatch pipeline — the glue between an elapsed aggregation window and
//! the downstream AI backend, plus the human-handoff escalation path.

pub mod backend;
pub mod pipeline;
pub mod replies;

pub use {
    backend::{Answer, AnswerBackend, HttpAnswerBackend},
    pipeline::{DispatchPipeline, OutboundLookup, request_human_handoff},
    replies::contains_handoff_trigger,
};
