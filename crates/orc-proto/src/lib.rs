//! # orc-proto
//!
//! The unified Event Model (C1) shared across the orchestrator core: the
//! closed set of lifecycle events backend adapters normalize onto, the
//! opaque identifiers threaded through every other component, and the
//! single-observer event bus used to fan sequenced events out to listeners
//! (the Session Store's recorder, a UI, a test harness).

mod error;
mod event;
mod event_bus;
mod ids;

pub use error::{Error, Result};
pub use event::{BackendKind, Event, EventKind, SequenceCounter, ToolMode};
pub use event_bus::EventBus;
pub use ids::{AgentId, SessionId, ToolCallId};
