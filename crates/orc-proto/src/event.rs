//! The unified Event Model (C1): a closed set of lifecycle events that every
//! backend adapter normalizes onto, and that the Session Controller and
//! Sub-Agent Tracker consume exhaustively.
//!
//! Per spec: events are monotonic per session by `sequence`, assigned by the
//! adapter. An adapter must never drop an event; if a backend elides one
//! (e.g. `subagent.start` never fires for a fast synchronous task) the
//! Sub-Agent Tracker — not the adapter — synthesizes the missing transition.

use crate::ids::{AgentId, SessionId, ToolCallId};
use serde::{Deserialize, Serialize};

/// How a Task-tool invocation was spawned. Drives the background/async
/// "premature completion" handling in the Sub-Agent Tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    Sync,
    Background,
    Async,
}

impl ToolMode {
    /// `true` for the modes the tracker treats as "returns immediately, the
    /// sub-agent keeps running" (background/async).
    pub fn is_background(self) -> bool {
        matches!(self, ToolMode::Background | ToolMode::Async)
    }
}

/// Which backend variant produced this event. Carried on `session.start` so
/// downstream consumers (logging, the Session Store) can record provenance
/// without re-deriving it from the adapter that's long gone by the time a
/// session is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Hook,
    Stream,
    Rpc,
}

/// The closed set of unified lifecycle events (spec §4.1 / §6).
///
/// Internally tagged on `type` so the wire shape matches the mapping table
/// in the spec: `{"type": "tool.start", "sessionId": ..., "sequence": ..., ...}`
/// once wrapped in an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "session.start")]
    SessionStart {
        backend_kind: BackendKind,
        model: Option<String>,
    },

    #[serde(rename = "session.idle")]
    SessionIdle,

    #[serde(rename = "session.error")]
    SessionError { message: String, retryable: bool },

    #[serde(rename = "message.delta")]
    MessageDelta { text: String },

    #[serde(rename = "message.complete")]
    MessageComplete,

    #[serde(rename = "tool.start")]
    ToolStart {
        tool_call_id: ToolCallId,
        tool_name: String,
        tool_input: serde_json::Value,
        mode: ToolMode,
    },

    #[serde(rename = "tool.update")]
    ToolUpdate {
        tool_call_id: ToolCallId,
        partial_output: Option<String>,
    },

    #[serde(rename = "tool.complete")]
    ToolComplete {
        tool_call_id: ToolCallId,
        tool_result: serde_json::Value,
        success: bool,
    },

    #[serde(rename = "subagent.start")]
    SubagentStart {
        subagent_id: AgentId,
        /// Absent when the backend doesn't correlate the sub-agent back to
        /// its spawning tool call (adapter lag case, see §9 open question).
        task_tool_call_id: Option<ToolCallId>,
        subagent_type: Option<String>,
    },

    #[serde(rename = "subagent.update")]
    SubagentUpdate {
        subagent_id: AgentId,
        tool_use_count_delta: u32,
    },

    #[serde(rename = "subagent.complete")]
    SubagentComplete {
        subagent_id: AgentId,
        success: bool,
        result: Option<String>,
    },

    #[serde(rename = "permission.requested")]
    PermissionRequested { tool_name: String, message: String },

    #[serde(rename = "usage")]
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        cost_usd: Option<f64>,
    },
}

impl EventKind {
    /// The `type` discriminant as it appears on the wire, e.g. `"tool.start"`.
    /// Useful for logging and for the Session Store's append-only log lines
    /// without re-serializing the whole payload.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::SessionStart { .. } => "session.start",
            EventKind::SessionIdle => "session.idle",
            EventKind::SessionError { .. } => "session.error",
            EventKind::MessageDelta { .. } => "message.delta",
            EventKind::MessageComplete => "message.complete",
            EventKind::ToolStart { .. } => "tool.start",
            EventKind::ToolUpdate { .. } => "tool.update",
            EventKind::ToolComplete { .. } => "tool.complete",
            EventKind::SubagentStart { .. } => "subagent.start",
            EventKind::SubagentUpdate { .. } => "subagent.update",
            EventKind::SubagentComplete { .. } => "subagent.complete",
            EventKind::PermissionRequested { .. } => "permission.requested",
            EventKind::Usage { .. } => "usage",
        }
    }
}

/// One event on the wire: the type-specific [`EventKind`] plus the envelope
/// fields every event carries (spec §3: "Every event carries `type`,
/// `sessionId`, monotonic `sequence`, and a type-specific payload").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub session_id: SessionId,
    pub sequence: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(session_id: SessionId, sequence: u64, kind: EventKind) -> Self {
        Self {
            session_id,
            sequence,
            kind,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Assigns monotonically increasing `sequence` numbers to events for one
/// session. Each backend adapter owns exactly one of these per `Session`.
#[derive(Debug, Default)]
pub struct SequenceCounter(u64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(0)
    }

    /// Wraps `kind` into a fully-sequenced [`Event`] and advances the counter.
    pub fn next(&mut self, session_id: SessionId, kind: EventKind) -> Event {
        let sequence = self.0;
        self.0 += 1;
        Event::new(session_id, sequence, kind)
    }
}
