//! Hook-based adapter (spec §4.2): a backend that exposes synchronous
//! pre/post tool and sub-agent hooks. Each hook callback repacks its native
//! payload into the matching unified [`EventKind`]:
//! `PreToolUse`→`tool.start`, `PostToolUse`→`tool.complete`,
//! `SubagentStart`→`subagent.start`, `SubagentStop`→`subagent.complete`.

use orc_proto::{AgentId, EventKind, ToolCallId, ToolMode};
use serde::Deserialize;

fn parse_mode(raw: Option<&str>) -> ToolMode {
    match raw {
        Some("background") => ToolMode::Background,
        Some("async") => ToolMode::Async,
        _ => ToolMode::Sync,
    }
}

/// `PreToolUse` payload, field names per the hook column of the
/// normalization table.
#[derive(Debug, Deserialize)]
pub struct PreToolUse {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: serde_json::Value,
}

/// `PostToolUse` payload.
#[derive(Debug, Deserialize)]
pub struct PostToolUse {
    pub tool_call_id: String,
    #[serde(default)]
    pub tool_response: serde_json::Value,
    #[serde(default = "default_true")]
    pub success: bool,
}

fn default_true() -> bool {
    true
}

/// `SubagentStart` payload.
#[derive(Debug, Deserialize)]
pub struct SubagentStart {
    pub agent_id: String,
    #[serde(default)]
    pub task_tool_call_id: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
}

/// `SubagentStop` payload.
#[derive(Debug, Deserialize)]
pub struct SubagentStop {
    pub agent_id: String,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub result: Option<String>,
}

/// Translates hook callbacks into unified [`EventKind`]s. Stateless: the
/// hook form already carries every id the unified event needs, unlike the
/// stream/rpc forms which must track context across calls.
#[derive(Debug, Default)]
pub struct HookAdapter;

impl HookAdapter {
    pub fn on_pre_tool_use(&self, payload: &PreToolUse) -> EventKind {
        let mode = parse_mode(payload.tool_input.get("mode").and_then(|v| v.as_str()));
        EventKind::ToolStart {
            tool_call_id: ToolCallId::new(payload.tool_call_id.clone()),
            tool_name: payload.tool_name.clone(),
            tool_input: payload.tool_input.clone(),
            mode,
        }
    }

    pub fn on_post_tool_use(&self, payload: &PostToolUse) -> EventKind {
        EventKind::ToolComplete {
            tool_call_id: ToolCallId::new(payload.tool_call_id.clone()),
            tool_result: payload.tool_response.clone(),
            success: payload.success,
        }
    }

    pub fn on_subagent_start(&self, payload: &SubagentStart) -> EventKind {
        EventKind::SubagentStart {
            subagent_id: AgentId::new(payload.agent_id.clone()),
            task_tool_call_id: payload.task_tool_call_id.clone().map(ToolCallId::new),
            subagent_type: payload.agent_type.clone(),
        }
    }

    pub fn on_subagent_stop(&self, payload: &SubagentStop) -> EventKind {
        EventKind::SubagentComplete {
            subagent_id: AgentId::new(payload.agent_id.clone()),
            success: payload.success,
            result: payload.result.clone(),
        }
    }
}
