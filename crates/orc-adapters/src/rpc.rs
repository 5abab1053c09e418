//! RPC-based adapter (spec §4.2): backend speaks a framed RPC protocol
//! (length-prefixed JSON). Completion frames identify tools only by id, so
//! the adapter maintains a `toolCallId -> toolName` map populated on
//! `tool.start`. `subagent.failed` maps to `subagent.complete { success:
//! false }`.

use orc_proto::{AgentId, EventKind, ToolCallId, ToolMode};
use serde::Deserialize;
use std::collections::HashMap;

fn parse_mode(raw: Option<&str>) -> ToolMode {
    match raw {
        Some("background") => ToolMode::Background,
        Some("async") => ToolMode::Async,
        _ => ToolMode::Sync,
    }
}

/// One RPC frame, tagged on `method` per the RPC column of the
/// normalization table (`toolName`, `arguments`, `result.content`,
/// `toolCallId`, `agentName`).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method")]
pub enum RpcFrame {
    #[serde(rename = "tool.invoke")]
    ToolInvoke {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    #[serde(rename = "tool.result")]
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        result: RpcToolResult,
    },
    #[serde(rename = "subagent.spawned")]
    SubagentSpawned {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "agentName")]
        agent_name: Option<String>,
    },
    #[serde(rename = "subagent.completed")]
    SubagentCompleted {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(default)]
        summary: Option<String>,
    },
    #[serde(rename = "subagent.failed")]
    SubagentFailed {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcToolResult {
    pub content: serde_json::Value,
    #[serde(default = "default_true")]
    pub success: bool,
}

fn default_true() -> bool {
    true
}

/// Demultiplexes RPC frames into unified events, tracking `toolCallId ->
/// toolName` (unused by the unified model itself, but required internally
/// since `subagent.*` frames here key everything by `toolCallId` rather
/// than a separately minted agent id).
#[derive(Debug, Default)]
pub struct RpcAdapter {
    tool_names: HashMap<String, String>,
}

impl RpcAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, frame: &RpcFrame) -> EventKind {
        match frame {
            RpcFrame::ToolInvoke {
                tool_call_id,
                tool_name,
                arguments,
            } => {
                self.tool_names.insert(tool_call_id.clone(), tool_name.clone());
                let mode = parse_mode(arguments.get("mode").and_then(|v| v.as_str()));
                EventKind::ToolStart {
                    tool_call_id: ToolCallId::new(tool_call_id.clone()),
                    tool_name: tool_name.clone(),
                    tool_input: arguments.clone(),
                    mode,
                }
            }
            RpcFrame::ToolResult { tool_call_id, result } => EventKind::ToolComplete {
                tool_call_id: ToolCallId::new(tool_call_id.clone()),
                tool_result: result.content.clone(),
                success: result.success,
            },
            RpcFrame::SubagentSpawned {
                tool_call_id,
                agent_name,
            } => EventKind::SubagentStart {
                subagent_id: AgentId::new(tool_call_id.clone()),
                task_tool_call_id: Some(ToolCallId::new(tool_call_id.clone())),
                subagent_type: agent_name.clone(),
            },
            RpcFrame::SubagentCompleted { tool_call_id, summary } => EventKind::SubagentComplete {
                subagent_id: AgentId::new(tool_call_id.clone()),
                success: true,
                result: summary.clone(),
            },
            RpcFrame::SubagentFailed { tool_call_id, error } => EventKind::SubagentComplete {
                subagent_id: AgentId::new(tool_call_id.clone()),
                success: false,
                result: error.clone(),
            },
        }
    }

    /// The tool name previously registered for `tool_call_id` via a
    /// `tool.invoke` frame, if any.
    pub fn tool_name(&self, tool_call_id: &str) -> Option<&str> {
        self.tool_names.get(tool_call_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(json: serde_json::Value) -> RpcFrame {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn tool_invoke_registers_name_and_emits_tool_start() {
        let mut adapter = RpcAdapter::new();
        let f = frame(serde_json::json!({
            "method": "tool.invoke", "toolCallId": "call_1", "toolName": "Bash", "arguments": {}
        }));
        let event = adapter.translate(&f);
        assert!(matches!(event, EventKind::ToolStart { .. }));
        assert_eq!(adapter.tool_name("call_1"), Some("Bash"));
    }

    #[test]
    fn tool_result_maps_to_tool_complete() {
        let mut adapter = RpcAdapter::new();
        let f = frame(serde_json::json!({
            "method": "tool.result", "toolCallId": "call_1",
            "result": {"content": "done", "success": true}
        }));
        let event = adapter.translate(&f);
        assert!(matches!(event, EventKind::ToolComplete { success: true, .. }));
    }

    #[test]
    fn subagent_failed_maps_to_subagent_complete_with_success_false() {
        let mut adapter = RpcAdapter::new();
        let f = frame(serde_json::json!({
            "method": "subagent.failed", "toolCallId": "call_2", "error": "crashed"
        }));
        let event = adapter.translate(&f);
        let EventKind::SubagentComplete { success, result, .. } = event else {
            panic!("expected SubagentComplete");
        };
        assert!(!success);
        assert_eq!(result.as_deref(), Some("crashed"));
    }
}
