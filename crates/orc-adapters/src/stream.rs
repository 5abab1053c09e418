//! Stream-based adapter (spec §4.2): demultiplexes a heterogeneous stream
//! of "parts" into unified events, tracking the innermost open sub-agent id
//! so orphan tool parts (not explicitly tagged with their owning agent) are
//! attributed correctly.

use crate::claude_stream::{ClaudeStreamEvent, ClaudeStreamParser, ContentBlock, UserContentBlock};
use orc_proto::{AgentId, BackendKind, EventKind, ToolCallId, ToolMode};
use serde::Deserialize;

fn parse_mode(raw: Option<&str>) -> ToolMode {
    match raw {
        Some("background") => ToolMode::Background,
        Some("async") => ToolMode::Async,
        _ => ToolMode::Sync,
    }
}

/// One generic "part" as the stream form of the normalization table
/// describes it: `part.type`, `part.tool`/`state.input`/`state.output` for
/// tool parts, `part.id`/`part.name` for agent parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StreamPart {
    #[serde(rename = "agent")]
    Agent { id: String, name: Option<String> },
    #[serde(rename = "step-finish")]
    StepFinish { id: String },
    #[serde(rename = "tool")]
    Tool {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        tool: String,
        state: ToolPartState,
    },
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolPartState {
    pub status: String,
    #[serde(default)]
    pub input: serde_json::Value,
    #[serde(default)]
    pub output: serde_json::Value,
}

/// Demultiplexes generic stream parts, attributing orphan tool events to
/// the innermost currently-open sub-agent (spec §4.2).
#[derive(Debug, Default)]
pub struct StreamAdapter {
    innermost_subagent: Option<AgentId>,
    /// Tool calls already seen as `running`, so a later `state.status` of
    /// anything else is reported as `tool.complete` rather than a second
    /// `tool.start`.
    started_tool_calls: std::collections::HashSet<String>,
}

impl StreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translates one part into zero-or-more unified events, in wire order.
    pub fn translate(&mut self, part: &StreamPart) -> Vec<EventKind> {
        match part {
            StreamPart::Agent { id, name } => {
                let subagent_id = AgentId::new(id.clone());
                self.innermost_subagent = Some(subagent_id.clone());
                vec![EventKind::SubagentStart {
                    subagent_id,
                    task_tool_call_id: None,
                    subagent_type: name.clone(),
                }]
            }
            StreamPart::StepFinish { id } => {
                let subagent_id = AgentId::new(id.clone());
                if self.innermost_subagent.as_ref() == Some(&subagent_id) {
                    self.innermost_subagent = None;
                }
                vec![EventKind::SubagentComplete {
                    subagent_id,
                    success: true,
                    result: None,
                }]
            }
            StreamPart::Tool {
                tool_call_id,
                tool,
                state,
            } => {
                let mode = parse_mode(state.input.get("mode").and_then(|v| v.as_str()));
                if self.started_tool_calls.insert(tool_call_id.clone()) {
                    vec![EventKind::ToolStart {
                        tool_call_id: ToolCallId::new(tool_call_id.clone()),
                        tool_name: tool.clone(),
                        tool_input: state.input.clone(),
                        mode,
                    }]
                } else {
                    self.started_tool_calls.remove(tool_call_id);
                    vec![EventKind::ToolComplete {
                        tool_call_id: ToolCallId::new(tool_call_id.clone()),
                        tool_result: state.output.clone(),
                        success: state.status != "error",
                    }]
                }
            }
            StreamPart::Text { text } => vec![EventKind::MessageDelta { text: text.clone() }],
        }
    }
}

/// Wraps [`ClaudeStreamParser`] to translate Claude's concrete
/// `--output-format stream-json` NDJSON into unified events. Claude never
/// emits an explicit `subagent.start`/`subagent.complete` pair for its
/// synchronous `Task` tool calls — this is the adapter-elided-event case
/// spec §4.1 calls out; the Sub-Agent Tracker synthesizes the transition
/// from the `tool.start`/`tool.complete` pair alone.
#[derive(Debug, Default)]
pub struct ClaudeStreamAdapter;

impl ClaudeStreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one NDJSON line, returning every unified event it produces in
    /// order. Malformed or unrecognized lines produce no events (logged at
    /// `debug!` inside [`ClaudeStreamParser`]).
    pub fn translate_line(&self, line: &str) -> Vec<EventKind> {
        let Some(event) = ClaudeStreamParser::parse_line(line) else {
            return Vec::new();
        };
        self.translate(event)
    }

    fn translate(&self, event: ClaudeStreamEvent) -> Vec<EventKind> {
        match event {
            ClaudeStreamEvent::System { model, .. } => vec![EventKind::SessionStart {
                backend_kind: BackendKind::Stream,
                model: Some(model),
            }],
            ClaudeStreamEvent::Assistant { message, usage } => {
                let mut events: Vec<EventKind> = message
                    .content
                    .into_iter()
                    .map(|block| match block {
                        ContentBlock::Text { text } => EventKind::MessageDelta { text },
                        ContentBlock::ToolUse { id, name, input } => {
                            let mode = parse_mode(input.get("mode").and_then(|v| v.as_str()));
                            EventKind::ToolStart {
                                tool_call_id: ToolCallId::new(id),
                                tool_name: name,
                                tool_input: input,
                                mode,
                            }
                        }
                    })
                    .collect();
                if let Some(usage) = usage {
                    events.push(EventKind::Usage {
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        cost_usd: None,
                    });
                }
                events
            }
            ClaudeStreamEvent::User { message } => message
                .content
                .into_iter()
                .map(|block| {
                    let UserContentBlock::ToolResult { tool_use_id, content } = block;
                    EventKind::ToolComplete {
                        tool_call_id: ToolCallId::new(tool_use_id),
                        tool_result: serde_json::Value::String(content),
                        success: true,
                    }
                })
                .collect(),
            ClaudeStreamEvent::Result {
                total_cost_usd,
                is_error,
                ..
            } => {
                if is_error {
                    vec![EventKind::SessionError {
                        message: "Claude session ended with an error".to_string(),
                        retryable: false,
                    }]
                } else {
                    vec![
                        EventKind::Usage {
                            input_tokens: 0,
                            output_tokens: 0,
                            cost_usd: Some(total_cost_usd),
                        },
                        EventKind::SessionIdle,
                    ]
                }
            }
        }
    }
}
