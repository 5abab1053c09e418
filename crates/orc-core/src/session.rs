//! Session & Stream Controller (C3).
//!
//! Owns one live conversation: message history, the streaming parts inside
//! it, the stream-generation staleness guard, and deferred-completion
//! coordination with the Sub-Agent Tracker (C4).

use orc_proto::{AgentId, BackendKind, Event, EventKind, SessionId, ToolCallId};
use std::collections::HashSet;

/// Who produced a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A Ralph task item (spec §3). Lives here because `TaskListPart` snapshots
/// it; the Ralph workflow (C7) is the sole writer of the authoritative copy.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TaskItem {
    pub id: String,
    pub content: String,
    pub status: TaskStatus,
    pub active_form: String,
    #[serde(default)]
    pub blocked_by: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl TaskStatus {
    /// Matches the ready-task resolver's notion of "done" for `blockedBy`
    /// checks (spec §4.7 accepts "completed"/"complete"/"done" loosely from
    /// free-form planner output, but our own enum only ever produces
    /// `Completed`).
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPartStatus {
    Pending,
    Running,
    Completed,
    Error,
}

/// One insertion-ordered element of a [`Message`].
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Tool {
        tool_call_id: ToolCallId,
        tool_name: String,
        status: ToolPartStatus,
        result: Option<serde_json::Value>,
    },
    Agent {
        agent_ids: Vec<AgentId>,
    },
    Hitl {
        question: String,
        response: Option<String>,
    },
    TaskList {
        tasks: Vec<TaskItem>,
    },
}

/// An ordered sequence of [`Part`]s attributed to one [`Role`].
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            parts: Vec::new(),
        }
    }

    /// Appends to the last [`Part::Text`] if the message is still streaming
    /// text, otherwise opens a new one.
    fn append_text(&mut self, text: &str) {
        if let Some(Part::Text(existing)) = self.parts.last_mut() {
            existing.push_str(text);
        } else {
            self.parts.push(Part::Text(text.to_string()));
        }
    }

    fn tool_part_mut(&mut self, id: &ToolCallId) -> Option<&mut Part> {
        self.parts.iter_mut().find(|part| {
            matches!(part, Part::Tool { tool_call_id, .. } if tool_call_id == id)
        })
    }

    fn agent_part_mut(&mut self) -> &mut Part {
        let has_agent_part = self.parts.iter().any(|p| matches!(p, Part::Agent { .. }));
        if !has_agent_part {
            self.parts.push(Part::Agent {
                agent_ids: Vec::new(),
            });
        }
        self.parts
            .iter_mut()
            .rev()
            .find(|p| matches!(p, Part::Agent { .. }))
            .expect("just ensured an Agent part exists")
    }
}

/// A callback captured at `send()` time, fired exactly once when the
/// foreground-active set drains to empty for the generation it was
/// registered under (spec §4.3, §9 "explicit completion-token object").
pub struct PendingCompletion {
    generation: u64,
    callback: Box<dyn FnOnce(bool) + Send>,
}

/// Owns one live conversation (spec §3 Session, §4.3 Session & Stream
/// Controller).
pub struct SessionController {
    pub session_id: SessionId,
    pub backend_kind: BackendKind,
    pub system_prompt: String,
    pub model: Option<String>,
    pub message_history: Vec<Message>,
    pub active_stream_generation: u64,
    pending_completion: Option<PendingCompletion>,
    /// Tool calls started but not yet completed, for this session's current
    /// turn. Used to decide when the foreground-active set is empty.
    active_tool_calls: HashSet<ToolCallId>,
    /// Tool calls started in background mode, tracked only to correlate a
    /// later `subagent.start` back to its spawning call (spec §4.4).
    background_tool_calls: HashSet<ToolCallId>,
    /// Non-background sub-agents started but not yet completed.
    active_foreground_agents: HashSet<AgentId>,
    pub workflow_active: bool,
    interrupted_once: bool,
}

impl SessionController {
    pub fn new(session_id: SessionId, backend_kind: BackendKind, system_prompt: impl Into<String>) -> Self {
        Self {
            session_id,
            backend_kind,
            system_prompt: system_prompt.into(),
            model: None,
            message_history: Vec::new(),
            active_stream_generation: 0,
            pending_completion: None,
            active_tool_calls: HashSet::new(),
            background_tool_calls: HashSet::new(),
            active_foreground_agents: HashSet::new(),
            workflow_active: false,
            interrupted_once: false,
        }
    }

    /// Starts a new turn: bumps the stream generation (stale-callback
    /// guard), appends the user message, resets per-turn interrupt state.
    pub fn send(&mut self, text: &str) -> u64 {
        self.active_stream_generation += 1;
        self.interrupted_once = false;
        let mut message = Message::new(Role::User);
        message.parts.push(Part::Text(text.to_string()));
        self.message_history.push(message);
        self.message_history.push(Message::new(Role::Assistant));
        self.active_stream_generation
    }

    /// Registers a deferred completion for the *current* generation. If one
    /// is already pending for this generation it is replaced (only the
    /// latest matters — spec invariant 7: "exactly one `pendingCompletion`
    /// fires per `activeStreamGeneration`").
    pub fn set_pending_completion<F>(&mut self, callback: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        self.pending_completion = Some(PendingCompletion {
            generation: self.active_stream_generation,
            callback: Box::new(callback),
        });
    }

    fn foreground_active(&self) -> bool {
        !self.active_tool_calls.is_empty() || !self.active_foreground_agents.is_empty()
    }

    fn maybe_fire_pending_completion(&mut self) {
        if self.foreground_active() {
            return;
        }
        if let Some(pending) = self.pending_completion.take() {
            if pending.generation == self.active_stream_generation {
                (pending.callback)(self.interrupted_once);
            }
            // Stale generation: silently dropped per the stream-generation guard.
        }
    }

    /// Applies a unified [`Event`] to message history and active-set
    /// bookkeeping, firing the deferred completion if it becomes runnable.
    pub fn apply_event(&mut self, event: &Event) {
        let Some(current) = self.message_history.last_mut() else {
            return;
        };

        match &event.kind {
            EventKind::MessageDelta { text } => current.append_text(text),
            EventKind::MessageComplete | EventKind::SessionIdle => {
                self.maybe_fire_pending_completion();
            }
            EventKind::ToolStart {
                tool_call_id,
                tool_name,
                mode,
                ..
            } => {
                if mode.is_background() {
                    self.background_tool_calls.insert(tool_call_id.clone());
                } else {
                    self.active_tool_calls.insert(tool_call_id.clone());
                }
                current.parts.push(Part::Tool {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: tool_name.clone(),
                    status: ToolPartStatus::Running,
                    result: None,
                });
            }
            EventKind::ToolComplete {
                tool_call_id,
                tool_result,
                success,
            } => {
                self.active_tool_calls.remove(tool_call_id);
                self.background_tool_calls.remove(tool_call_id);
                if let Some(Part::Tool { status, result, .. }) = current.tool_part_mut(tool_call_id)
                {
                    *status = if *success {
                        ToolPartStatus::Completed
                    } else {
                        ToolPartStatus::Error
                    };
                    *result = Some(tool_result.clone());
                }
                self.maybe_fire_pending_completion();
            }
            EventKind::SubagentStart {
                subagent_id,
                task_tool_call_id,
                ..
            } => {
                let is_background = task_tool_call_id
                    .as_ref()
                    .is_some_and(|id| self.background_tool_calls.contains(id));
                if !is_background {
                    self.active_foreground_agents.insert(subagent_id.clone());
                }
                if let Part::Agent { agent_ids } = current.agent_part_mut() {
                    if !agent_ids.contains(subagent_id) {
                        agent_ids.push(subagent_id.clone());
                    }
                }
            }
            EventKind::SubagentComplete { subagent_id, .. } => {
                self.active_foreground_agents.remove(subagent_id);
                self.maybe_fire_pending_completion();
            }
            EventKind::SessionError { .. }
            | EventKind::SessionStart { .. }
            | EventKind::SubagentUpdate { .. }
            | EventKind::ToolUpdate { .. }
            | EventKind::PermissionRequested { .. }
            | EventKind::Usage { .. } => {}
        }
    }

    /// First interrupt: marks the current stream result interrupted without
    /// tearing down the workflow. Second interrupt (while a workflow is
    /// active): escalates to `workflow_active = false` (spec §5).
    pub fn interrupt(&mut self) -> CancellationLevel {
        if !self.interrupted_once {
            self.interrupted_once = true;
            CancellationLevel::StreamInterrupted
        } else if self.workflow_active {
            self.workflow_active = false;
            CancellationLevel::WorkflowAborted
        } else {
            CancellationLevel::StreamInterrupted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationLevel {
    StreamInterrupted,
    WorkflowAborted,
}
