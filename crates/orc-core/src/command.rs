//! Command Registry & Dispatcher (C5).
//!
//! Grounded in the teacher's `HatRegistry`: a flat, name-keyed registry with
//! idempotent registration, generalized from hat-topic routing to
//! slash-command / `@agent` mention routing (spec §4.5).

use crate::session::SessionController;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCategory {
    Builtin,
    Workflow,
    Skill,
    Agent,
    File,
    Folder,
}

/// Result of executing one command (spec §4.5 `CommandResult`).
#[derive(Debug, Clone, Default)]
pub struct CommandResult {
    pub success: bool,
    pub message: Option<String>,
    pub state_update: Option<serde_json::Value>,
    pub clear_messages: bool,
    pub destroy_session: bool,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_state_update(mut self, update: serde_json::Value) -> Self {
        self.state_update = Some(update);
        self
    }
}

/// Bridges UI/dispatch state to a handler (spec §4.5 `CommandContext`).
/// Surfaces the live session plus intent queues for actions the dispatcher
/// performs *after* the handler returns (sending messages, spawning
/// sub-agents) rather than the handler reaching into I/O directly.
pub struct CommandContext<'a> {
    pub session: &'a mut SessionController,
    pub workflow_active: bool,
    pub ralph_session_dir: Option<std::path::PathBuf>,
    pub ralph_session_id: Option<String>,
    pub ralph_task_ids: Vec<String>,
    messages_to_send: Vec<String>,
    silent_messages_to_send: Vec<String>,
    subagent_specs: Vec<String>,
}

impl<'a> CommandContext<'a> {
    pub fn new(session: &'a mut SessionController, workflow_active: bool) -> Self {
        Self {
            session,
            workflow_active,
            ralph_session_dir: None,
            ralph_session_id: None,
            ralph_task_ids: Vec::new(),
            messages_to_send: Vec::new(),
            silent_messages_to_send: Vec::new(),
            subagent_specs: Vec::new(),
        }
    }

    pub fn send_message(&mut self, text: impl Into<String>) {
        self.messages_to_send.push(text.into());
    }

    pub fn send_silent_message(&mut self, text: impl Into<String>) {
        self.silent_messages_to_send.push(text.into());
    }

    pub fn spawn_subagent(&mut self, instruction: impl Into<String>) {
        self.subagent_specs.push(instruction.into());
    }

    pub fn set_ralph_session_dir(&mut self, dir: std::path::PathBuf) {
        self.ralph_session_dir = Some(dir);
    }

    pub fn set_ralph_session_id(&mut self, id: impl Into<String>) {
        self.ralph_session_id = Some(id.into());
    }

    pub fn set_ralph_task_ids(&mut self, ids: Vec<String>) {
        self.ralph_task_ids = ids;
    }

    pub fn queued_messages(&self) -> &[String] {
        &self.messages_to_send
    }

    pub fn queued_subagent_specs(&self) -> &[String] {
        &self.subagent_specs
    }
}

pub type CommandHandler =
    Arc<dyn Fn(&[String], &mut CommandContext) -> CommandResult + Send + Sync>;

pub struct CommandDefinition {
    pub name: String,
    pub aliases: Vec<String>,
    pub category: CommandCategory,
    pub argument_hint: Option<String>,
    pub hidden: bool,
    pub handler: CommandHandler,
}

/// What kind of dispatch a raw input line resolved to.
pub enum DispatchOutcome {
    /// A `/name args...` line that resolved to a registered command.
    Command(CommandResult),
    /// An `@name args...` mention: dispatched silently, result not surfaced.
    AgentMention,
    /// `/name` did not resolve to any registered command or alias.
    UnknownCommand(String),
    /// A second workflow-class command while one is already active.
    WorkflowAlreadyActive,
    /// Not a command line at all (ordinary chat input).
    NotACommand,
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    by_name: HashMap<String, CommandDefinition>,
    alias_to_name: HashMap<String, String>,
}

impl std::fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent-by-name registration with category-aware override rules
    /// (spec §9): an existing `agent`-category binding may be replaced by a
    /// rediscovered `agent` entry; any other category collision is a no-op.
    pub fn register(&mut self, def: CommandDefinition) {
        if let Some(existing) = self.by_name.get(&def.name) {
            let both_agent =
                existing.category == CommandCategory::Agent && def.category == CommandCategory::Agent;
            if !both_agent {
                return;
            }
        }
        for alias in &def.aliases {
            self.alias_to_name.insert(alias.clone(), def.name.clone());
        }
        self.by_name.insert(def.name.clone(), def);
    }

    pub fn resolve(&self, name_or_alias: &str) -> Option<&CommandDefinition> {
        self.by_name
            .get(name_or_alias)
            .or_else(|| self.alias_to_name.get(name_or_alias).and_then(|n| self.by_name.get(n)))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Parses and dispatches one line of user input.
    pub fn dispatch(&self, line: &str, ctx: &mut CommandContext) -> DispatchOutcome {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix('/') {
            let (name, args) = split_name_and_args(rest);
            let Some(def) = self.resolve(&name) else {
                return DispatchOutcome::UnknownCommand(name);
            };
            if def.category == CommandCategory::Workflow && ctx.workflow_active {
                return DispatchOutcome::WorkflowAlreadyActive;
            }
            let result = (def.handler)(&args, ctx);
            DispatchOutcome::Command(result)
        } else if let Some(rest) = line.strip_prefix('@') {
            let (name, args) = split_name_and_args(rest);
            if let Some(def) = self
                .by_name
                .values()
                .find(|d| d.category == CommandCategory::Agent && d.name == name)
            {
                let _ = (def.handler)(&args, ctx);
            }
            DispatchOutcome::AgentMention
        } else {
            DispatchOutcome::NotACommand
        }
    }
}

/// Splits `"name arg1 \"quoted arg\""` into `(name, [args])`, honoring double
/// quotes so `/ralph "build the thing"` is one argument.
fn split_name_and_args(rest: &str) -> (String, Vec<String>) {
    let mut tokens = tokenize(rest);
    if tokens.is_empty() {
        return (String::new(), Vec::new());
    }
    let name = tokens.remove(0);
    (name, tokens)
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_current = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_current = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_current {
                    tokens.push(std::mem::take(&mut current));
                    has_current = false;
                }
            }
            c => {
                current.push(c);
                has_current = true;
            }
        }
    }
    if has_current {
        tokens.push(current);
    }
    tokens
}
