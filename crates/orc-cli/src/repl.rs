//! Interactive chat loop (spec §6 CLI surface). Reads lines from stdin,
//! routes `/command` and `@agent` lines through the [`CommandRegistry`], and
//! otherwise sends the line as a chat turn to the active backend.

use crate::bridge::CliSubAgentBridge;
use crate::builtins::register_builtins;
use orc_adapters::{CliBackend, CliExecutor};
use orc_core::command::{CommandContext, CommandRegistry, DispatchOutcome};
use orc_core::graph::{GraphState, NullSubAgentBridge, SubAgentBridge};
use orc_core::ralph::{build_ralph_graph, RalphWorkflowState};
use orc_core::session::SessionController;
use orc_core::store::{SessionStore, WorkflowSession, WorkflowStatus};
use orc_proto::{BackendKind, SessionId};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct Repl {
    session: SessionController,
    registry: CommandRegistry,
    store: SessionStore,
    backend: CliBackend,
    backend_name: String,
    workflow_active: bool,
    ralph_max_iterations: u32,
}

impl Repl {
    pub fn new(
        backend_name: String,
        backend: CliBackend,
        sessions_root: std::path::PathBuf,
        ralph_max_iterations: u32,
    ) -> Self {
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry);
        let session_id = SessionId::generate();
        let store = SessionStore::new(sessions_root);
        let now = chrono::Utc::now();
        let _ = store.write_workflow_session(
            &session_id,
            &WorkflowSession {
                session_id: session_id.as_str().to_string(),
                backend_kind: backend_name.clone(),
                workflow_name: None,
                session_dir: store.session_dir(&session_id),
                created_at: now,
                last_updated: now,
                status: WorkflowStatus::Running,
                node_history: Vec::new(),
                outputs: serde_json::Value::Null,
            },
        );
        Self {
            session: SessionController::new(session_id, BackendKind::Stream, "You are a helpful coding agent."),
            registry,
            store,
            backend,
            backend_name,
            workflow_active: false,
            ralph_max_iterations,
        }
    }

    /// Runs the chat loop to completion (EOF on stdin, or `/exit`).
    pub async fn run_interactive(&mut self) -> i32 {
        println!("Connected to backend: {}", self.backend_name);
        println!("Type /help for available commands.\n");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            let _ = std::io::stdout().flush();
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    eprintln!("input error: {err}");
                    return 2;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Some(exit_code) = self.handle_line(&line).await {
                return exit_code;
            }
        }
        0
    }

    /// Handles one line of input. Returns `Some(code)` when the session
    /// should end.
    async fn handle_line(&mut self, line: &str) -> Option<i32> {
        let trimmed = line.trim();
        if trimmed.starts_with('/') || trimmed.starts_with('@') {
            let mut ctx = CommandContext::new(&mut self.session, self.workflow_active);
            let outcome = self.registry.dispatch(trimmed, &mut ctx);
            let queued = ctx.queued_messages().to_vec();
            drop(ctx);
            for message in queued {
                println!("{message}");
            }
            return self.handle_dispatch_outcome(outcome).await;
        }

        self.send_chat_turn(trimmed).await;
        None
    }

    async fn handle_dispatch_outcome(&mut self, outcome: DispatchOutcome) -> Option<i32> {
        match outcome {
            DispatchOutcome::Command(result) => {
                if let Some(message) = &result.message {
                    println!("{message}");
                }
                if let Some(update) = result.state_update.clone()
                    && update.get("start_workflow").and_then(|v| v.as_str()) == Some("ralph")
                {
                    let prompt = update.get("prompt").and_then(|v| v.as_str()).unwrap_or_default();
                    self.run_ralph_workflow(prompt).await;
                }
                if result.destroy_session {
                    return Some(0);
                }
                None
            }
            DispatchOutcome::AgentMention => None,
            DispatchOutcome::UnknownCommand(name) => {
                println!("Unknown command: /{name}");
                None
            }
            DispatchOutcome::WorkflowAlreadyActive => {
                println!("A workflow is already running in this session.");
                None
            }
            DispatchOutcome::NotACommand => None,
        }
    }

    async fn send_chat_turn(&mut self, text: &str) {
        self.session.send(text);
        let executor = CliExecutor::new(self.backend.clone());
        match executor.execute_capture(text).await {
            Ok(result) if result.success => println!("{}", result.output.trim_end()),
            Ok(result) => eprintln!("[backend exited with {:?}]\n{}", result.exit_code, result.output.trim_end()),
            Err(err) => eprintln!("[backend error] {err}"),
        }
    }

    async fn run_ralph_workflow(&mut self, prompt: &str) {
        self.workflow_active = true;
        self.session.workflow_active = true;
        self.write_workflow_status(WorkflowStatus::Running, Some("ralph"), &[], serde_json::Value::Null);

        let graph = match build_ralph_graph(self.ralph_max_iterations) {
            Ok(graph) => graph,
            Err(err) => {
                eprintln!("failed to compile ralph workflow: {err}");
                self.write_workflow_status(WorkflowStatus::Failed, Some("ralph"), &[], serde_json::Value::Null);
                self.workflow_active = false;
                self.session.workflow_active = false;
                return;
            }
        };

        let mut initial_state = GraphState::new();
        initial_state.insert("user_request".to_string(), serde_json::json!(prompt));

        let bridge: Box<dyn SubAgentBridge> = if orc_adapters::is_backend_available(&self.backend.command) {
            Box::new(CliSubAgentBridge::new(self.backend.clone()))
        } else {
            Box::new(NullSubAgentBridge)
        };

        let run_id = format!("ralph-{}", chrono::Utc::now().timestamp_millis());
        match graph.run(initial_state, bridge.as_ref(), None, &run_id).await {
            Ok(steps) => {
                let node_history: Vec<String> = steps.iter().map(|s| s.node.clone()).collect();
                if let Some(last) = steps.last() {
                    let final_state = RalphWorkflowState::from_graph_state(&last.state);
                    let _ = self.store.write_tasks(&self.session.session_id, &final_state.tasks);
                    let outputs = serde_json::to_value(&last.state).unwrap_or(serde_json::Value::Null);
                    self.write_workflow_status(WorkflowStatus::Completed, Some("ralph"), &node_history, outputs);
                    println!(
                        "Ralph workflow finished after {} iteration(s); {} task(s) tracked.",
                        final_state.iteration,
                        final_state.tasks.len()
                    );
                } else {
                    self.write_workflow_status(
                        WorkflowStatus::Completed,
                        Some("ralph"),
                        &node_history,
                        serde_json::Value::Null,
                    );
                }
            }
            Err(err) => {
                eprintln!("ralph workflow failed: {err}");
                self.write_workflow_status(WorkflowStatus::Failed, Some("ralph"), &[], serde_json::Value::Null);
            }
        }

        self.workflow_active = false;
        self.session.workflow_active = false;
    }

    /// Updates `session.json`'s `WorkflowSession` record (spec §4.8):
    /// status, `nodeHistory`, and `outputs` from the most recent run.
    fn write_workflow_status(
        &self,
        status: WorkflowStatus,
        workflow_name: Option<&str>,
        node_history: &[String],
        outputs: serde_json::Value,
    ) {
        let session_id = &self.session.session_id;
        let previous = self.store.read_workflow_session(session_id).ok().flatten();
        let created_at = previous.as_ref().map_or_else(chrono::Utc::now, |s| s.created_at);
        let session = WorkflowSession {
            session_id: session_id.as_str().to_string(),
            backend_kind: self.backend_name.clone(),
            workflow_name: workflow_name.map(str::to_string),
            session_dir: self.store.session_dir(session_id),
            created_at,
            last_updated: chrono::Utc::now(),
            status,
            node_history: node_history.to_vec(),
            outputs,
        };
        let _ = self.store.write_workflow_session(session_id, &session);
    }
}
