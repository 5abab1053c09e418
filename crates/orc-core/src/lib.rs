//! # orc-core
//!
//! Core orchestration engine for the Atomic terminal coding-agent
//! orchestrator: the unified event model's session/stream controller,
//! sub-agent tracker, command dispatcher, workflow graph engine, the Ralph
//! workflow built on top of it, and the on-disk session store.

pub mod command;
pub mod config;
pub mod graph;
pub mod ralph;
pub mod session;
pub mod store;
pub mod testing;
pub mod tracker;

pub use command::{
    CommandCategory, CommandContext, CommandDefinition, CommandHandler, CommandRegistry,
    CommandResult, DispatchOutcome,
};
pub use config::{AdapterSettings, ConfigError, ConfigWarning, OrchestratorConfig, RalphConfig, MAX_ITERATIONS_HARD_CAP};
pub use graph::{
    Checkpoint, Checkpointer, CompiledGraph, FileCheckpointer, GraphBuilder, GraphError,
    GraphResult, GraphState, MemoryCheckpointer, NodeContext, NodeKind, NodeOutput,
    NullSubAgentBridge, Reducer, RetryPolicy, SessionDirCheckpointer, StateSchema, StepResult,
    SubAgentBridge, END, START,
};
pub use ralph::{ReadyTask, RalphWorkflowState, Task, TaskOrigin, TaskStatus as RalphTaskStatus};
pub use session::{CancellationLevel, Message, Part, Role, SessionController, TaskItem, TaskStatus, ToolPartStatus};
pub use store::{SessionStore, StoreError, WorkflowSession, WorkflowStatus};
pub use testing::{list_fixtures, EventReplay, Scenario, ScenarioOutcome};
pub use tracker::{AgentRecord, AgentStatus, Tracker};
