//! # orc-adapters
//!
//! Backend adapters (spec §4.2): three translators from a native agent
//! CLI's event shape into the unified [`orc_proto::EventKind`] set —
//! hook-based, stream-based, and RPC-based — plus the subprocess plumbing
//! (`CliBackend`/`CliExecutor`, auto-detection) that the stream and RPC
//! adapters shell out through.

mod adapter;
mod auto_detect;
mod claude_stream;
mod cli_backend;
mod cli_executor;
mod hook;
mod rpc;
mod stream;
mod stream_handler;

pub use adapter::{with_retry, AdapterError, SequenceAllocator};
pub use auto_detect::{
    detect_backend, detect_backend_default, is_backend_available, NoBackendError, DEFAULT_PRIORITY,
};
pub use claude_stream::{
    AssistantMessage, ClaudeStreamEvent, ClaudeStreamParser, ContentBlock, Usage, UserContentBlock,
    UserMessage,
};
pub use cli_backend::{CliBackend, PromptMode};
pub use cli_executor::{CliExecutor, ExecutionResult};
pub use hook::{HookAdapter, PostToolUse, PreToolUse, SubagentStart, SubagentStop};
pub use rpc::{RpcAdapter, RpcFrame, RpcToolResult};
pub use stream::{ClaudeStreamAdapter, StreamAdapter, StreamPart, ToolPartState};
pub use stream_handler::{ConsoleStreamHandler, QuietStreamHandler, SessionResult, StreamHandler};
