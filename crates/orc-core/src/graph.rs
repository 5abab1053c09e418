//! Graph Builder & Executor (C6).
//!
//! Grounded in the pack's Pregel-style `langgraph-core` (StateGraph /
//! CompiledGraph / reducer-based state channels), generalized here into a
//! declarative builder DSL over a flat JSON state (spec §4.6) with retry,
//! loop caps, and a pluggable [`Checkpointer`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const START: &str = "__start__";
pub const END: &str = "__end__";

pub type GraphState = HashMap<String, Value>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node '{0}' is not defined")]
    UnknownNode(String),
    #[error("node '{node}' failed after {attempts} attempt(s): {message}")]
    NodeFailed {
        node: String,
        attempts: u32,
        message: String,
    },
    #[error("node '{node}' exceeded the loop safety cap ({limit})")]
    LoopLimitExceeded { node: String, limit: u32 },
    #[error("merge node '{0}' was reached more than once for the same branch entry")]
    MergeNodeReachedTwice(String),
    #[error("checkpoint I/O error: {0}")]
    CheckpointIo(#[from] std::io::Error),
    #[error("checkpoint (de)serialization error: {0}")]
    CheckpointSerde(#[from] serde_json::Error),
    #[error("sub-agent bridge failed: {0}")]
    BridgeFailed(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// How two writes to the same state field combine (spec §4.6).
#[derive(Debug, Clone)]
pub enum Reducer {
    Replace,
    Concat,
    MergeById(String),
    Merge,
    Sum,
    Min,
    Max,
    And,
    Or,
}

impl Reducer {
    pub fn apply(&self, existing: Option<&Value>, incoming: Value) -> Value {
        let Some(existing) = existing else { return incoming };
        match self {
            Reducer::Replace => incoming,
            Reducer::Concat => {
                let mut base = existing.as_array().cloned().unwrap_or_default();
                base.extend(incoming.as_array().cloned().unwrap_or_else(|| vec![incoming]));
                Value::Array(base)
            }
            Reducer::MergeById(id_field) => {
                let mut base = existing.as_array().cloned().unwrap_or_default();
                let incoming_items = incoming.as_array().cloned().unwrap_or_else(|| vec![incoming]);
                for item in incoming_items {
                    let item_id = item.get(id_field).cloned();
                    if let Some(pos) = base
                        .iter()
                        .position(|existing_item| existing_item.get(id_field).cloned() == item_id)
                    {
                        base[pos] = item;
                    } else {
                        base.push(item);
                    }
                }
                Value::Array(base)
            }
            Reducer::Merge => {
                let mut base = existing.as_object().cloned().unwrap_or_default();
                if let Some(incoming_obj) = incoming.as_object() {
                    for (key, value) in incoming_obj {
                        base.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(base)
            }
            Reducer::Sum => {
                let a = existing.as_f64().unwrap_or(0.0);
                let b = incoming.as_f64().unwrap_or(0.0);
                serde_json::json!(a + b)
            }
            Reducer::Min => {
                let a = existing.as_f64().unwrap_or(f64::INFINITY);
                let b = incoming.as_f64().unwrap_or(f64::INFINITY);
                serde_json::json!(a.min(b))
            }
            Reducer::Max => {
                let a = existing.as_f64().unwrap_or(f64::NEG_INFINITY);
                let b = incoming.as_f64().unwrap_or(f64::NEG_INFINITY);
                serde_json::json!(a.max(b))
            }
            Reducer::And => serde_json::json!(existing.as_bool().unwrap_or(false) && incoming.as_bool().unwrap_or(false)),
            Reducer::Or => serde_json::json!(existing.as_bool().unwrap_or(false) || incoming.as_bool().unwrap_or(false)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    reducers: HashMap<String, Reducer>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reducer(mut self, field: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.insert(field.into(), reducer);
        self
    }

    pub fn merge(&self, state: &mut GraphState, patch: GraphState) {
        for (field, incoming) in patch {
            let reducer = self.reducers.get(&field).cloned().unwrap_or(Reducer::Replace);
            let existing = state.get(&field);
            let merged = reducer.apply(existing, incoming);
            state.insert(field, merged);
        }
    }
}

/// Result a node function returns: a partial state write plus an optional
/// explicit routing override (used by decision nodes).
pub struct NodeOutput {
    pub patch: GraphState,
    pub goto: Option<String>,
}

impl NodeOutput {
    pub fn patch(patch: GraphState) -> Self {
        Self { patch, goto: None }
    }

    pub fn route(patch: GraphState, goto: impl Into<String>) -> Self {
        Self {
            patch,
            goto: Some(goto.into()),
        }
    }
}

/// Spawns sub-agents on behalf of a compiled graph's agent/parallel nodes
/// (spec §4.6 "Sub-Agent Bridge"). Kept separate from the node function
/// signature so the bridge can be swapped for tests without threading a
/// live backend through every node closure.
#[async_trait]
pub trait SubAgentBridge: Send + Sync {
    async fn spawn(&self, instruction: &str) -> GraphResult<Value>;
    async fn spawn_parallel(&self, instructions: &[String]) -> GraphResult<Vec<Value>>;

    /// Spawns a single named sub-agent (e.g. Ralph's `"worker-<taskId>"` /
    /// `"worker"` pair). Defaults to a plain [`Self::spawn`] for bridges that
    /// don't need to tag the resulting sub-agent record.
    async fn spawn_as(&self, _agent_id: &str, _agent_name: &str, instruction: &str) -> GraphResult<Value> {
        self.spawn(instruction).await
    }
}

/// A bridge that performs no real spawning; used by tests and by any graph
/// that does not reach an agent/parallel node.
pub struct NullSubAgentBridge;

#[async_trait]
impl SubAgentBridge for NullSubAgentBridge {
    async fn spawn(&self, instruction: &str) -> GraphResult<Value> {
        Ok(serde_json::json!({ "instruction": instruction, "result": null }))
    }

    async fn spawn_parallel(&self, instructions: &[String]) -> GraphResult<Vec<Value>> {
        let mut results = Vec::with_capacity(instructions.len());
        for instruction in instructions {
            results.push(self.spawn(instruction).await?);
        }
        Ok(results)
    }
}

pub struct NodeContext<'a> {
    pub bridge: &'a dyn SubAgentBridge,
}

type NodeFn = Arc<dyn for<'a> Fn(GraphState, &'a NodeContext<'a>) -> BoxFuture<'a, GraphResult<NodeOutput>> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Agent,
    Tool,
    Decision,
    Wait,
    Parallel,
    LoopCheck,
}

/// Exponential-backoff retry policy applied around a node's execution
/// (spec §4.6 "per-node retry with exponential backoff").
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: std::time::Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: std::time::Duration::from_millis(0),
        }
    }
}

struct Node {
    kind: NodeKind,
    run: NodeFn,
    retry: RetryPolicy,
    /// For `Parallel` nodes: the branch node ids to fan out to, merged back
    /// into the node's own output.
    branches: Vec<String>,
}

enum Edge {
    Direct(String),
    Conditional {
        predicate: Arc<dyn Fn(&GraphState) -> bool + Send + Sync>,
        if_true: String,
        if_false: String,
    },
    Loop {
        predicate: Arc<dyn Fn(&GraphState) -> bool + Send + Sync>,
        body: String,
        after: String,
        limit: u32,
    },
}

/// A single checkpoint: the full state snapshot after some node ran.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Checkpoint {
    pub step: u64,
    pub node: String,
    pub state: GraphState,
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn save(&self, run_id: &str, checkpoint: &Checkpoint) -> GraphResult<()>;
    async fn latest(&self, run_id: &str) -> GraphResult<Option<Checkpoint>>;
}

#[derive(Default)]
pub struct MemoryCheckpointer {
    inner: std::sync::Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn save(&self, run_id: &str, checkpoint: &Checkpoint) -> GraphResult<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(run_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn latest(&self, run_id: &str) -> GraphResult<Option<Checkpoint>> {
        Ok(self.inner.lock().unwrap().get(run_id).cloned())
    }
}

/// One checkpoint file per run, overwritten atomically on each save
/// (tmp-then-rename, matching the Session Store's write discipline).
pub struct FileCheckpointer {
    dir: PathBuf,
}

impl FileCheckpointer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn save(&self, run_id: &str, checkpoint: &Checkpoint) -> GraphResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(run_id);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec_pretty(checkpoint)?)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    async fn latest(&self, run_id: &str) -> GraphResult<Option<Checkpoint>> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&contents)?))
    }
}

/// Stores checkpoints under a session's own directory
/// (`<sessions_root>/<sessionId>/checkpoints/<run_id>.json`), reusing
/// [`FileCheckpointer`]'s atomic write.
pub struct SessionDirCheckpointer {
    inner: FileCheckpointer,
}

impl SessionDirCheckpointer {
    pub fn new(session_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: FileCheckpointer::new(session_dir.into().join("checkpoints")),
        }
    }
}

#[async_trait]
impl Checkpointer for SessionDirCheckpointer {
    async fn save(&self, run_id: &str, checkpoint: &Checkpoint) -> GraphResult<()> {
        self.inner.save(run_id, checkpoint).await
    }

    async fn latest(&self, run_id: &str) -> GraphResult<Option<Checkpoint>> {
        self.inner.latest(run_id).await
    }
}

/// Declarative builder DSL (spec §4.6): `.start().then().if_()/.else_()
/// .endif().loop_().parallel().wait().catch().end().compile()`.
pub struct GraphBuilder {
    schema: StateSchema,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    cursor: Option<String>,
    /// Stack of open if/else blocks: (condition, true-branch entry,
    /// false-branch entry, merge node id).
    if_stack: Vec<IfFrame>,
    error_handler: Option<String>,
}

struct IfFrame {
    predicate: Arc<dyn Fn(&GraphState) -> bool + Send + Sync>,
    /// The node preceding the `if_`, where the conditional dispatch edge
    /// is installed.
    origin: String,
    then_head: Option<String>,
    else_head: Option<String>,
    merge_node: String,
}

impl GraphBuilder {
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            cursor: None,
            if_stack: Vec::new(),
            error_handler: None,
        }
    }

    fn insert_node<F>(&mut self, id: &str, kind: NodeKind, retry: RetryPolicy, branches: Vec<String>, run: F)
    where
        F: for<'a> Fn(GraphState, &'a NodeContext<'_>) -> BoxFuture<'a, GraphResult<NodeOutput>>
            + Send
            + Sync
            + 'static,
    {
        self.nodes.insert(
            id.to_string(),
            Node {
                kind,
                run: Arc::new(run),
                retry,
                branches,
            },
        );
    }

    /// Declares the entry node of the graph.
    pub fn start<F>(mut self, id: &str, run: F) -> Self
    where
        F: for<'a> Fn(GraphState, &'a NodeContext<'_>) -> BoxFuture<'a, GraphResult<NodeOutput>>
            + Send
            + Sync
            + 'static,
    {
        self.insert_node(id, NodeKind::Agent, RetryPolicy::default(), Vec::new(), run);
        self.edges.insert(START.to_string(), Edge::Direct(id.to_string()));
        self.cursor = Some(id.to_string());
        self
    }

    /// Chains a plain sequential node after the current cursor.
    pub fn then<F>(mut self, id: &str, kind: NodeKind, run: F) -> Self
    where
        F: for<'a> Fn(GraphState, &'a NodeContext<'_>) -> BoxFuture<'a, GraphResult<NodeOutput>>
            + Send
            + Sync
            + 'static,
    {
        self.insert_node(id, kind, RetryPolicy::default(), Vec::new(), run);
        if let Some(prev) = &self.cursor {
            self.edges.insert(prev.clone(), Edge::Direct(id.to_string()));
        }
        self.cursor = Some(id.to_string());
        self
    }

    /// Chains a sequential node with a non-default [`RetryPolicy`].
    pub fn then_with_retry<F>(mut self, id: &str, kind: NodeKind, retry: RetryPolicy, run: F) -> Self
    where
        F: for<'a> Fn(GraphState, &'a NodeContext<'_>) -> BoxFuture<'a, GraphResult<NodeOutput>>
            + Send
            + Sync
            + 'static,
    {
        self.insert_node(id, kind, retry, Vec::new(), run);
        if let Some(prev) = &self.cursor {
            self.edges.insert(prev.clone(), Edge::Direct(id.to_string()));
        }
        self.cursor = Some(id.to_string());
        self
    }

    /// Opens a conditional branch. `predicate` is evaluated against the
    /// state as it stands when the current node completes.
    pub fn if_<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&GraphState) -> bool + Send + Sync + 'static,
    {
        let merge_node = format!("__merge_{}__", self.nodes.len());
        let origin = self.cursor.clone().expect("if_ requires a preceding node");
        self.if_stack.push(IfFrame {
            predicate: Arc::new(predicate),
            origin,
            then_head: None,
            else_head: None,
            merge_node,
        });
        self
    }

    /// Adds the single node that is the "then" branch of the innermost
    /// open `if_`.
    pub fn then_branch<F>(mut self, id: &str, run: F) -> Self
    where
        F: for<'a> Fn(GraphState, &'a NodeContext<'_>) -> BoxFuture<'a, GraphResult<NodeOutput>>
            + Send
            + Sync
            + 'static,
    {
        self.insert_node(id, NodeKind::Agent, RetryPolicy::default(), Vec::new(), run);
        let frame = self.if_stack.last_mut().expect("then_branch requires an open if_");
        frame.then_head = Some(id.to_string());
        self
    }

    /// Adds the single node that is the "else" branch of the innermost
    /// open `if_`.
    pub fn else_<F>(mut self, id: &str, run: F) -> Self
    where
        F: for<'a> Fn(GraphState, &'a NodeContext<'_>) -> BoxFuture<'a, GraphResult<NodeOutput>>
            + Send
            + Sync
            + 'static,
    {
        self.insert_node(id, NodeKind::Agent, RetryPolicy::default(), Vec::new(), run);
        let frame = self.if_stack.last_mut().expect("else_ requires an open if_");
        frame.else_head = Some(id.to_string());
        self
    }

    /// Closes the innermost open `if_`/`else_`, wiring both branches to a
    /// single auto-generated merge node reached exactly once per branch.
    pub fn endif(mut self) -> Self {
        let frame = self.if_stack.pop().expect("endif without a matching if_");
        let if_true = frame.then_head.clone().expect("endif requires a then_branch");
        let if_false = frame.else_head.clone().unwrap_or_else(|| frame.merge_node.clone());

        self.edges.insert(
            frame.origin.clone(),
            Edge::Conditional {
                predicate: frame.predicate.clone(),
                if_true: if_true.clone(),
                if_false,
            },
        );

        self.insert_node(
            &frame.merge_node,
            NodeKind::Decision,
            RetryPolicy::default(),
            Vec::new(),
            |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }),
        );
        self.edges.insert(if_true, Edge::Direct(frame.merge_node.clone()));
        if let Some(else_head) = frame.else_head {
            self.edges.insert(else_head, Edge::Direct(frame.merge_node.clone()));
        }
        self.cursor = Some(frame.merge_node);
        self
    }

    /// Wires a bounded loop: re-enters `body` while `predicate` holds,
    /// falling through to whatever follows once it doesn't, or once `limit`
    /// iterations have run (spec §4.6 "loop safety caps").
    pub fn loop_until<P>(mut self, body: &str, predicate: P, limit: u32) -> Self
    where
        P: Fn(&GraphState) -> bool + Send + Sync + 'static,
    {
        let entry = self.cursor.clone().expect("loop_until requires a preceding node");
        let after = format!("__after_loop_{}__", self.nodes.len());
        self.edges.insert(
            entry,
            Edge::Loop {
                predicate: Arc::new(predicate),
                body: body.to_string(),
                after: after.clone(),
                limit,
            },
        );
        self.insert_node(
            &after,
            NodeKind::Decision,
            RetryPolicy::default(),
            Vec::new(),
            |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }),
        );
        self.cursor = Some(after);
        self
    }

    /// Fans out to `branch_ids` concurrently, joining back before
    /// continuing (spec §4.6 parallel node kind).
    pub fn parallel(mut self, id: &str, branch_ids: Vec<String>) -> Self {
        self.insert_node(
            id,
            NodeKind::Parallel,
            RetryPolicy::default(),
            branch_ids,
            |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }),
        );
        if let Some(prev) = &self.cursor {
            self.edges.insert(prev.clone(), Edge::Direct(id.to_string()));
        }
        self.cursor = Some(id.to_string());
        self
    }

    /// A human-in-the-loop wait point; the executor stops here and returns
    /// control until resumed with fresh state.
    pub fn wait(mut self, id: &str) -> Self {
        self.insert_node(
            id,
            NodeKind::Wait,
            RetryPolicy::default(),
            Vec::new(),
            |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }),
        );
        if let Some(prev) = &self.cursor {
            self.edges.insert(prev.clone(), Edge::Direct(id.to_string()));
        }
        self.cursor = Some(id.to_string());
        self
    }

    /// Registers the node jumped to when any node in the graph exhausts its
    /// retry budget.
    pub fn catch(mut self, handler_id: &str) -> Self {
        self.error_handler = Some(handler_id.to_string());
        self
    }

    /// Terminates the current branch at `__end__`.
    pub fn end(mut self) -> Self {
        if let Some(prev) = self.cursor.take() {
            self.edges.insert(prev, Edge::Direct(END.to_string()));
        }
        self
    }

    pub fn compile(self) -> GraphResult<CompiledGraph> {
        Ok(CompiledGraph {
            schema: self.schema,
            nodes: self.nodes,
            edges: self.edges,
            error_handler: self.error_handler,
        })
    }
}

#[derive(Debug)]
pub struct StepResult {
    pub node: String,
    pub state: GraphState,
}

pub struct CompiledGraph {
    schema: StateSchema,
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    error_handler: Option<String>,
}

impl CompiledGraph {
    /// Runs the graph to completion (or to a `Wait` node), returning every
    /// intermediate [`StepResult`] in execution order. BFS-scheduled in the
    /// sense that a `Parallel` node's branches all run within one step
    /// before the join continues.
    pub async fn run(
        &self,
        initial_state: GraphState,
        bridge: &dyn SubAgentBridge,
        checkpointer: Option<&dyn Checkpointer>,
        run_id: &str,
    ) -> GraphResult<Vec<StepResult>> {
        let ctx = NodeContext { bridge };
        let mut state = initial_state;
        let mut current = START.to_string();
        let mut steps = Vec::new();
        let mut visited_merge_nodes: HashSet<String> = HashSet::new();
        let mut loop_counts: HashMap<String, u32> = HashMap::new();
        let mut step_index: u64 = 0;

        loop {
            if current == END {
                break;
            }

            if current == START {
                current = match self.edges.get(&current) {
                    Some(Edge::Direct(next)) => next.clone(),
                    _ => return Err(GraphError::UnknownNode(current)),
                };
                continue;
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;

            if node.kind == NodeKind::Decision && current.starts_with("__merge_") {
                if !visited_merge_nodes.insert(current.clone()) {
                    return Err(GraphError::MergeNodeReachedTwice(current.clone()));
                }
            }

            let result = if node.kind == NodeKind::Parallel {
                self.run_parallel(node, &state, &ctx).await
            } else {
                self.run_with_retry(&current, node, state.clone(), &ctx).await
            };

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    if let Some(handler) = &self.error_handler {
                        current = handler.clone();
                        continue;
                    }
                    return Err(err);
                }
            };

            self.schema.merge(&mut state, output.patch);
            steps.push(StepResult {
                node: current.clone(),
                state: state.clone(),
            });

            if let Some(checkpointer) = checkpointer {
                checkpointer
                    .save(
                        run_id,
                        &Checkpoint {
                            step: step_index,
                            node: current.clone(),
                            state: state.clone(),
                        },
                    )
                    .await?;
            }
            step_index += 1;

            if node.kind == NodeKind::Wait {
                break;
            }

            current = if let Some(goto) = output.goto {
                goto
            } else {
                match self.edges.get(&current) {
                    Some(Edge::Direct(next)) => next.clone(),
                    Some(Edge::Conditional {
                        predicate,
                        if_true,
                        if_false,
                    }) => {
                        if predicate(&state) {
                            if_true.clone()
                        } else {
                            if_false.clone()
                        }
                    }
                    Some(Edge::Loop {
                        predicate,
                        body,
                        after,
                        limit,
                    }) => {
                        let count = loop_counts.entry(body.clone()).or_insert(0);
                        if predicate(&state) && *count < *limit {
                            *count += 1;
                            body.clone()
                        } else if predicate(&state) {
                            state.insert("maxIterationsReached".to_string(), Value::Bool(true));
                            after.clone()
                        } else {
                            after.clone()
                        }
                    }
                    None => END.to_string(),
                }
            };
        }

        Ok(steps)
    }

    async fn run_with_retry(
        &self,
        id: &str,
        node: &Node,
        state: GraphState,
        ctx: &NodeContext<'_>,
    ) -> GraphResult<NodeOutput> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match (node.run)(state.clone(), ctx).await {
                Ok(output) => return Ok(output),
                Err(err) if attempt < node.retry.max_attempts => {
                    let delay = node.retry.base_delay * 2u32.pow(attempt.saturating_sub(1));
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    tracing::warn!(node = id, attempt, error = %err, "node failed, retrying");
                }
                Err(err) => {
                    return Err(GraphError::NodeFailed {
                        node: id.to_string(),
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    async fn run_parallel(&self, node: &Node, state: &GraphState, ctx: &NodeContext<'_>) -> GraphResult<NodeOutput> {
        let futures = node.branches.iter().map(|branch_id| {
            let branch = self
                .nodes
                .get(branch_id)
                .ok_or_else(|| GraphError::UnknownNode(branch_id.clone()));
            async move {
                let branch = branch?;
                self.run_with_retry(branch_id, branch, state.clone(), ctx).await
            }
        });
        let results = futures::future::try_join_all(futures).await?;
        let mut patch = GraphState::new();
        for result in results {
            self.schema.merge(&mut patch, result.patch);
        }
        Ok(NodeOutput::patch(patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> (NullSubAgentBridge,) {
        (NullSubAgentBridge,)
    }

    #[tokio::test]
    async fn sequential_graph_runs_start_to_end() {
        let graph = GraphBuilder::new(StateSchema::new())
            .start("a", |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("visited".to_string(), serde_json::json!(["a"]));
                    Ok(NodeOutput::patch(state))
                })
            })
            .then("b", NodeKind::Agent, |mut state, _ctx| {
                Box::pin(async move {
                    let mut visited: Vec<String> = state
                        .get("visited")
                        .and_then(|v| serde_json::from_value(v.clone()).ok())
                        .unwrap_or_default();
                    visited.push("b".to_string());
                    state.insert("visited".to_string(), serde_json::json!(visited));
                    Ok(NodeOutput::patch(state))
                })
            })
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph
            .run(GraphState::new(), &bridge, None, "run-1")
            .await
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(
            steps.last().unwrap().state.get("visited").unwrap(),
            &serde_json::json!(["a", "b"])
        );
    }

    #[tokio::test]
    async fn conditional_branch_takes_the_predicate_true_path() {
        let graph = GraphBuilder::new(StateSchema::new())
            .start("check", |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("positive".to_string(), serde_json::json!(true));
                    Ok(NodeOutput::patch(state))
                })
            })
            .if_(|state| state.get("positive").and_then(Value::as_bool).unwrap_or(false))
            .then_branch("is_positive", |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("branch".to_string(), serde_json::json!("positive"));
                    Ok(NodeOutput::patch(state))
                })
            })
            .else_("is_negative", |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("branch".to_string(), serde_json::json!("negative"));
                    Ok(NodeOutput::patch(state))
                })
            })
            .endif()
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph
            .run(GraphState::new(), &bridge, None, "run-2")
            .await
            .unwrap();
        let last = steps.last().unwrap();
        assert_eq!(last.state.get("branch").unwrap(), &serde_json::json!("positive"));
    }

    #[tokio::test]
    async fn merge_node_is_reached_exactly_once_per_branch_entry() {
        let graph = GraphBuilder::new(StateSchema::new())
            .start("check", |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }))
            .if_(|_state| true)
            .then_branch("only_branch", |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }))
            .endif()
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph.run(GraphState::new(), &bridge, None, "run-3").await.unwrap();
        let merge_hits = steps.iter().filter(|s| s.node.starts_with("__merge_")).count();
        assert_eq!(merge_hits, 1);
    }

    #[tokio::test]
    async fn loop_runs_until_predicate_false_and_respects_cap() {
        let graph = GraphBuilder::new(StateSchema::new().with_reducer("count", Reducer::Replace))
            .start("seed", |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("count".to_string(), serde_json::json!(0));
                    Ok(NodeOutput::patch(state))
                })
            })
            .then("increment", NodeKind::Agent, |mut state, _ctx| {
                Box::pin(async move {
                    let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                    state.insert("count".to_string(), serde_json::json!(count + 1));
                    Ok(NodeOutput::patch(state))
                })
            })
            .loop_until(
                "increment",
                |state| state.get("count").and_then(Value::as_i64).unwrap_or(0) < 3,
                10,
            )
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph.run(GraphState::new(), &bridge, None, "run-4").await.unwrap();
        let last = steps.last().unwrap();
        assert_eq!(last.state.get("count").unwrap(), &serde_json::json!(3));
    }

    #[tokio::test]
    async fn loop_until_does_not_reclamp_a_caller_supplied_limit_above_twenty_five() {
        // A caller-bounded limit above the engine's old hardcoded default of
        // 25 must run to completion unclamped (the caller, e.g. Ralph's own
        // `MAX_ITERATIONS_HARD_CAP`, already bounded it).
        let graph = GraphBuilder::new(StateSchema::new().with_reducer("count", Reducer::Replace))
            .start("seed", |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("count".to_string(), serde_json::json!(0));
                    Ok(NodeOutput::patch(state))
                })
            })
            .then("increment", NodeKind::Agent, |mut state, _ctx| {
                Box::pin(async move {
                    let count = state.get("count").and_then(Value::as_i64).unwrap_or(0);
                    state.insert("count".to_string(), serde_json::json!(count + 1));
                    Ok(NodeOutput::patch(state))
                })
            })
            .loop_until(
                "increment",
                |state| state.get("count").and_then(Value::as_i64).unwrap_or(0) < 30,
                100,
            )
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph.run(GraphState::new(), &bridge, None, "run-deep-chain").await.unwrap();
        let last = steps.last().unwrap();
        assert_eq!(last.state.get("count").unwrap(), &serde_json::json!(30));
        assert!(!last.state.contains_key("maxIterationsReached"));
    }

    #[tokio::test]
    async fn loop_limit_exceeded_falls_through_and_flags_max_iterations_reached() {
        let graph = GraphBuilder::new(StateSchema::new())
            .start("seed", |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }))
            .then("spin", NodeKind::Agent, |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }))
            .loop_until("spin", |_state| true, 2)
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph.run(GraphState::new(), &bridge, None, "run-5").await.unwrap();
        let last = steps.last().unwrap();
        assert_eq!(last.state.get("maxIterationsReached"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn parallel_branches_join_before_continuing() {
        // Branch nodes are registered directly since `parallel` only wires
        // the join node itself.
        let mut builder = GraphBuilder::new(StateSchema::new().with_reducer("results", Reducer::Merge))
            .start("dispatch", |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }));
        builder.insert_node(
            "left",
            NodeKind::Agent,
            RetryPolicy::default(),
            Vec::new(),
            |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("results".to_string(), serde_json::json!({"left": true}));
                    Ok(NodeOutput::patch(state))
                })
            },
        );
        builder.insert_node(
            "right",
            NodeKind::Agent,
            RetryPolicy::default(),
            Vec::new(),
            |mut state, _ctx| {
                Box::pin(async move {
                    state.insert("results".to_string(), serde_json::json!({"right": true}));
                    Ok(NodeOutput::patch(state))
                })
            },
        );
        let graph = builder
            .parallel("fan_out", vec!["left".to_string(), "right".to_string()])
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph.run(GraphState::new(), &bridge, None, "run-6").await.unwrap();
        let last = steps.last().unwrap();
        assert_eq!(
            last.state.get("results").unwrap(),
            &serde_json::json!({"left": true, "right": true})
        );
    }

    #[tokio::test]
    async fn wait_node_halts_execution_for_resume() {
        let graph = GraphBuilder::new(StateSchema::new())
            .start("ask", |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }))
            .wait("approval")
            .then("resume", NodeKind::Agent, |state, _ctx| Box::pin(async move { Ok(NodeOutput::patch(state)) }))
            .end()
            .compile()
            .unwrap();

        let (bridge,) = ctx();
        let steps = graph.run(GraphState::new(), &bridge, None, "run-7").await.unwrap();
        assert_eq!(steps.last().unwrap().node, "approval");
    }

    #[tokio::test]
    async fn file_checkpointer_round_trips_latest_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path());
        let checkpoint = Checkpoint {
            step: 1,
            node: "n".to_string(),
            state: GraphState::from([("x".to_string(), serde_json::json!(1))]),
        };
        checkpointer.save("run", &checkpoint).await.unwrap();
        let loaded = checkpointer.latest("run").await.unwrap().unwrap();
        assert_eq!(loaded.node, "n");
    }

    #[test]
    fn reducers_combine_as_specified() {
        let mut state = GraphState::new();
        state.insert("tags".to_string(), serde_json::json!(["a"]));
        let merged = Reducer::Concat.apply(state.get("tags"), serde_json::json!(["b"]));
        assert_eq!(merged, serde_json::json!(["a", "b"]));

        let summed = Reducer::Sum.apply(Some(&serde_json::json!(2)), serde_json::json!(3));
        assert_eq!(summed, serde_json::json!(5.0));

        let items = serde_json::json!([{"id": "1", "v": "old"}]);
        let merged_by_id = Reducer::MergeById("id".to_string())
            .apply(Some(&items), serde_json::json!([{"id": "1", "v": "new"}, {"id": "2", "v": "new"}]));
        assert_eq!(
            merged_by_id,
            serde_json::json!([{"id": "1", "v": "new"}, {"id": "2", "v": "new"}])
        );
    }
}
