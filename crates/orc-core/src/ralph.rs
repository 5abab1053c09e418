//! Ralph Workflow (C7): planner -> parse-tasks -> worker loop (select-ready
//! tasks + worker) -> reviewer -> conditional fixer, compiled on top of the
//! Graph Builder & Executor (C6).
//!
//! Grounded in the teacher's `EventLoop`/`LoopState` (termination/safety-cap
//! logic) and `EventParser` (tag/fence extraction style, generalized here
//! into JSON-or-fenced-code-or-regex task-list parsing).

use crate::config::MAX_ITERATIONS_HARD_CAP;
use crate::graph::{
    CompiledGraph, GraphBuilder, GraphResult, GraphState, NodeKind, NodeOutput, Reducer,
    StateSchema,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl TaskStatus {
    /// Parses the loose vocabulary planner/reviewer free-form output uses
    /// for "done" (spec §4.7: `completed`/`complete`/`done`, case-insensitive).
    fn parse_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" | "in-progress" | "inprogress" => Some(TaskStatus::InProgress),
            "completed" | "complete" | "done" => Some(TaskStatus::Completed),
            "error" | "failed" => Some(TaskStatus::Error),
            _ => None,
        }
    }

    fn is_done(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        TaskStatus::parse_loose(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized task status: {raw}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(alias = "content")]
    pub description: String,
    #[serde(default = "default_pending")]
    pub status: TaskStatus,
    #[serde(default, alias = "blockedBy")]
    pub blocked_by: Vec<String>,
}

fn default_pending() -> TaskStatus {
    TaskStatus::Pending
}

/// A task whose dependencies are all resolved and is ready to dispatch to a
/// worker (spec §4.7 "select-ready-tasks").
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyTask {
    pub id: String,
    pub description: String,
}

/// Whether an incoming `TodoWrite`-style update originated from Ralph's own
/// task list or a foreign (non-Ralph) source (spec §9: conservative "any id
/// overlap -> Ralph-origin").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    Ralph,
    Foreign,
}

/// Normalizes a `blockedBy` id the way the readiness resolver compares it:
/// trimmed, lowercased, leading `#` stripped.
fn normalize_id(id: &str) -> String {
    id.trim().trim_start_matches('#').to_lowercase()
}

/// Resolves which tasks are ready to dispatch: `pending` or `in_progress`
/// tasks whose every `blockedBy` id resolves to a completed task (spec
/// §4.7 task-readiness rules).
pub fn select_ready_tasks(tasks: &[Task]) -> Vec<ReadyTask> {
    let completed_ids: HashSet<String> = tasks
        .iter()
        .filter(|t| t.status.is_done())
        .map(|t| normalize_id(&t.id))
        .collect();

    tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Pending))
        .filter(|t| {
            t.blocked_by
                .iter()
                .all(|dep| completed_ids.contains(&normalize_id(dep)))
        })
        .map(|t| ReadyTask {
            id: t.id.clone(),
            description: t.description.clone(),
        })
        .collect()
}

/// Any id overlap between the existing Ralph task list and an incoming
/// `TodoWrite` update means the update is Ralph's own (spec §9).
pub fn classify_todo_origin(existing_ids: &HashSet<String>, incoming_ids: &HashSet<String>) -> TaskOrigin {
    if existing_ids.intersection(incoming_ids).next().is_some() {
        TaskOrigin::Ralph
    } else {
        TaskOrigin::Foreign
    }
}

/// Extracts a task list from free-form planner/reviewer output: first a
/// fenced ` ```json ... ``` ` block, then the whole trimmed string as JSON,
/// then a `- [ ] description` / `- [x] description` bullet-list fallback.
pub fn parse_task_list(output: &str) -> Vec<Task> {
    if let Some(json) = extract_fenced_json(output) {
        if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(&json) {
            return tasks;
        }
    }
    if let Ok(tasks) = serde_json::from_str::<Vec<Task>>(output.trim()) {
        return tasks;
    }
    parse_bullet_list(output)
}

fn extract_fenced_json(output: &str) -> Option<String> {
    let start_marker = "```json";
    let start = output.find(start_marker)? + start_marker.len();
    let rest = &output[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn parse_bullet_list(output: &str) -> Vec<Task> {
    let mut tasks = Vec::new();
    for (index, line) in output.lines().enumerate() {
        let trimmed = line.trim_start();
        let (marker, rest) = if let Some(rest) = trimmed.strip_prefix("- [x]") {
            (TaskStatus::Completed, rest)
        } else if let Some(rest) = trimmed.strip_prefix("- [ ]") {
            (TaskStatus::Pending, rest)
        } else {
            continue;
        };
        let description = rest.trim().to_string();
        if description.is_empty() {
            continue;
        }
        tasks.push(Task {
            id: format!("t{index}"),
            description,
            status: marker,
            blocked_by: Vec::new(),
        });
    }
    tasks
}

/// One reviewer finding (spec §4.7 reviewer output: `{findings[], overall_correctness, ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub body: String,
}

/// Parsed reviewer output. Defaults to "patch is correct" with no findings
/// when the reviewer's output can't be parsed at all (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default = "default_correctness")]
    pub overall_correctness: String,
    #[serde(default)]
    pub overall_explanation: String,
    #[serde(default)]
    pub overall_confidence_score: Option<f64>,
}

fn default_correctness() -> String {
    "patch is correct".to_string()
}

impl Default for ReviewResult {
    fn default() -> Self {
        Self {
            findings: Vec::new(),
            overall_correctness: default_correctness(),
            overall_explanation: String::new(),
            overall_confidence_score: None,
        }
    }
}

/// Parses the reviewer's free-form output (spec §4.7): direct JSON parse,
/// then a fenced code block, then an embedded `{"findings": ...}` object;
/// unparseable output defaults to "patch is correct" with no findings.
/// Priority-3 findings are always filtered out (spec §8 scenario S5).
pub fn parse_review_result(output: &str) -> ReviewResult {
    let mut result = try_parse_review_json(output).unwrap_or_default();
    result.findings.retain(|f| f.priority != 3);
    result
}

fn try_parse_review_json(output: &str) -> Option<ReviewResult> {
    if let Ok(result) = serde_json::from_str::<ReviewResult>(output.trim()) {
        return Some(result);
    }
    if let Some(json) = extract_fenced_json(output) {
        if let Ok(result) = serde_json::from_str::<ReviewResult>(&json) {
            return Some(result);
        }
    }
    if let Some(json) = extract_embedded_object(output, "findings") {
        if let Ok(result) = serde_json::from_str::<ReviewResult>(&json) {
            return Some(result);
        }
    }
    None
}

/// Finds the smallest brace-balanced `{...}` substring containing `"key"`,
/// for reviewer output that wraps its JSON object in surrounding prose.
fn extract_embedded_object(output: &str, key: &str) -> Option<String> {
    let key_idx = output.find(&format!("\"{key}\""))?;
    let start = output[..key_idx].rfind('{')?;
    let mut depth = 0i32;
    for (offset, ch) in output[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(output[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Builds the worker's instruction by merging the task description, its
/// resolved blocking dependencies (with labels), and the set of tasks
/// already completed earlier in this run (spec §4.7 "worker" node).
fn build_worker_instruction(task: &Task, all_tasks: &[Task]) -> String {
    let mut instruction = format!("Task: {}\n", task.description);

    if !task.blocked_by.is_empty() {
        let deps: Vec<String> = task
            .blocked_by
            .iter()
            .filter_map(|dep_id| {
                let normalized = normalize_id(dep_id);
                all_tasks
                    .iter()
                    .find(|t| normalize_id(&t.id) == normalized)
                    .map(|t| format!("- {} ({})", t.id, t.description))
            })
            .collect();
        if !deps.is_empty() {
            instruction.push_str(&format!("Dependencies already completed:\n{}\n", deps.join("\n")));
        }
    }

    let completed: Vec<String> = all_tasks
        .iter()
        .filter(|t| t.id != task.id && t.status.is_done())
        .map(|t| t.description.clone())
        .collect();
    if !completed.is_empty() {
        instruction.push_str(&format!(
            "Already completed earlier in this run:\n{}\n",
            completed.join("\n")
        ));
    }

    instruction
}

/// Builds the fixer's instruction from the reviewer's findings, sorted by
/// priority ascending (P0 before P1 before P2 — spec §4.7 conditional fixer).
fn build_fix_instruction(findings: &[Finding]) -> String {
    let mut sorted = findings.to_vec();
    sorted.sort_by_key(|f| f.priority);
    let mut instruction = String::from("Address the following review findings, highest priority first:\n");
    for finding in &sorted {
        instruction.push_str(&format!("- [P{}] {}\n", finding.priority, finding.body));
    }
    instruction
}

/// Reducer schema for the Ralph workflow's flat JSON state (spec §4.7):
/// `tasks` merges by id, `currentTasks` replaces wholesale each round,
/// `featureList` merges by description, `debugReports`/`completedFeatures`
/// concatenate.
pub fn ralph_state_schema() -> StateSchema {
    StateSchema::new()
        .with_reducer("tasks", Reducer::MergeById("id".to_string()))
        .with_reducer("current_tasks", Reducer::Replace)
        .with_reducer("feature_list", Reducer::MergeById("description".to_string()))
        .with_reducer("debug_reports", Reducer::Concat)
        .with_reducer("completed_features", Reducer::Concat)
        .with_reducer("iteration", Reducer::Sum)
}

/// Snapshot view of the Ralph workflow's graph state, for callers that want
/// a typed read instead of poking at [`GraphState`] directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RalphWorkflowState {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub current_tasks: Vec<ReadyTaskJson>,
    #[serde(default)]
    pub feature_list: Vec<serde_json::Value>,
    #[serde(default)]
    pub debug_reports: Vec<String>,
    #[serde(default)]
    pub completed_features: Vec<String>,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub review_passed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyTaskJson {
    pub id: String,
    pub description: String,
}

impl RalphWorkflowState {
    pub fn from_graph_state(state: &GraphState) -> Self {
        serde_json::from_value(serde_json::to_value(state).unwrap_or_default()).unwrap_or_default()
    }
}

/// Compiles the concrete Ralph graph: planner produces a task list, a parse
/// node turns it into `Task`s, a bounded worker loop dispatches ready tasks
/// through the Sub-Agent Bridge, a reviewer checks the result, and a
/// conditional fixer re-enters the worker loop when review fails (spec
/// §4.7). `max_iterations` is clamped to [`MAX_ITERATIONS_HARD_CAP`].
pub fn build_ralph_graph(max_iterations: u32) -> GraphResult<CompiledGraph> {
    let limit = max_iterations.min(MAX_ITERATIONS_HARD_CAP);

    GraphBuilder::new(ralph_state_schema())
        .start("planner", |mut state, ctx| {
            Box::pin(async move {
                let user_request = state
                    .get("user_request")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let instruction = format!(
                    "Decompose the following request into a JSON array of tasks, each \
                     `{{\"id\", \"content\", \"status\", \"activeForm\", \"blockedBy\"?}}`, with no \
                     surrounding prose:\n\n{user_request}"
                );
                let result = ctx.bridge.spawn(&instruction).await?;
                state.insert("planner_output".to_string(), result);
                Ok(NodeOutput::patch(state))
            })
        })
        .then("parse_tasks", NodeKind::Tool, |mut state, _ctx| {
            Box::pin(async move {
                let output_text = state
                    .get("planner_output")
                    .and_then(|v| v.get("result"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let tasks = parse_task_list(&output_text);
                state.insert("tasks".to_string(), serde_json::to_value(&tasks).unwrap());
                Ok(NodeOutput::patch(state))
            })
        })
        .then("select-ready-tasks", NodeKind::Tool, |mut state, _ctx| {
            Box::pin(async move {
                let tasks: Vec<Task> = state
                    .get("tasks")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let ready = select_ready_tasks(&tasks);
                let current_tasks: Vec<ReadyTaskJson> = ready
                    .into_iter()
                    .map(|t| ReadyTaskJson {
                        id: t.id,
                        description: t.description,
                    })
                    .collect();
                state.insert(
                    "current_tasks".to_string(),
                    serde_json::to_value(&current_tasks).unwrap(),
                );
                Ok(NodeOutput::patch(state))
            })
        })
        .then("worker", NodeKind::Agent, |mut state, ctx| {
            Box::pin(async move {
                let tasks: Vec<Task> = state
                    .get("tasks")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let current_tasks: Vec<ReadyTaskJson> = state
                    .get("current_tasks")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();

                if let Some(first) = current_tasks.first() {
                    // Tolerates sub-agent failure without retry: a bridge
                    // error marks the current tasks as `error` rather than
                    // failing the node (spec §4.7 "worker").
                    let success = if let Some(task) = tasks.iter().find(|t| t.id == first.id) {
                        let instruction = build_worker_instruction(task, &tasks);
                        ctx.bridge
                            .spawn_as(&format!("worker-{}", first.id), "worker", &instruction)
                            .await
                            .is_ok()
                    } else {
                        false
                    };

                    let current_ids: HashSet<&str> = current_tasks.iter().map(|t| t.id.as_str()).collect();
                    let updated_status = if success { TaskStatus::Completed } else { TaskStatus::Error };
                    let updated_tasks: Vec<Task> = tasks
                        .into_iter()
                        .map(|mut t| {
                            if current_ids.contains(t.id.as_str()) {
                                t.status = updated_status;
                            }
                            t
                        })
                        .collect();
                    state.insert("tasks".to_string(), serde_json::to_value(&updated_tasks).unwrap());
                }

                let iteration = state.get("iteration").and_then(|v| v.as_u64()).unwrap_or(0);
                state.insert("iteration".to_string(), serde_json::json!(iteration + 1));
                Ok(NodeOutput::patch(state))
            })
        })
        .loop_until(
            "select-ready-tasks",
            |state| {
                let tasks: Vec<Task> = state
                    .get("tasks")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                !select_ready_tasks(&tasks).is_empty()
            },
            limit,
        )
        .then("reviewer", NodeKind::Agent, |mut state, ctx| {
            Box::pin(async move {
                let user_request = state
                    .get("user_request")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let tasks: Vec<Task> = state
                    .get("tasks")
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let completed: Vec<String> = tasks
                    .iter()
                    .filter(|t| t.status.is_done())
                    .map(|t| t.description.clone())
                    .collect();
                let instruction = format!(
                    "Review the following completed work for correctness. Respond with a JSON \
                     object `{{findings: [{{priority, body}}], overall_correctness, \
                     overall_explanation}}`.\n\nOriginal request: {user_request}\n\nCompleted \
                     tasks:\n{}",
                    completed.join("\n")
                );
                let review = ctx.bridge.spawn(&instruction).await?;
                let output_text = review.get("result").and_then(|v| v.as_str()).unwrap_or_default();
                let parsed = parse_review_result(output_text);
                let needs_fix = !parsed.findings.is_empty() && parsed.overall_correctness != "patch is correct";
                state.insert("review_result".to_string(), serde_json::to_value(&parsed).unwrap());
                state.insert("review_passed".to_string(), serde_json::json!(!needs_fix));
                Ok(NodeOutput::patch(state))
            })
        })
        .if_(|state| !state.get("review_passed").and_then(|v| v.as_bool()).unwrap_or(true))
        .then_branch("debugger", |mut state, ctx| {
            Box::pin(async move {
                let findings: Vec<Finding> = state
                    .get("review_result")
                    .and_then(|v| v.get("findings"))
                    .and_then(|v| serde_json::from_value(v.clone()).ok())
                    .unwrap_or_default();
                let instruction = build_fix_instruction(&findings);
                let fix = ctx.bridge.spawn(&instruction).await?;
                state.insert("fix_result".to_string(), fix);
                state.insert("fixes_applied".to_string(), serde_json::json!(true));
                Ok(NodeOutput::patch(state))
            })
        })
        .endif()
        .end()
        .compile()
}
