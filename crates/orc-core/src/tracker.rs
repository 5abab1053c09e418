//! Sub-Agent Tracker (C4): the single-writer authority over the agent tree
//! (spec §4.4). The centerpiece, bug-prone algorithm here is
//! [`Tracker::merge_or_insert_agent`] — the eager-placeholder merge — kept
//! as its own dedicated function per spec §9 with unit tests for each of
//! the four cases the spec calls out by name.

use chrono::{DateTime, Utc};
use orc_proto::{AgentId, ToolCallId, ToolMode};
use std::collections::HashMap;

/// Status priority table (spec §4.4): higher wins on merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending = 0,
    Running = 1,
    Background = 2,
    Completed = 3,
    Interrupted = 4,
    Error = 5,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub task_tool_call_id: ToolCallId,
    pub display_name: String,
    pub task_description: String,
    pub status: AgentStatus,
    pub background: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub current_tool: Option<String>,
    pub tool_use_count: u32,
    pub result: Option<String>,
    pub parent_agent_id: Option<AgentId>,
}

/// Applies the status-priority table: the higher-priority status wins,
/// never regresses a record to a lower-priority one.
fn upgrade_status(current: AgentStatus, incoming: AgentStatus) -> AgentStatus {
    if incoming >= current {
        incoming
    } else {
        current
    }
}

#[derive(Debug, Default)]
pub struct Tracker {
    records: HashMap<AgentId, AgentRecord>,
    /// `taskToolCallId -> current AgentId` — the dedup/merge index (spec §4.4).
    by_tool_call: HashMap<ToolCallId, AgentId>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentRecord> {
        self.records.get(agent_id)
    }

    pub fn by_task_tool_call(&self, tool_call_id: &ToolCallId) -> Option<&AgentRecord> {
        self.by_tool_call
            .get(tool_call_id)
            .and_then(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &AgentRecord> {
        self.records.values()
    }

    /// Spec §4.4 dedup rule 2: two records that never shared a
    /// `taskToolCallId` are still the same instance when `displayName`, a
    /// non-generic `taskDescription`, and `background` all match; anything
    /// short of that stays distinct.
    fn find_uncorrelated_duplicate(
        &self,
        display_name: &str,
        task_description: &str,
        background: bool,
    ) -> Option<AgentId> {
        if task_description.is_empty() {
            return None;
        }
        self.records
            .values()
            .find(|record| {
                record.display_name == display_name
                    && record.task_description == task_description
                    && record.background == background
            })
            .map(|record| record.agent_id.clone())
    }

    /// `tool.start` on a Task-tool invocation: inserts the eager placeholder
    /// whose `agentId` equals the `taskToolCallId` (spec §4.4). If an
    /// existing record already matches on `displayName`/`taskDescription`/
    /// `background` (the uncorrelated-dedup rule), folds this tool call into
    /// it instead of inserting a second record for the same sub-agent.
    pub fn on_tool_start(
        &mut self,
        tool_call_id: ToolCallId,
        display_name: impl Into<String>,
        task_description: impl Into<String>,
        mode: ToolMode,
    ) -> AgentId {
        let display_name = display_name.into();
        let task_description = task_description.into();
        let background = mode.is_background();

        if let Some(existing_id) =
            self.find_uncorrelated_duplicate(&display_name, &task_description, background)
        {
            self.by_tool_call.insert(tool_call_id, existing_id.clone());
            return existing_id;
        }

        let agent_id = AgentId::new(tool_call_id.as_str());
        let record = AgentRecord {
            agent_id: agent_id.clone(),
            task_tool_call_id: tool_call_id.clone(),
            display_name,
            task_description,
            status: if background {
                AgentStatus::Background
            } else {
                AgentStatus::Running
            },
            background,
            started_at: Utc::now(),
            duration_ms: None,
            current_tool: None,
            tool_use_count: 0,
            result: None,
            parent_agent_id: None,
        };
        self.by_tool_call.insert(tool_call_id, agent_id.clone());
        self.records.insert(agent_id.clone(), record);
        agent_id
    }

    /// `subagent.start`: merges with an existing placeholder or inserts a
    /// fresh record (spec §4.4 steps 1-3, and the §9 open question on
    /// adapter lag — we take the "insert a fresh record" branch the spec
    /// names as the source's actual behavior).
    pub fn merge_or_insert_agent(
        &mut self,
        task_tool_call_id: Option<ToolCallId>,
        incoming_agent_id: AgentId,
        subagent_type: Option<String>,
    ) -> AgentId {
        let existing_by_tool_call = task_tool_call_id
            .as_ref()
            .and_then(|id| self.by_tool_call.get(id).cloned());

        let Some(placeholder_id) = existing_by_tool_call else {
            // No prior tool.start correlated to this sub-agent: insert fresh.
            let record = AgentRecord {
                agent_id: incoming_agent_id.clone(),
                task_tool_call_id: task_tool_call_id
                    .clone()
                    .unwrap_or_else(|| ToolCallId::new(incoming_agent_id.as_str())),
                display_name: subagent_type.unwrap_or_else(|| "subagent".to_string()),
                task_description: String::new(),
                status: AgentStatus::Running,
                background: false,
                started_at: Utc::now(),
                duration_ms: None,
                current_tool: None,
                tool_use_count: 0,
                result: None,
                parent_agent_id: None,
            };
            if let Some(tool_call_id) = task_tool_call_id {
                self.by_tool_call.insert(tool_call_id, incoming_agent_id.clone());
            }
            self.records.insert(incoming_agent_id.clone(), record);
            return incoming_agent_id;
        };

        if placeholder_id == incoming_agent_id {
            // Backend assigned the same id the placeholder already used —
            // nothing to rename, just upgrade status.
            if let Some(record) = self.records.get_mut(&placeholder_id) {
                record.status = upgrade_status(record.status, AgentStatus::Running);
                if let Some(name) = subagent_type {
                    record.display_name = name;
                }
            }
            return placeholder_id;
        }

        // Rename placeholder -> real id, preserving background/started_at,
        // upgrading status per the priority table.
        let mut record = self
            .records
            .remove(&placeholder_id)
            .expect("by_tool_call index points at an existing record");
        record.agent_id = incoming_agent_id.clone();
        record.status = upgrade_status(record.status, AgentStatus::Running);
        if let Some(name) = subagent_type {
            record.display_name = name;
        }
        if let Some(tool_call_id) = task_tool_call_id {
            self.by_tool_call.insert(tool_call_id, incoming_agent_id.clone());
        }
        self.records.insert(incoming_agent_id.clone(), record);
        incoming_agent_id
    }

    /// `tool.complete`: the premature-completion fix. A `background` record
    /// is never transitioned to `completed` here — only `subagent.complete`
    /// may move it out of `background` (spec §4.4 "critical").
    pub fn on_tool_complete(
        &mut self,
        tool_call_id: &ToolCallId,
        success: bool,
        result: Option<String>,
    ) {
        let Some(agent_id) = self.by_tool_call.get(tool_call_id).cloned() else {
            return;
        };
        let Some(record) = self.records.get_mut(&agent_id) else {
            return;
        };
        record.current_tool = None;
        if let Some(result) = result {
            record.result = Some(result);
        }
        if record.background {
            return;
        }
        record.status = upgrade_status(
            record.status,
            if success {
                AgentStatus::Completed
            } else {
                AgentStatus::Error
            },
        );
    }

    /// `subagent.complete`: the only event allowed to move a `background`
    /// record out of `background`.
    pub fn on_subagent_complete(&mut self, agent_id: &AgentId, success: bool, result: Option<String>) {
        let Some(record) = self.records.get_mut(agent_id) else {
            return;
        };
        record.status = upgrade_status(
            record.status,
            if success {
                AgentStatus::Completed
            } else {
                AgentStatus::Error
            },
        );
        if let Some(result) = result {
            record.result = Some(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_at_most_one_record_per_tool_call_id() {
        let mut tracker = Tracker::new();
        let tool_call_id = ToolCallId::new("call_1");
        tracker.on_tool_start(tool_call_id.clone(), "Task", "build the thing", ToolMode::Sync);
        tracker.merge_or_insert_agent(
            Some(tool_call_id.clone()),
            AgentId::new("real-agent-1"),
            Some("worker".to_string()),
        );
        assert_eq!(tracker.len(), 1);
        assert!(tracker.by_task_tool_call(&tool_call_id).is_some());
    }

    #[test]
    fn case_a_placeholder_before_real_id() {
        let mut tracker = Tracker::new();
        let tool_call_id = ToolCallId::new("call_1");
        let placeholder = tracker.on_tool_start(tool_call_id.clone(), "Task", "desc", ToolMode::Sync);
        assert_eq!(tracker.get(&placeholder).unwrap().status, AgentStatus::Running);

        let real_id = AgentId::new("agent-real");
        let merged =
            tracker.merge_or_insert_agent(Some(tool_call_id.clone()), real_id.clone(), None);

        assert_eq!(merged, real_id);
        assert!(tracker.get(&placeholder).is_none(), "placeholder renamed away");
        let record = tracker.get(&real_id).unwrap();
        assert_eq!(record.task_tool_call_id, tool_call_id);
    }

    #[test]
    fn case_b_real_id_without_placeholder() {
        let mut tracker = Tracker::new();
        let real_id = AgentId::new("agent-real");
        let merged = tracker.merge_or_insert_agent(None, real_id.clone(), Some("reviewer".into()));
        assert_eq!(merged, real_id);
        let record = tracker.get(&real_id).unwrap();
        assert_eq!(record.display_name, "reviewer");
        assert!(!record.background);
    }

    #[test]
    fn case_c_interleaved_status_updates_never_regress() {
        let mut tracker = Tracker::new();
        let tool_call_id = ToolCallId::new("call_1");
        tracker.on_tool_start(tool_call_id.clone(), "Task", "desc", ToolMode::Sync);
        let real_id = tracker.merge_or_insert_agent(Some(tool_call_id.clone()), AgentId::new("a1"), None);

        tracker.on_subagent_complete(&real_id, false, Some("boom".to_string()));
        assert_eq!(tracker.get(&real_id).unwrap().status, AgentStatus::Error);

        // A later, lower-priority update must not regress status.
        tracker.on_tool_complete(&tool_call_id, true, Some("ignored".to_string()));
        assert_eq!(tracker.get(&real_id).unwrap().status, AgentStatus::Error);
    }

    #[test]
    fn case_d_background_preserved_through_merge_and_tool_complete() {
        let mut tracker = Tracker::new();
        let tool_call_id = ToolCallId::new("call_bg");
        tracker.on_tool_start(tool_call_id.clone(), "Task", "desc", ToolMode::Background);
        assert_eq!(
            tracker.by_task_tool_call(&tool_call_id).unwrap().status,
            AgentStatus::Background
        );

        let real_id =
            tracker.merge_or_insert_agent(Some(tool_call_id.clone()), AgentId::new("a1"), None);
        // Merge upgrades against "running", but background(2) > running(1):
        // stays background.
        assert_eq!(tracker.get(&real_id).unwrap().status, AgentStatus::Background);
        assert!(tracker.get(&real_id).unwrap().background);

        // tool.complete must NOT transition a background record to completed.
        tracker.on_tool_complete(&tool_call_id, true, Some("tool finished".to_string()));
        let record = tracker.get(&real_id).unwrap();
        assert_eq!(record.status, AgentStatus::Background);
        assert_eq!(record.result.as_deref(), Some("tool finished"));

        // Only subagent.complete may move it out of background.
        tracker.on_subagent_complete(&real_id, true, Some("all done".to_string()));
        let record = tracker.get(&real_id).unwrap();
        assert_eq!(record.status, AgentStatus::Completed);
        assert_eq!(record.result.as_deref(), Some("all done"));
    }

    #[test]
    fn uncorrelated_tool_starts_with_matching_identity_are_merged() {
        let mut tracker = Tracker::new();
        let first_call = ToolCallId::new("call_1");
        let second_call = ToolCallId::new("call_2");

        let first = tracker.on_tool_start(first_call.clone(), "worker", "build the thing", ToolMode::Sync);
        let second = tracker.on_tool_start(second_call.clone(), "worker", "build the thing", ToolMode::Sync);

        assert_eq!(first, second, "matching displayName/taskDescription/background must merge");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.by_task_tool_call(&first_call).unwrap().agent_id, first);
        assert_eq!(tracker.by_task_tool_call(&second_call).unwrap().agent_id, first);
    }

    #[test]
    fn uncorrelated_tool_starts_with_a_generic_empty_description_stay_distinct() {
        let mut tracker = Tracker::new();
        tracker.on_tool_start(ToolCallId::new("call_1"), "worker", "", ToolMode::Sync);
        tracker.on_tool_start(ToolCallId::new("call_2"), "worker", "", ToolMode::Sync);
        assert_eq!(tracker.len(), 2, "empty taskDescription is generic, must not dedup");
    }

    #[test]
    fn uncorrelated_tool_starts_differing_in_background_stay_distinct() {
        let mut tracker = Tracker::new();
        tracker.on_tool_start(ToolCallId::new("call_1"), "worker", "build the thing", ToolMode::Sync);
        tracker.on_tool_start(ToolCallId::new("call_2"), "worker", "build the thing", ToolMode::Background);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn status_priority_ordering_matches_spec_table() {
        assert!(AgentStatus::Error > AgentStatus::Interrupted);
        assert!(AgentStatus::Interrupted > AgentStatus::Completed);
        assert!(AgentStatus::Completed > AgentStatus::Background);
        assert!(AgentStatus::Background > AgentStatus::Running);
        assert!(AgentStatus::Running > AgentStatus::Pending);
    }
}
