//! Session Store (C8): the on-disk layout under
//! `<sessions_root>/<sessionId>/{session.json, tasks.json,
//! agents/<agentId>.json, checkpoints/, logs/}` (spec §4.8).
//!
//! Grounded in the teacher's `SessionRecorder`: JSONL append for the event
//! log, generalized here with an atomic tmp-then-rename write for the
//! structured snapshots (`session.json`, `tasks.json`, per-agent files)
//! that must never be read half-written.

use crate::ralph::Task;
use crate::tracker::AgentRecord;
use orc_proto::SessionId;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Lifecycle status of a [`WorkflowSession`] (spec §3 `WorkflowSession.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Paused,
    Completed,
    Failed,
}

/// `session.json`'s contents: `{ sessionId, workflowName, sessionDir,
/// createdAt, lastUpdated, status, nodeHistory, outputs }` (spec §3, §4.8).
/// One record per chat session; `workflow_name`/`node_history`/`outputs`
/// stay empty until a `/ralph` run starts, then carry that run's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub session_id: String,
    pub backend_kind: String,
    pub workflow_name: Option<String>,
    pub session_dir: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub node_history: Vec<String>,
    #[serde(default)]
    pub outputs: serde_json::Value,
}

pub struct SessionStore {
    sessions_root: PathBuf,
}

impl SessionStore {
    pub fn new(sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
        }
    }

    pub fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.sessions_root.join(session_id.as_str())
    }

    fn agents_dir(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("agents")
    }

    pub fn checkpoints_dir(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("checkpoints")
    }

    fn logs_dir(&self, session_id: &SessionId) -> PathBuf {
        self.session_dir(session_id).join("logs")
    }

    /// Idempotently creates the full directory skeleton for a session.
    pub fn ensure_session_dir(&self, session_id: &SessionId) -> Result<(), StoreError> {
        for dir in [
            self.session_dir(session_id),
            self.agents_dir(session_id),
            self.checkpoints_dir(session_id),
            self.logs_dir(session_id),
        ] {
            std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        Ok(())
    }

    /// Writes `value` to `path` via a tmp file in the same directory,
    /// renamed into place, so a reader never observes a partial write.
    fn write_atomic<T: Serialize>(&self, path: &PathBuf, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serde {
            path: path.clone(),
            source,
        })?;
        {
            let mut file = std::fs::File::create(&tmp_path).map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            file.write_all(&bytes).map_err(|source| StoreError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        }
        std::fs::rename(&tmp_path, path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    fn read_optional<T: for<'de> Deserialize<'de>>(&self, path: &PathBuf) -> Result<Option<T>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde {
            path: path.clone(),
            source,
        })?;
        Ok(Some(value))
    }

    pub fn write_workflow_session(
        &self,
        session_id: &SessionId,
        session: &WorkflowSession,
    ) -> Result<(), StoreError> {
        self.ensure_session_dir(session_id)?;
        self.write_atomic(&self.session_dir(session_id).join("session.json"), session)
    }

    pub fn read_workflow_session(&self, session_id: &SessionId) -> Result<Option<WorkflowSession>, StoreError> {
        self.read_optional(&self.session_dir(session_id).join("session.json"))
    }

    /// `tasks.json` has exactly one writer at a time (the Ralph workflow);
    /// the store enforces nothing beyond atomicity here (spec §4.7).
    pub fn write_tasks(&self, session_id: &SessionId, tasks: &[Task]) -> Result<(), StoreError> {
        self.ensure_session_dir(session_id)?;
        self.write_atomic(&self.session_dir(session_id).join("tasks.json"), &tasks)
    }

    /// Absent `tasks.json` reads as an empty task list, not an error.
    pub fn read_tasks(&self, session_id: &SessionId) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .read_optional(&self.session_dir(session_id).join("tasks.json"))?
            .unwrap_or_default())
    }

    pub fn write_agent(&self, session_id: &SessionId, agent: &AgentRecord) -> Result<(), StoreError> {
        self.ensure_session_dir(session_id)?;
        let path = self.agents_dir(session_id).join(format!("{}.json", agent.agent_id.as_str()));
        self.write_atomic(&path, agent)
    }

    pub fn read_agent(&self, session_id: &SessionId, agent_id: &str) -> Result<Option<AgentRecord>, StoreError> {
        self.read_optional(&self.agents_dir(session_id).join(format!("{agent_id}.json")))
    }

    /// Appends one JSON line to `logs/events.jsonl`, matching the teacher's
    /// crash-resilient "write each record immediately" discipline.
    pub fn append_log(&self, session_id: &SessionId, record: &serde_json::Value) -> Result<(), StoreError> {
        self.ensure_session_dir(session_id)?;
        let path = self.logs_dir(session_id).join("events.jsonl");
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;
        let mut line = serde_json::to_vec(record).map_err(|source| StoreError::Serde {
            path: path.clone(),
            source,
        })?;
        line.push(b'\n');
        file.write_all(&line).map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ralph::TaskStatus;
    use crate::tracker::AgentStatus;
    use orc_proto::{AgentId, ToolCallId};

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn ensure_session_dir_creates_full_skeleton() {
        let (_dir, store) = store();
        let session_id = SessionId::new("s1");
        store.ensure_session_dir(&session_id).unwrap();
        assert!(store.session_dir(&session_id).is_dir());
        assert!(store.checkpoints_dir(&session_id).is_dir());
    }

    #[test]
    fn tasks_round_trip_through_atomic_write() {
        let (_dir, store) = store();
        let session_id = SessionId::new("s1");
        let tasks = vec![Task {
            id: "t1".to_string(),
            description: "do it".to_string(),
            status: TaskStatus::Pending,
            blocked_by: Vec::new(),
        }];
        store.write_tasks(&session_id, &tasks).unwrap();
        let loaded = store.read_tasks(&session_id).unwrap();
        assert_eq!(loaded, tasks);
    }

    #[test]
    fn reads_tolerate_absent_files() {
        let (_dir, store) = store();
        let session_id = SessionId::new("ghost");
        assert_eq!(store.read_tasks(&session_id).unwrap(), Vec::new());
        assert!(store.read_workflow_session(&session_id).unwrap().is_none());
        assert!(store.read_agent(&session_id, "a1").unwrap().is_none());
    }

    #[test]
    fn workflow_session_round_trips_status_and_node_history() {
        let (_dir, store) = store();
        let session_id = SessionId::new("s1");
        let now = chrono::Utc::now();
        let session = WorkflowSession {
            session_id: session_id.as_str().to_string(),
            backend_kind: "stream".to_string(),
            workflow_name: Some("ralph".to_string()),
            session_dir: store.session_dir(&session_id),
            created_at: now,
            last_updated: now,
            status: WorkflowStatus::Completed,
            node_history: vec!["planner".to_string(), "worker".to_string(), "reviewer".to_string()],
            outputs: serde_json::json!({ "iteration": 3 }),
        };
        store.write_workflow_session(&session_id, &session).unwrap();
        let loaded = store.read_workflow_session(&session_id).unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Completed);
        assert_eq!(loaded.node_history, session.node_history);
        assert_eq!(loaded.outputs, session.outputs);
    }

    #[test]
    fn agent_record_round_trips_by_id() {
        let (_dir, store) = store();
        let session_id = SessionId::new("s1");
        let agent = AgentRecord {
            agent_id: AgentId::new("a1"),
            task_tool_call_id: ToolCallId::new("call_1"),
            display_name: "worker".to_string(),
            task_description: "build".to_string(),
            status: AgentStatus::Running,
            background: false,
            started_at: chrono::Utc::now(),
            duration_ms: None,
            current_tool: None,
            tool_use_count: 0,
            result: None,
            parent_agent_id: None,
        };
        store.write_agent(&session_id, &agent).unwrap();
        let loaded = store.read_agent(&session_id, "a1").unwrap().unwrap();
        assert_eq!(loaded.display_name, "worker");
    }

    #[test]
    fn log_append_writes_one_json_line_per_record() {
        let (_dir, store) = store();
        let session_id = SessionId::new("s1");
        store.append_log(&session_id, &serde_json::json!({"n": 1})).unwrap();
        store.append_log(&session_id, &serde_json::json!({"n": 2})).unwrap();
        let contents = std::fs::read_to_string(store.session_dir(&session_id).join("logs/events.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
