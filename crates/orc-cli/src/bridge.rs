//! Sub-Agent Bridge backed by a real backend CLI (spec §4.6 "Sub-Agent
//! Bridge", §4.2 "Process execution"): every `agent`/`parallel` graph node
//! shells out through [`CliExecutor`] instead of the null bridge the core
//! crate's tests use.

use async_trait::async_trait;
use orc_adapters::{with_retry, AdapterError, CliBackend, CliExecutor};
use orc_core::graph::{GraphError, GraphResult, SubAgentBridge};
use serde_json::{json, Value};

/// Spawns each instruction as one CLI invocation of the configured backend.
pub struct CliSubAgentBridge {
    backend: CliBackend,
}

impl CliSubAgentBridge {
    pub fn new(backend: CliBackend) -> Self {
        Self { backend }
    }

    async fn run(&self, instruction: &str) -> GraphResult<Value> {
        with_retry(|| async {
            let executor = CliExecutor::new(self.backend.clone());
            let result = executor
                .execute_capture(instruction)
                .await
                .map_err(|err| AdapterError::Transient(err.to_string()))?;
            if !result.success {
                return Err(AdapterError::Terminal(format!(
                    "backend exited with {:?}",
                    result.exit_code
                )));
            }
            Ok(json!({ "result": result.output, "exit_code": result.exit_code }))
        })
        .await
        .map_err(|err| GraphError::BridgeFailed(err.to_string()))
    }
}

#[async_trait]
impl SubAgentBridge for CliSubAgentBridge {
    async fn spawn(&self, instruction: &str) -> GraphResult<Value> {
        self.run(instruction).await
    }

    async fn spawn_parallel(&self, instructions: &[String]) -> GraphResult<Vec<Value>> {
        let futures = instructions.iter().map(|instruction| self.run(instruction));
        futures::future::try_join_all(futures).await
    }

    async fn spawn_as(&self, _agent_id: &str, _agent_name: &str, instruction: &str) -> GraphResult<Value> {
        self.run(instruction).await
    }
}
