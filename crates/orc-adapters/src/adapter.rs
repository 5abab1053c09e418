//! Shared adapter machinery: sequence assignment and the transient/terminal
//! retry split (spec §4.2 failure policy).

use orc_proto::{Event, EventKind, SessionId};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transient adapter I/O error: {0}")]
    Transient(String),
    #[error("terminal adapter error: {0}")]
    Terminal(String),
}

impl AdapterError {
    fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Transient(_))
    }
}

/// Assigns the monotonic per-session `sequence` every unified event carries
/// (spec §4.1). One allocator per live session.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    next: u64,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn wrap(&mut self, session_id: SessionId, kind: EventKind) -> Event {
        let sequence = self.next;
        self.next += 1;
        Event::new(session_id, sequence, kind)
    }
}

/// Retries `op` with exponential backoff, capped at 5 attempts total (spec
/// §4.2: "retry with exponential backoff capped at ~5 attempts"). A
/// terminal error or the final attempt's error is returned immediately.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    const MAX_ATTEMPTS: u32 = 5;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = Duration::from_millis(50 * 2u64.pow(attempt - 1));
                tracing::warn!(attempt, ?delay, "transient adapter error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
