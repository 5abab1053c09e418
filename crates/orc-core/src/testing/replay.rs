//! Replays a recorded sequence of unified [`Event`]s against a
//! [`SessionController`] and [`Tracker`], for deterministic tests that don't
//! spin up a live backend adapter.
//!
//! Fixtures are JSONL, one `Event` per line — the same envelope shape the
//! Session Store appends to `logs/events.jsonl`, so a fixture can be lifted
//! straight from a captured session.

use crate::session::SessionController;
use crate::tracker::Tracker;
use orc_proto::{Event, EventKind};
use std::io::{self, BufRead};
use std::path::Path;

/// A loaded, ordered sequence of events ready to be fed to a controller and
/// tracker one at a time.
#[derive(Debug, Clone)]
pub struct EventReplay {
    events: Vec<Event>,
    position: usize,
}

impl EventReplay {
    pub fn from_events(events: Vec<Event>) -> Self {
        Self { events, position: 0 }
    }

    pub fn from_reader<R: io::Read>(reader: R) -> io::Result<Self> {
        let reader = io::BufReader::new(reader);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(line)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
            events.push(event);
        }
        Ok(Self::from_events(events))
    }

    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.events.len()
    }

    pub fn next_event(&mut self) -> Option<&Event> {
        let event = self.events.get(self.position)?;
        self.position += 1;
        Some(event)
    }

    /// Drives every remaining event through the session controller (message
    /// history / active-set bookkeeping) and, for the subset of events the
    /// tracker cares about, the sub-agent tracker.
    pub fn drive(&mut self, session: &mut SessionController, tracker: &mut Tracker) {
        while let Some(event) = self.next_event() {
            session.apply_event(event);
            apply_to_tracker(tracker, event);
        }
    }
}

fn apply_to_tracker(tracker: &mut Tracker, event: &Event) {
    match &event.kind {
        EventKind::ToolStart {
            tool_call_id,
            tool_name,
            mode,
            ..
        } if tool_name == "Task" => {
            tracker.on_tool_start(tool_call_id.clone(), tool_name.clone(), String::new(), *mode);
        }
        EventKind::ToolComplete {
            tool_call_id,
            success,
            tool_result,
        } => {
            tracker.on_tool_complete(tool_call_id, *success, Some(tool_result.to_string()));
        }
        EventKind::SubagentStart {
            subagent_id,
            task_tool_call_id,
            subagent_type,
        } => {
            tracker.merge_or_insert_agent(
                task_tool_call_id.clone(),
                subagent_id.clone(),
                subagent_type.clone(),
            );
        }
        EventKind::SubagentComplete {
            subagent_id,
            success,
            result,
        } => {
            tracker.on_subagent_complete(subagent_id, *success, result.clone());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use orc_proto::{BackendKind, SessionId};

    fn line(kind: &EventKind, session_id: &SessionId, sequence: u64) -> String {
        let event = Event::new(session_id.clone(), sequence, kind.clone());
        serde_json::to_string(&event).unwrap()
    }

    #[test]
    fn replays_message_delta_events_into_session_history() {
        let session_id = SessionId::new("s1");
        let jsonl = format!(
            "{}\n{}\n",
            line(&EventKind::MessageDelta { text: "Hello".into() }, &session_id, 1),
            line(&EventKind::MessageDelta { text: ", world".into() }, &session_id, 2),
        );

        let mut replay = EventReplay::from_reader(jsonl.as_bytes()).unwrap();
        assert_eq!(replay.len(), 2);

        let mut session = SessionController::new(session_id, BackendKind::Stream, "sys");
        session.send("go");
        let mut tracker = Tracker::new();
        replay.drive(&mut session, &mut tracker);

        assert!(replay.is_exhausted());
        let assistant = session.message_history.last().unwrap();
        assert_eq!(assistant.role, Role::Assistant);
    }

    #[test]
    fn blank_lines_in_fixture_are_skipped() {
        let session_id = SessionId::new("s1");
        let jsonl = format!("\n  \n{}\n", line(&EventKind::SessionIdle, &session_id, 1));
        let replay = EventReplay::from_reader(jsonl.as_bytes()).unwrap();
        assert_eq!(replay.len(), 1);
    }

    #[test]
    fn malformed_fixture_line_is_an_error() {
        let result = EventReplay::from_reader(b"not json".as_slice());
        assert!(result.is_err());
    }

    #[test]
    fn tool_and_subagent_events_populate_the_tracker() {
        let session_id = SessionId::new("s1");
        let tool_call_id = orc_proto::ToolCallId::new("call_1");
        let agent_id = orc_proto::AgentId::new("agent_1");
        let events = vec![
            Event::new(
                session_id.clone(),
                1,
                EventKind::ToolStart {
                    tool_call_id: tool_call_id.clone(),
                    tool_name: "Task".into(),
                    tool_input: serde_json::json!({}),
                    mode: orc_proto::ToolMode::Sync,
                },
            ),
            Event::new(
                session_id.clone(),
                2,
                EventKind::SubagentStart {
                    subagent_id: agent_id.clone(),
                    task_tool_call_id: Some(tool_call_id.clone()),
                    subagent_type: Some("worker".into()),
                },
            ),
            Event::new(
                session_id.clone(),
                3,
                EventKind::SubagentComplete {
                    subagent_id: agent_id.clone(),
                    success: true,
                    result: Some("done".into()),
                },
            ),
        ];

        let mut replay = EventReplay::from_events(events);
        let mut session = SessionController::new(session_id, BackendKind::Stream, "sys");
        session.send("go");
        let mut tracker = Tracker::new();
        replay.drive(&mut session, &mut tracker);

        assert_eq!(
            tracker.get(&agent_id).unwrap().status,
            crate::tracker::AgentStatus::Completed
        );
    }
}
