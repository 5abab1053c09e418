//! Deterministic test tooling: fixture-driven event replay and scenario
//! assertions, so the session controller, tracker, and graph engine can be
//! exercised without a live backend adapter.

pub mod fixtures;
pub mod replay;
pub mod scenario;

pub use fixtures::list_fixtures;
pub use replay::EventReplay;
pub use scenario::{Scenario, ScenarioOutcome};
