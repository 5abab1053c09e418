//! Opaque identifiers threaded through the event pipeline.
//!
//! None of these are required to be UUIDs: a `SessionId` is whatever opaque
//! string the backend hands back, an `AgentId` starts life as a placeholder
//! equal to the spawning `ToolCallId` and is later replaced in place (see
//! the Sub-Agent Tracker's merge algorithm). `SessionId::generate` and
//! friends exist for the cases where *we* are the ones minting the id
//! (workflow sessions, synthetic sub-agent sessions spawned by the Bridge).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

opaque_id!(SessionId, "Identifies one live conversation with one backend.");
opaque_id!(
    AgentId,
    "Identifies one node in the Sub-Agent Tracker's tree. May be a placeholder equal to a ToolCallId."
);
opaque_id!(
    ToolCallId,
    "The originating tool-invocation id; never changes once assigned, used as the tracker's merge key."
);
