use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(v: i64) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// Primary key of a registered command.
    CommandId
);
id_type!(
    /// Primary key of one run of a command.
    ExecutionId
);
id_type!(LogLineId);

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A registered shell script, addressed by its unique alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub alias: String,
    pub script: String,
}

/// One run of a [`Command`]. `active` flips to false exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub command_id: CommandId,
    pub process_id: u32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub id: LogLineId,
    pub execution_id: ExecutionId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a finalize call on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// This call flipped the record from active to inactive.
    Finalized,
    /// The record was already inactive; nothing changed.
    AlreadyFinalized,
}

impl Finalization {
    pub fn is_first(self) -> bool {
        matches!(self, Finalization::Finalized)
    }
}
