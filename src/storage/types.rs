use crate::engine::session::Session;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Snapshot format version written by this build
pub const FORMAT_VERSION: &str = concat!("storyloom-v", env!("CARGO_PKG_VERSION"));

/// Engine bookkeeping persisted next to the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMeta {
    /// Turns played in the front end, including non-story commands
    #[serde(default)]
    pub turns: u64,
}

/// Fields readable without deserializing the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Format version that wrote the snapshot
    pub version: String,
    /// Save label
    pub label: String,
    /// Whether this is a manual save
    #[serde(default)]
    pub manual: bool,
    /// Session identifier
    pub session_id: String,
    /// When the snapshot was taken
    pub timestamp: DateTime<Local>,
    /// Player character name
    pub player_name: String,
    /// Committed turns at save time
    pub total_turns: usize,
}

/// A versioned copy of a session on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Header fields, stored at the top level of the document
    #[serde(flatten)]
    pub header: SnapshotHeader,
    /// Engine bookkeeping
    #[serde(default)]
    pub meta: TurnMeta,
    /// The full session
    pub session: Session,
}

impl Snapshot {
    /// Captures a deep copy of a session
    ///
    /// The session must already have an id.
    pub fn capture(
        session: &Session,
        session_id: &str,
        label: &str,
        manual: bool,
        meta: &TurnMeta,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            header: SnapshotHeader {
                version: FORMAT_VERSION.to_string(),
                label: label.to_string(),
                manual,
                session_id: session_id.to_string(),
                timestamp,
                player_name: session.player.name.clone(),
                total_turns: session.turn_count(),
            },
            meta: meta.clone(),
            session: session.clone(),
        }
    }
}

/// One save file as shown in listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSummary {
    /// Session directory name
    pub session_id: String,
    /// File name within the session directory
    pub file_name: String,
    /// Player character name
    pub player_name: String,
    /// When the snapshot was taken
    pub timestamp: DateTime<Local>,
    /// Committed turns at save time
    pub total_turns: usize,
    /// Whether this is a manual save
    pub manual: bool,
    /// Save label
    pub label: String,
    /// Format version
    pub version: String,
    /// Whether the file is gzip-compressed
    pub compressed: bool,
}
