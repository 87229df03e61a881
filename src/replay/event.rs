//! Stream event wire format (spec.md §3, §6): one JSON object per line, a
//! `sql` field carrying the already-rendered statement for the action, and
//! unknown fields ignored. Ground: `ld_replay.c`'s `stream_replay_line`,
//! which hands the raw decoded `line` straight to `stream_apply_sql` —
//! the producer, not this crate, renders DML into SQL text; this crate only
//! decides when to run it and how to track progress.

use crate::error::{CopyError, Result};
use crate::lsn::Lsn;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamAction {
    Begin,
    Commit,
    Insert,
    Update,
    Delete,
    Truncate,
    Message,
    Switch,
    Keepalive,
}

impl StreamAction {
    /// Matches `ld_replay.c`'s switch in `stream_replay_line`: only COMMIT
    /// and KEEPALIVE are "good points when to report progress".
    pub fn is_sync_point(self) -> bool {
        matches!(self, StreamAction::Commit | StreamAction::Keepalive)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamEvent {
    pub action: StreamAction,
    #[serde(default)]
    pub lsn: Option<Lsn>,
    #[serde(default)]
    pub txid: Option<i64>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub timeline: Option<u32>,
}

/// Parses one line of the stream. Blank lines (the trailing newline of a
/// buffered reader, e.g.) are not valid events — callers should skip them
/// before calling this, not rely on it to do so silently.
pub fn parse_line(line: &str) -> Result<StreamEvent> {
    serde_json::from_str(line).map_err(|e| CopyError::ProtocolError(format!("malformed stream event: {e}")))
}
