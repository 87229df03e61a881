//! Sentinel Coordinator (spec.md §4.G). Ground: `ld_replay.c`'s
//! `stream_apply_send_sync_sentinel` / `stream_apply_fetch_sync_sentinel` /
//! `stream_apply_sync_sentinel`, which maintain the `pgcopydb.sentinel` row
//! through an async query pair (send, then later poll for the result) so the
//! replay loop never blocks on it. The sync `postgres` crate this crate uses
//! elsewhere has no non-blocking query API, so the send/fetch split is kept
//! as the state machine it is in the original — exactly one round trip may
//! be in flight at a time — rather than collapsed into one blocking call.

use crate::error::{CopyError, Result};
use crate::lsn::Lsn;
use std::time::{Duration, Instant};

/// One row of `pgcopydb.sentinel`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SentinelRow {
    pub apply_enabled: bool,
    pub endpos: Lsn,
    pub startpos: Lsn,
    pub write_lsn: Lsn,
    pub flush_lsn: Lsn,
    pub replay_lsn: Lsn,
}

/// Isolates the sentinel's two SQL round trips so `SentinelCoordinator`'s
/// cadence and in-flight bookkeeping can be tested without a database.
pub trait SentinelTransport {
    fn send(&self, write_lsn: Lsn, flush_lsn: Lsn, replay_lsn: Lsn) -> Result<()>;
    fn fetch(&self) -> Result<SentinelRow>;
}

impl SentinelTransport for Box<dyn SentinelTransport> {
    fn send(&self, write_lsn: Lsn, flush_lsn: Lsn, replay_lsn: Lsn) -> Result<()> {
        (**self).send(write_lsn, flush_lsn, replay_lsn)
    }

    fn fetch(&self) -> Result<SentinelRow> {
        (**self).fetch()
    }
}

pub struct PgSentinelTransport {
    pub pguri: String,
}

impl SentinelTransport for PgSentinelTransport {
    fn send(&self, write_lsn: Lsn, flush_lsn: Lsn, replay_lsn: Lsn) -> Result<()> {
        let mut client = postgres::Client::connect(&self.pguri, postgres::NoTls)?;
        client.execute(
            "SELECT pgcopydb.sync_sentinel($1::pg_lsn, $2::pg_lsn, $3::pg_lsn)",
            &[
                &write_lsn.to_string(),
                &flush_lsn.to_string(),
                &replay_lsn.to_string(),
            ],
        )?;
        Ok(())
    }

    fn fetch(&self) -> Result<SentinelRow> {
        let mut client = postgres::Client::connect(&self.pguri, postgres::NoTls)?;
        let row = client.query_one(
            "SELECT apply_enabled, endpos::text, startpos::text, \
                    write_lsn::text, flush_lsn::text, replay_lsn::text \
             FROM pgcopydb.sentinel",
            &[],
        )?;

        let parse = |s: String| -> Result<Lsn> {
            s.parse()
                .map_err(|_| CopyError::ProtocolError(format!("malformed LSN in sentinel row: {s}")))
        };

        Ok(SentinelRow {
            apply_enabled: row.get(0),
            endpos: parse(row.get(1))?,
            startpos: parse(row.get(2))?,
            write_lsn: parse(row.get(3))?,
            flush_lsn: parse(row.get(4))?,
            replay_lsn: parse(row.get(5))?,
        })
    }
}

/// Tracks whether a sentinel query is currently in flight and how long it's
/// been since the last sync, enforcing "at most one in-flight sentinel query"
/// (spec.md §8 testable property 6) and the 1-second sync cadence from
/// `ld_replay.c` line 225 (`1 < (now - context->sentinelSyncTime)`).
pub struct SentinelCoordinator<T: SentinelTransport> {
    transport: T,
    query_in_progress: bool,
    last_sync: Option<Instant>,
}

impl<T: SentinelTransport> SentinelCoordinator<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            query_in_progress: false,
            last_sync: None,
        }
    }

    pub fn query_in_progress(&self) -> bool {
        self.query_in_progress
    }

    fn due_for_sync(&self) -> bool {
        match self.last_sync {
            None => true,
            Some(t) => t.elapsed() > Duration::from_secs(1),
        }
    }

    /// `sendSyncSentinel()`. Errors if a query is already in flight —
    /// callers must `fetch_sync_sentinel` first.
    pub fn send_sync_sentinel(&mut self, write_lsn: Lsn, flush_lsn: Lsn, replay_lsn: Lsn) -> Result<()> {
        if self.query_in_progress {
            return Err(CopyError::BugError(
                "sendSyncSentinel called while a sentinel query is already in flight".into(),
            ));
        }
        self.transport.send(write_lsn, flush_lsn, replay_lsn)?;
        self.query_in_progress = true;
        self.last_sync = Some(Instant::now());
        Ok(())
    }

    /// `fetchSyncSentinel()`.
    pub fn fetch_sync_sentinel(&mut self) -> Result<SentinelRow> {
        let row = self.transport.fetch()?;
        self.query_in_progress = false;
        Ok(row)
    }

    /// `syncSentinel()`: the per-iteration decision from the replay loop —
    /// fetch a pending query if one is in flight, otherwise send a new one
    /// if the cadence window has elapsed. Returns the row once a fetch
    /// completes; `None` means nothing changed this call.
    pub fn sync_sentinel(
        &mut self,
        write_lsn: Lsn,
        flush_lsn: Lsn,
        replay_lsn: Lsn,
    ) -> Result<Option<SentinelRow>> {
        if self.query_in_progress {
            return self.fetch_sync_sentinel().map(Some);
        }
        if self.due_for_sync() {
            self.send_sync_sentinel(write_lsn, flush_lsn, replay_lsn)?;
        }
        Ok(None)
    }

    /// Blocking send+fetch used at shutdown and during the initial
    /// wait-for-sentinel (spec.md §4.G), bypassing the 1-second cadence —
    /// both callers need the current row right now, not on the next tick.
    pub fn blocking_sync_sentinel(
        &mut self,
        write_lsn: Lsn,
        flush_lsn: Lsn,
        replay_lsn: Lsn,
    ) -> Result<SentinelRow> {
        if self.query_in_progress {
            self.fetch_sync_sentinel()?;
        }
        self.send_sync_sentinel(write_lsn, flush_lsn, replay_lsn)?;
        self.fetch_sync_sentinel()
    }
}
