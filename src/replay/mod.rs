//! Replay Engine (spec.md §4.F). Ground: `ld_replay.c`'s `stream_apply_replay`
//! / `stream_replay_line`, which read JSON-lines from a stream, apply each to
//! the target, and maintain the sentinel on COMMIT/KEEPALIVE boundaries.

pub mod apply;
pub mod event;

use crate::error::{CopyError, Result};
use crate::workdir::WorkDir;
use apply::{ApplyContext, SqlExecutor};
use event::parse_line;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

use crate::sentinel::{SentinelCoordinator, SentinelTransport};

/// Supplemented on-disk artifact (SPEC_FULL §5.2): timeline and WAL segment
/// size read once per run so a restart doesn't need to re-derive them.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StreamContext {
    pub timeline_id: u32,
    pub wal_segment_size: u32,
}

pub fn read_stream_context(work_dir: &WorkDir) -> Result<Option<StreamContext>> {
    let path = work_dir.stream_context_path();
    if !work_dir.exists(&path) {
        return Ok(None);
    }
    let bytes = std::fs::read(&path).map_err(|source| CopyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let ctx = serde_json::from_slice(&bytes)
        .map_err(|e| CopyError::ProtocolError(format!("malformed stream context: {e}")))?;
    Ok(Some(ctx))
}

pub fn write_stream_context(work_dir: &WorkDir, ctx: StreamContext) -> Result<()> {
    let bytes = serde_json::to_vec(&ctx)
        .map_err(|e| CopyError::BugError(format!("failed to serialize stream context: {e}")))?;
    work_dir.write(&work_dir.stream_context_path(), &bytes)
}

/// Ties the Apply Context and the Sentinel Coordinator together into the
/// per-line loop `stream_apply_replay` runs.
pub struct ReplayEngine<E: SqlExecutor, T: SentinelTransport> {
    pub apply: ApplyContext<E>,
    pub sentinel: SentinelCoordinator<T>,
}

impl<E: SqlExecutor, T: SentinelTransport> ReplayEngine<E, T> {
    pub fn new(apply: ApplyContext<E>, sentinel: SentinelCoordinator<T>) -> Self {
        Self { apply, sentinel }
    }

    /// SPEC_FULL §5.3: the three distinct startup log lines from
    /// `stream_apply_replay`, emitted once before the loop starts.
    pub fn log_start(&self) {
        if self.apply.endpos.is_valid() {
            if self.apply.endpos <= self.apply.previous_lsn {
                tracing::info!(
                    endpos = %self.apply.endpos,
                    previous_lsn = %self.apply.previous_lsn,
                    "endpos was previously reached"
                );
            } else {
                tracing::info!(
                    from = %self.apply.previous_lsn,
                    endpos = %self.apply.endpos,
                    "replaying changes up to endpos"
                );
            }
        } else {
            tracing::info!(from = %self.apply.previous_lsn, "replaying changes with no endpos set");
        }
    }

    /// Precondition 1 (spec.md §4.F): block until the sentinel's
    /// `apply_enabled` flag is set, polling at `poll_interval`. `quit` is
    /// checked between polls so a graceful-shutdown signal can abort the
    /// wait; returns `false` in that case rather than `true` once enabled.
    pub fn wait_for_apply_enabled(
        &mut self,
        poll_interval: std::time::Duration,
        quit: impl Fn() -> bool,
    ) -> Result<bool> {
        loop {
            if quit() {
                return Ok(false);
            }
            let row = self
                .sentinel
                .blocking_sync_sentinel(self.apply.replay_lsn, self.apply.replay_lsn, self.apply.replay_lsn)?;
            if row.apply_enabled {
                return Ok(true);
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// One iteration of `stream_replay_line`: apply the event, then sync the
    /// sentinel if this line is a sync point. A completed sentinel fetch can
    /// carry a new `endpos` (spec.md §3: "endpos... may be updated while
    /// running") — when that happens this also re-checks whether the new
    /// value latches `reachedEndPos` immediately, not just on the next event.
    /// Returns `true` once the endpos has been reached and the loop should
    /// stop reading further lines.
    pub fn process_line(&mut self, line: &str) -> Result<bool> {
        let event = parse_line(line)?;
        self.apply.apply_event(&event)?;

        if event.action.is_sync_point() {
            if let Some(row) = self.sentinel.sync_sentinel(
                self.apply.replay_lsn,
                self.apply.replay_lsn,
                self.apply.replay_lsn,
            )? {
                self.apply.update_endpos(row.endpos);
            }
        }

        Ok(self.apply.should_stop())
    }

    /// Reads lines from `reader` until `endpos` is reached or the stream
    /// ends, then runs termination cleanup. Blank lines are skipped.
    pub fn replay_from<R: BufRead>(&mut self, reader: R) -> Result<()> {
        self.log_start();

        if self.apply.endpos.is_valid() && self.apply.endpos <= self.apply.previous_lsn {
            return Ok(());
        }

        for line in reader.lines() {
            let line = line.map_err(|source| CopyError::Io {
                path: "<stream>".into(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            if self.process_line(&line)? {
                break;
            }
        }

        self.finish()
    }

    /// Termination cleanup from `stream_apply_replay`: drain any in-flight
    /// sentinel query, send one last sync, then log the final stopping point.
    pub fn finish(&mut self) -> Result<()> {
        while self.sentinel.query_in_progress() {
            self.sentinel.fetch_sync_sentinel()?;
        }

        self.sentinel.send_sync_sentinel(
            self.apply.replay_lsn,
            self.apply.replay_lsn,
            self.apply.replay_lsn,
        )?;
        while self.sentinel.query_in_progress() {
            self.sentinel.fetch_sync_sentinel()?;
        }

        if self.apply.endpos.is_valid() && self.apply.endpos <= self.apply.replay_lsn {
            tracing::info!(
                endpos = %self.apply.endpos,
                replay_lsn = %self.apply.replay_lsn,
                "replay reached endpos, stopping"
            );
        } else {
            tracing::info!(replay_lsn = %self.apply.replay_lsn, "replay stopped");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsn::Lsn;
    use crate::sentinel::SentinelRow;
    use std::io::Cursor;

    #[derive(Default)]
    struct RecordingExecutor {
        statements: Vec<String>,
    }

    impl SqlExecutor for RecordingExecutor {
        fn execute_sql(&mut self, sql: &str) -> Result<()> {
            self.statements.push(sql.to_string());
            Ok(())
        }

        fn set_origin_lsn(&mut self, _origin_lsn: Lsn) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct NoopTransport;

    impl SentinelTransport for NoopTransport {
        fn send(&self, _w: Lsn, _f: Lsn, _r: Lsn) -> Result<()> {
            Ok(())
        }

        fn fetch(&self) -> Result<SentinelRow> {
            Ok(SentinelRow::default())
        }
    }

    fn engine(endpos: Lsn) -> ReplayEngine<RecordingExecutor, NoopTransport> {
        let apply = ApplyContext::new(RecordingExecutor::default(), endpos, Lsn::INVALID);
        let sentinel = SentinelCoordinator::new(NoopTransport);
        ReplayEngine::new(apply, sentinel)
    }

    #[test]
    fn stops_reading_once_endpos_reached() {
        let mut engine = engine("0/200".parse().unwrap());
        let stream = "{\"action\":\"BEGIN\",\"lsn\":\"0/100\"}\n\
                       {\"action\":\"COMMIT\",\"lsn\":\"0/200\",\"sql\":\"COMMIT\"}\n\
                       {\"action\":\"BEGIN\",\"lsn\":\"0/300\"}\n";

        engine.replay_from(Cursor::new(stream)).unwrap();

        assert_eq!(engine.apply.replay_lsn, "0/200".parse().unwrap());
        assert_eq!(engine.apply.executor().statements.len(), 2);
    }

    #[test]
    fn wait_for_apply_enabled_returns_false_when_quit_requested() {
        let mut engine = engine(Lsn::INVALID);
        let enabled = engine
            .wait_for_apply_enabled(std::time::Duration::from_millis(1), || true)
            .unwrap();
        assert!(!enabled);
    }

    #[derive(Default)]
    struct EnabledTransport;

    impl SentinelTransport for EnabledTransport {
        fn send(&self, _w: Lsn, _f: Lsn, _r: Lsn) -> Result<()> {
            Ok(())
        }

        fn fetch(&self) -> Result<SentinelRow> {
            Ok(SentinelRow {
                apply_enabled: true,
                ..Default::default()
            })
        }
    }

    #[test]
    fn wait_for_apply_enabled_returns_true_once_sentinel_allows_it() {
        let apply = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        let sentinel = SentinelCoordinator::new(EnabledTransport);
        let mut engine = ReplayEngine::new(apply, sentinel);

        let enabled = engine
            .wait_for_apply_enabled(std::time::Duration::from_millis(1), || false)
            .unwrap();
        assert!(enabled);
    }

    #[test]
    fn skips_blank_lines() {
        let mut engine = engine(Lsn::INVALID);
        let stream = "\n{\"action\":\"KEEPALIVE\",\"lsn\":\"0/50\"}\n\n";
        engine.replay_from(Cursor::new(stream)).unwrap();
        assert_eq!(engine.apply.previous_lsn, "0/50".parse().unwrap());
    }

    #[test]
    fn already_reached_endpos_skips_the_loop_entirely() {
        let apply = ApplyContext::new(
            RecordingExecutor::default(),
            "0/50".parse().unwrap(),
            "0/100".parse().unwrap(),
        );
        let mut engine = ReplayEngine::new(apply, SentinelCoordinator::new(NoopTransport));
        engine.replay_from(Cursor::new("{\"action\":\"BEGIN\"}\n")).unwrap();
        assert!(engine.apply.executor().statements.is_empty());
    }

    /// A sentinel response carrying a lowered `endpos` should be able to stop
    /// the loop even though the event stream itself never reaches the
    /// original endpos (spec.md §3: endpos "may be updated while running").
    #[test]
    fn sentinel_response_can_lower_endpos_and_stop_the_loop() {
        struct LoweringTransport;
        impl SentinelTransport for LoweringTransport {
            fn send(&self, _w: Lsn, _f: Lsn, _r: Lsn) -> Result<()> {
                Ok(())
            }
            fn fetch(&self) -> Result<SentinelRow> {
                Ok(SentinelRow {
                    endpos: "0/50".parse().unwrap(),
                    ..Default::default()
                })
            }
        }

        let apply = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        let mut sentinel = SentinelCoordinator::new(LoweringTransport);
        // Force the coordinator into "query already in flight" so the first
        // sync point in the stream fetches (rather than sends) and observes
        // the lowered endpos immediately.
        sentinel.send_sync_sentinel(Lsn::INVALID, Lsn::INVALID, Lsn::INVALID).unwrap();
        let mut engine = ReplayEngine::new(apply, sentinel);

        let stop = engine.process_line(r#"{"action":"KEEPALIVE","lsn":"0/10"}"#).unwrap();
        assert!(stop);
        assert_eq!(engine.apply.endpos, "0/50".parse().unwrap());
    }

    #[test]
    fn stream_context_round_trips_through_workdir() {
        let dir = std::env::temp_dir().join(format!("replay-ctx-test-{}", uuid::Uuid::new_v4()));
        let wd = WorkDir::new(&dir);
        assert!(read_stream_context(&wd).unwrap().is_none());

        write_stream_context(&wd, StreamContext { timeline_id: 3, wal_segment_size: 16 * 1024 * 1024 }).unwrap();
        let ctx = read_stream_context(&wd).unwrap().unwrap();
        assert_eq!(ctx.timeline_id, 3);
        assert_eq!(ctx.wal_segment_size, 16 * 1024 * 1024);

        std::fs::remove_dir_all(&dir).ok();
    }
}
