//! Apply Context (spec.md §3 / §4.F items 1-2). Ground: `ld_replay.c`'s
//! `StreamApplyContext` / `stream_apply_sql`, which applies each decoded
//! line to the target inside the transaction boundaries the BEGIN/COMMIT
//! events themselves establish, and only advances `previousLSN` on
//! COMMIT/KEEPALIVE/SWITCH (`ld_replay.c:254-256`) — never mid-transaction —
//! so an `endpos` that falls inside an open transaction is only observed
//! once that transaction's COMMIT has actually landed.

use crate::error::Result;
use crate::lsn::Lsn;
use crate::replay::event::{StreamAction, StreamEvent};
use crate::replication_origin;

/// Isolates "run this SQL against the target" so `ApplyContext`'s
/// bookkeeping (LSN tracking, end-position detection) is testable without a
/// live connection.
pub trait SqlExecutor {
    fn execute_sql(&mut self, sql: &str) -> Result<()>;

    /// `pg_replication_origin_xact_setup` equivalent: records the source
    /// commit LSN the current transaction replays, so the replication
    /// origin's progress advances atomically with the COMMIT that follows
    /// (spec.md §4.F transactional discipline: "the origin is advanced in
    /// the same transaction as the last statement of each COMMIT batch").
    fn set_origin_lsn(&mut self, origin_lsn: Lsn) -> Result<()>;
}

impl SqlExecutor for postgres::Client {
    fn execute_sql(&mut self, sql: &str) -> Result<()> {
        self.batch_execute(sql)?;
        Ok(())
    }

    fn set_origin_lsn(&mut self, origin_lsn: Lsn) -> Result<()> {
        replication_origin::xact_setup(self, &origin_lsn.to_string(), "now")
    }
}

/// Tracks apply progress for one replay run. `previous_lsn` is the LSN of
/// the last *committed* position (spec.md §3: "last committed position"),
/// advanced only on COMMIT/KEEPALIVE/SWITCH — never by an in-flight DML
/// event — so end-position comparisons never trip mid-transaction;
/// `replay_lsn` only advances on COMMIT, matching the original's distinct
/// `previousLSN`/`replay_lsn` fields — `replay_lsn` is what gets durably
/// recorded via the sentinel and the replication origin.
pub struct ApplyContext<E: SqlExecutor> {
    executor: E,
    pub previous_lsn: Lsn,
    pub replay_lsn: Lsn,
    pub endpos: Lsn,
    pub reached_end_pos: bool,
    pub timeline_id: u32,
    pub wal_segment_size: u32,
}

impl<E: SqlExecutor> ApplyContext<E> {
    pub fn new(executor: E, endpos: Lsn, previous_lsn: Lsn) -> Self {
        Self {
            executor,
            previous_lsn,
            replay_lsn: previous_lsn,
            endpos,
            reached_end_pos: false,
            timeline_id: 0,
            wal_segment_size: 0,
        }
    }

    /// `stream_apply_sql` equivalent — dispatches on action and advances the
    /// LSN bookkeeping it owns. Events without a rendered `sql` field for an
    /// action that expects one (INSERT/UPDATE/DELETE/TRUNCATE/MESSAGE) are a
    /// no-op: the upstream producer had nothing to render for that line.
    pub fn apply_event(&mut self, event: &StreamEvent) -> Result<()> {
        match event.action {
            StreamAction::Begin => {
                self.executor.execute_sql(event.sql.as_deref().unwrap_or("BEGIN"))?;
            }
            StreamAction::Commit => {
                if let Some(lsn) = event.lsn {
                    self.executor.set_origin_lsn(lsn)?;
                }
                self.executor.execute_sql(event.sql.as_deref().unwrap_or("COMMIT"))?;
                if let Some(lsn) = event.lsn {
                    self.previous_lsn = lsn;
                    self.replay_lsn = lsn;
                }
            }
            StreamAction::Insert
            | StreamAction::Update
            | StreamAction::Delete
            | StreamAction::Truncate
            | StreamAction::Message => {
                if let Some(sql) = &event.sql {
                    self.executor.execute_sql(sql)?;
                }
            }
            StreamAction::Switch => {
                if let Some(timeline) = event.timeline {
                    self.timeline_id = timeline;
                }
                if let Some(lsn) = event.lsn {
                    self.previous_lsn = lsn;
                }
            }
            StreamAction::Keepalive => {
                if let Some(lsn) = event.lsn {
                    self.previous_lsn = lsn;
                }
            }
        }

        if self.endpos.is_valid() && self.endpos <= self.previous_lsn {
            self.reached_end_pos = true;
        }

        Ok(())
    }

    pub fn should_stop(&self) -> bool {
        self.reached_end_pos
    }

    /// Adopts a fresh `endpos` read back from the sentinel (spec.md §3:
    /// endpos "may be updated while running") and immediately re-checks it
    /// against the current position, so a sentinel response that lowers
    /// `endpos` to at-or-below where we already are latches `reached_end_pos`
    /// without waiting for the next event.
    pub fn update_endpos(&mut self, endpos: Lsn) {
        self.endpos = endpos;
        if self.endpos.is_valid() && self.endpos <= self.previous_lsn {
            self.reached_end_pos = true;
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingExecutor {
        statements: Vec<String>,
        origin_lsns: Vec<Lsn>,
    }

    impl SqlExecutor for RecordingExecutor {
        fn execute_sql(&mut self, sql: &str) -> Result<()> {
            self.statements.push(sql.to_string());
            Ok(())
        }

        fn set_origin_lsn(&mut self, origin_lsn: Lsn) -> Result<()> {
            self.origin_lsns.push(origin_lsn);
            Ok(())
        }
    }

    fn event(action: StreamAction, lsn: Option<&str>, sql: Option<&str>) -> StreamEvent {
        StreamEvent {
            action,
            lsn: lsn.map(|s| s.parse().unwrap()),
            txid: None,
            sql: sql.map(|s| s.to_string()),
            timeline: None,
        }
    }

    #[test]
    fn commit_advances_both_previous_and_replay_lsn() {
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        ctx.apply_event(&event(StreamAction::Begin, None, None)).unwrap();
        ctx.apply_event(&event(StreamAction::Commit, Some("0/100"), Some("COMMIT"))).unwrap();

        assert_eq!(ctx.previous_lsn, "0/100".parse().unwrap());
        assert_eq!(ctx.replay_lsn, "0/100".parse().unwrap());
    }

    #[test]
    fn commit_sets_the_replication_origin_lsn_before_committing() {
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        ctx.apply_event(&event(StreamAction::Commit, Some("0/100"), Some("COMMIT"))).unwrap();

        assert_eq!(ctx.executor().origin_lsns, vec!["0/100".parse().unwrap()]);
    }

    #[test]
    fn insert_without_sql_is_a_clean_noop() {
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        ctx.apply_event(&event(StreamAction::Insert, Some("0/50"), None)).unwrap();
        assert!(ctx.executor.statements.is_empty());
    }

    /// A DML event's LSN must not move `previous_lsn` ahead of the
    /// transaction's actual COMMIT — doing so would let `endpos` latch
    /// mid-transaction, stopping the loop before the COMMIT is applied.
    #[test]
    fn dml_event_does_not_advance_previous_lsn() {
        let endpos: Lsn = "0/108".parse().unwrap();
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), endpos, Lsn::INVALID);

        ctx.apply_event(&event(StreamAction::Begin, Some("0/100"), None)).unwrap();
        ctx.apply_event(&event(StreamAction::Insert, Some("0/108"), Some("INSERT INTO t VALUES (1)"))).unwrap();
        assert!(!ctx.should_stop(), "endpos must not latch on a DML event, only on COMMIT");

        ctx.apply_event(&event(StreamAction::Commit, Some("0/110"), Some("COMMIT"))).unwrap();
        assert!(ctx.executor().statements.contains(&"INSERT INTO t VALUES (1)".to_string()));
        assert!(ctx.should_stop(), "endpos has been passed once the COMMIT lands");
        assert_eq!(ctx.previous_lsn, "0/110".parse().unwrap());
    }

    #[test]
    fn reaching_endpos_sets_the_stop_flag() {
        let endpos: Lsn = "0/200".parse().unwrap();
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), endpos, Lsn::INVALID);
        assert!(!ctx.should_stop());

        ctx.apply_event(&event(StreamAction::Keepalive, Some("0/150"), None)).unwrap();
        assert!(!ctx.should_stop());

        ctx.apply_event(&event(StreamAction::Keepalive, Some("0/200"), None)).unwrap();
        assert!(ctx.should_stop());
    }

    #[test]
    fn no_endpos_never_auto_stops() {
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        ctx.apply_event(&event(StreamAction::Keepalive, Some("FFFFFFFF/FFFFFFFF"), None))
            .unwrap();
        assert!(!ctx.should_stop());
    }

    #[test]
    fn sentinel_lowering_endpos_latches_immediately() {
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        ctx.apply_event(&event(StreamAction::Keepalive, Some("0/300"), None)).unwrap();
        assert!(!ctx.should_stop());

        ctx.update_endpos("0/200".parse().unwrap());
        assert!(ctx.should_stop());
    }

    #[test]
    fn switch_updates_timeline_without_touching_replay_lsn() {
        let mut ctx = ApplyContext::new(RecordingExecutor::default(), Lsn::INVALID, Lsn::INVALID);
        ctx.apply_event(&event(StreamAction::Switch, Some("0/10"), None)).unwrap();
        let mut switch_event = event(StreamAction::Switch, Some("0/20"), None);
        switch_event.timeline = Some(3);
        ctx.apply_event(&switch_event).unwrap();

        assert_eq!(ctx.timeline_id, 3);
        assert_eq!(ctx.replay_lsn, Lsn::INVALID);
    }
}
