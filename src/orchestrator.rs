//! Top-level wiring (SPEC_FULL §4 "Top-level wiring"). Ground: the teacher's
//! `MigrationOrchestrator`, which owns a connection pool and composes the
//! stage-specific pieces (`start_backfill_thread`, `start_log_replay_thread`,
//! `orchestrate`) into one end-to-end run. This generalizes that shape from
//! a single-table migration to the full dump/restore + extension-copy +
//! replay pipeline spec.md §2 describes, following the same data flow: plan
//! → dump pre-data → restore pre-data (+ drop/create namespaces) → copy table
//! data and extension config tables → dump/restore post-data → optionally
//! replay until endpos.

use crate::archive_reader::{ArchiveReader, PgRestoreArchiveReader};
use crate::catalog::SourceCatalog;
use crate::error::{CopyError, Result};
use crate::external::{DumpRestoreRunner, DumpSection, ProcessDumpRestoreRunner};
use crate::extension_worker::{ExtensionCopyBridge, ExtensionWorker, ProcessExtensionCopyBridge};
use crate::lsn::Lsn;
use crate::replay::apply::ApplyContext;
use crate::replay::{ReplayEngine, read_stream_context};
use crate::replication_origin;
use crate::run_context::RunContext;
use crate::sentinel::{PgSentinelTransport, SentinelCoordinator};
use crate::stage_driver::StageDriver;
use r2d2::Pool;
use r2d2_postgres::{PostgresConnectionManager, postgres::NoTls};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide graceful-shutdown flag (spec.md §5, §9 "global mutable
/// state"): the only mutable state shared across the orchestrator besides
/// the read-only `RunContext`, set from a `ctrlc` handler and threaded
/// explicitly into every long loop that must check it.
pub fn install_quit_flag() -> Result<Arc<AtomicBool>> {
    let quit = Arc::new(AtomicBool::new(false));
    let handler_flag = quit.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .map_err(|e| CopyError::BugError(format!("failed to install signal handler: {e}")))?;
    Ok(quit)
}

/// Owns the pool and the real external-process seams for one run. Built
/// once in `main`, then driving each stage in turn — mirrors the teacher's
/// `MigrationOrchestrator` owning `pool` and composing per-stage helpers.
pub struct Orchestrator {
    pub ctx: RunContext,
    pub catalog: SourceCatalog,
    pub pool: Pool<PostgresConnectionManager<NoTls>>,
    pub dump_restore: Box<dyn DumpRestoreRunner>,
    pub archive_reader: Box<dyn ArchiveReader>,
    pub extension_bridge: Arc<dyn ExtensionCopyBridge>,
}

impl Orchestrator {
    pub fn new(ctx: RunContext, catalog: SourceCatalog) -> Result<Self> {
        let manager = PostgresConnectionManager::new(
            ctx.target_pguri.parse().map_err(|e| {
                CopyError::PreconditionViolation(format!("invalid target connection uri: {e}"))
            })?,
            NoTls,
        );
        let pool = Pool::new(manager)
            .map_err(|e| CopyError::TransientExternal(format!("failed to build target pool: {e}")))?;

        Ok(Self {
            ctx,
            catalog,
            pool,
            dump_restore: Box::new(ProcessDumpRestoreRunner::default()),
            archive_reader: Box::new(PgRestoreArchiveReader::default()),
            extension_bridge: Arc::new(ProcessExtensionCopyBridge),
        })
    }

    fn stage_driver(&self) -> StageDriver<'_> {
        StageDriver {
            ctx: &self.ctx,
            catalog: &self.catalog,
            dump_restore: self.dump_restore.as_ref(),
            archive_reader: self.archive_reader.as_ref(),
            pool: self.pool.clone(),
        }
    }

    /// Runs the bulk copy phase: pre-data dump/restore, extension data copy
    /// in the background, then post-data dump/restore. Table-data copying
    /// itself is out of scope (spec.md §1); it's assumed to run concurrently
    /// with the extension worker, driven by an external COPY pipeline.
    pub fn run_copy_phase(&self, snapshot: &str, create_extensions: bool) -> Result<()> {
        let driver = self.stage_driver();

        driver.dump_schema(DumpSection::PreData, snapshot)?;
        driver.prepare_target_schema()?;

        let extension_worker = ExtensionWorker {
            ctx: self.ctx.clone(),
            catalog: self.catalog.clone(),
            bridge: self.extension_bridge.clone(),
            snapshot: snapshot.to_string(),
        };
        let extension_handle = extension_worker.start_extension_data_process(create_extensions);

        driver.dump_schema(DumpSection::PostData, snapshot)?;

        // The parent does not wait on the extension worker before finalizing
        // the schema (spec.md §4.E): post-data restore only needs pre-data
        // and the table-data copy, not extension config rows.
        driver.finalize_target_schema()?;

        match extension_handle.join() {
            Ok(result) => result,
            Err(_) => Err(CopyError::BugError("extension data worker panicked".into())),
        }
    }

    /// Runs the logical-replay phase until `endpos` is reached or `quit`
    /// is observed. Grounds the preconditions of spec.md §4.F items 1-4:
    /// wait for the sentinel to enable apply, set up the replication
    /// origin (recovering `previousLSN` from a prior run), load streaming
    /// context, then hand off to the engine's main loop.
    pub fn run_replay_phase<R: BufRead>(
        &self,
        reader: R,
        origin_name: &str,
        quit: impl Fn() -> bool,
    ) -> Result<()> {
        let sentinel_transport = PgSentinelTransport {
            pguri: self.ctx.source_pguri.clone(),
        };
        let mut sentinel = SentinelCoordinator::new(sentinel_transport);

        let mut target = postgres::Client::connect(&self.ctx.target_pguri, postgres::NoTls)?;
        replication_origin::create(&mut target, origin_name)?;
        replication_origin::session_setup(&mut target, origin_name)?;
        let previous_lsn = match replication_origin::progress(&mut target, origin_name)? {
            Some(ref text) if text != "0/0" => text.parse().unwrap_or(Lsn::INVALID),
            _ => Lsn::INVALID,
        };

        let initial_row = sentinel.blocking_sync_sentinel(previous_lsn, previous_lsn, previous_lsn)?;

        let mut apply = ApplyContext::new(target, initial_row.endpos, previous_lsn);
        if let Some(stream_ctx) = read_stream_context(&self.ctx.work_dir)? {
            apply.timeline_id = stream_ctx.timeline_id;
            apply.wal_segment_size = stream_ctx.wal_segment_size;
        }

        let mut engine = ReplayEngine::new(apply, sentinel);

        if !initial_row.apply_enabled {
            tracing::info!("waiting for sentinel to enable apply");
            if !engine.wait_for_apply_enabled(std::time::Duration::from_millis(200), &quit)? {
                tracing::info!("replay wait aborted by shutdown signal");
                return Ok(());
            }
        }

        engine.replay_from(reader)
    }
}
