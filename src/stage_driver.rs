//! Schema Stage Driver (spec.md §4.D): orchestrates pre-data/post-data
//! dump and restore, resumable via done-markers. Ground: the teacher's
//! `Migration::setup_migration`/`orchestrate` apply the same "check,
//! act, mark done" shape to its own (much narrower) single-table steps;
//! here it's generalized to the full dump/restore pipeline and to
//! `anyhow`-free, typed `CopyError` results so the orchestrator can
//! short-circuit a stage without writing its marker.

use crate::archive_reader::ArchiveReader;
use crate::catalog::SourceCatalog;
use crate::error::{CopyError, Result};
use crate::external::{DumpRestoreRunner, DumpSection};
use crate::filter::FilterEngine;
use crate::run_context::RunContext;
use crate::toc;
use crate::workdir::Stage;
use itertools::Itertools;
use r2d2::Pool;
use r2d2_postgres::{PostgresConnectionManager, postgres::NoTls};

pub struct StageDriver<'a> {
    pub ctx: &'a RunContext,
    pub catalog: &'a SourceCatalog,
    pub dump_restore: &'a dyn DumpRestoreRunner,
    pub archive_reader: &'a dyn ArchiveReader,
    pub pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl<'a> StageDriver<'a> {
    /// Runs `action` only if `stage`'s done-marker is absent; writes the
    /// marker only after `action` succeeds. Never writes the marker on
    /// failure, guaranteeing a clean retry on the next run (spec.md §4.D,
    /// §7 propagation policy).
    fn run_stage(&self, stage: Stage, label: &str, action: impl FnOnce() -> Result<()>) -> Result<()> {
        let marker = self.ctx.work_dir.stage_done_path(stage);
        if self.ctx.work_dir.exists(&marker) {
            tracing::info!(stage = label, "skipping stage, already done");
            return Ok(());
        }
        action()?;
        self.ctx.work_dir.write_done_marker(&marker)
    }

    /// `dumpSchema(section)`. `section ∈ {PRE_DATA, POST_DATA, ALL}`.
    pub fn dump_schema(&self, section: DumpSection, snapshot: &str) -> Result<()> {
        if matches!(section, DumpSection::PreData | DumpSection::All) {
            self.run_stage(Stage::PreDataDump, "pre-data-dump", || {
                self.dump_restore.dump(
                    &self.ctx.source_pguri,
                    DumpSection::PreData,
                    snapshot,
                    &self.ctx.work_dir.pre_dump_path(),
                )
            })?;
        }

        if matches!(section, DumpSection::PostData | DumpSection::All) {
            self.run_stage(Stage::PostDataDump, "post-data-dump", || {
                self.dump_restore.dump(
                    &self.ctx.source_pguri,
                    DumpSection::PostData,
                    snapshot,
                    &self.ctx.work_dir.post_dump_path(),
                )
            })?;
        }

        Ok(())
    }

    /// `prepareTargetSchema()` — restore pre-data.
    pub fn prepare_target_schema(&self) -> Result<()> {
        let marker = self.ctx.work_dir.stage_done_path(Stage::PreDataRestore);
        if self.ctx.work_dir.exists(&marker) {
            tracing::info!("skipping pre-data restore, done on a previous run");
            return Ok(());
        }

        let archive = self.ctx.work_dir.pre_dump_path();
        if !archive.exists() {
            return Err(CopyError::PreconditionViolation(format!(
                "file {} does not exist",
                archive.display()
            )));
        }

        let list_path = self.ctx.work_dir.pre_list_path();
        let filter = FilterEngine::new(&self.ctx.filters, &self.ctx.work_dir);
        toc::rewrite_toc(
            self.archive_reader,
            &filter,
            &self.ctx.work_dir,
            &archive,
            &list_path,
        )?;

        if self.ctx.restore_options.drop_if_exists {
            self.drop_target_tables()?;
        }

        if !self.ctx.filters.include_only_schemas.is_empty() {
            self.create_target_namespaces()?;
        }

        self.dump_restore
            .restore(&self.ctx.target_pguri, &list_path, &archive)?;

        self.ctx.work_dir.write_done_marker(&marker)
    }

    /// `finalizeTargetSchema()` — restore post-data.
    pub fn finalize_target_schema(&self) -> Result<()> {
        let marker = self.ctx.work_dir.stage_done_path(Stage::PostDataRestore);
        if self.ctx.work_dir.exists(&marker) {
            tracing::info!("skipping post-data restore, done on a previous run");
            return Ok(());
        }

        let archive = self.ctx.work_dir.post_dump_path();
        if !archive.exists() {
            return Err(CopyError::PreconditionViolation(format!(
                "file {} does not exist",
                archive.display()
            )));
        }

        let list_path = self.ctx.work_dir.post_list_path();
        let filter = FilterEngine::new(&self.ctx.filters, &self.ctx.work_dir);
        toc::rewrite_toc(
            self.archive_reader,
            &filter,
            &self.ctx.work_dir,
            &archive,
            &list_path,
        )?;

        self.dump_restore
            .restore(&self.ctx.target_pguri, &list_path, &archive)?;

        self.ctx.work_dir.write_done_marker(&marker)
    }

    /// `dropTargetTables()` — used only when `dropIfExists` is set.
    pub fn drop_target_tables(&self) -> Result<()> {
        let Some(statement) = Self::build_drop_statement(&self.catalog.tables) else {
            tracing::info!("no tables to migrate, skipping drop tables on target");
            return Ok(());
        };

        let mut client = self.pool.get().map_err(|e| {
            CopyError::TransientExternal(format!("failed to acquire target connection: {e}"))
        })?;
        client.simple_query(&statement)?;
        Ok(())
    }

    /// Composes the `DROP TABLE ... CASCADE` statement, or `None` for an
    /// empty catalog. Catalog entries are produced by external introspection
    /// and occasionally repeat a table under more than one selection rule;
    /// dedup the same way `Migration::setup_migration` does for its own
    /// table list before composing the DDL batch.
    fn build_drop_statement(tables: &[crate::catalog::SourceTable]) -> Option<String> {
        if tables.is_empty() {
            return None;
        }
        let quoted = tables
            .iter()
            .map(|t| t.name.quoted())
            .unique()
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("DROP TABLE IF EXISTS {quoted} CASCADE"))
    }

    /// `createTargetNamespaces()` — used only when include-only-schemas is non-empty.
    pub fn create_target_namespaces(&self) -> Result<()> {
        let statement = self
            .ctx
            .filters
            .include_only_schemas
            .iter()
            .map(|s| format!("CREATE SCHEMA IF NOT EXISTS \"{s}\";"))
            .collect::<String>();

        let mut client = self.pool.get().map_err(|e| {
            CopyError::TransientExternal(format!("failed to acquire target connection: {e}"))
        })?;
        client.batch_execute(&statement)?;
        Ok(())
    }
}
