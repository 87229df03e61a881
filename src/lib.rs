//! Main library entry point for pg-migrate-core.
//!
//! A resumable, idempotent orchestrator for migrating a Postgres database
//! from a source instance to a target instance: a pg_dump/pg_restore-driven
//! bulk copy phase, gated by on-disk done-markers so an interrupted run
//! resumes without redoing completed work, and an optional logical-decoding
//! replay phase that streams ongoing source changes onto the target until a
//! chosen stop LSN is reached.

pub mod archive_reader;
pub mod args;
pub mod catalog;
pub mod error;
pub mod external;
pub mod extension_worker;
pub mod filter;
pub mod lsn;
pub mod orchestrator;
pub mod replay;
pub mod replication_origin;
pub mod run_context;
pub mod sentinel;
pub mod stage_driver;
pub mod toc;
pub mod workdir;

pub use catalog::{ExtensionConfigTable, QualifiedName, SourceCatalog, SourceExtension, SourceTable};
pub use error::{CopyError, Result};
pub use filter::{FilterEngine, FilterSpec};
pub use lsn::Lsn;
pub use orchestrator::Orchestrator;
pub use replay::ReplayEngine;
pub use run_context::{RestoreOptions, RunContext};
pub use toc::ArchiveTocEntry;
pub use workdir::{Stage, WorkDir};
