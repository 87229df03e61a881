//! Main binary entry point for pgmigrate.
//!
//! Reduced to argument parsing, snapshot acquisition, and thread wiring —
//! the orchestration logic itself lives in `pg_migrate_core::orchestrator`
//! so it stays testable without a live Postgres pair (spec.md §1 Out of
//! scope: CLI flag catalog, pid-file/locking, process-spawning/log
//! formatting belong to the surrounding deployment, not this crate).

use anyhow::{Context, Result};
use pg_migrate_core::args::get_args;
use pg_migrate_core::orchestrator::{install_quit_flag, Orchestrator};
use pg_migrate_core::{RunContext, SourceCatalog};
use std::io::BufReader;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = get_args()?;
    let ctx = RunContext::from(&args);

    let catalog = match &args.catalog {
        Some(path) => SourceCatalog::read_from(std::path::Path::new(path))
            .context("failed to read source catalog")?,
        None => SourceCatalog::default(),
    };

    let quit = install_quit_flag()?;
    let orchestrator = Orchestrator::new(ctx, catalog)?;

    // `_snapshot_holder` keeps the exporting transaction open for the
    // lifetime of the copy phase; dropping it early would invalidate
    // `snapshot` before the extension worker and post-data dump read it.
    let (_snapshot_holder, snapshot) = export_source_snapshot(&orchestrator.ctx.source_pguri)?;
    orchestrator
        .run_copy_phase(&snapshot, args.create_extensions)
        .context("copy phase failed")?;

    if args.replay {
        tracing::info!("starting replay phase, endpos read from the source sentinel");

        let stdin = std::io::stdin();
        let reader = BufReader::new(stdin.lock());
        let origin_name = format!(
            "pgmigrate_{}",
            orchestrator.ctx.work_dir.root().file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        );
        orchestrator
            .run_replay_phase(reader, &origin_name, || quit.load(std::sync::atomic::Ordering::Relaxed))
            .context("replay phase failed")?;
    }

    Ok(())
}

/// Acquires a snapshot at the source so pre-data dump, post-data dump, and
/// extension-data copy all see the same consistent point in time (spec.md
/// §4.E "snapshot held by an external snapshot holder"). The returned
/// `Client` holds the exporting transaction open; callers must keep it
/// alive for the duration of the copy phase.
fn export_source_snapshot(source_pguri: &str) -> Result<(postgres::Client, String)> {
    let mut client = postgres::Client::connect(source_pguri, postgres::NoTls)
        .context("failed to connect to source for snapshot export")?;
    client.batch_execute("BEGIN TRANSACTION ISOLATION LEVEL REPEATABLE READ")?;
    let row = client.query_one("SELECT pg_export_snapshot()", &[])?;
    let snapshot: String = row.get(0);
    Ok((client, snapshot))
}
