//! Stage Driver integration tests against a real target database. Grounds
//! S1 (empty catalog + dropIfExists is a no-op) and the create-namespaces
//! path from spec.md §8's end-to-end scenarios, the way the teacher's
//! `tests/integration.rs` exercises `Migration` against a throw-away DB.

mod common;

use pg_migrate_core::archive_reader::ArchiveReader;
use pg_migrate_core::error::Result;
use pg_migrate_core::external::{DumpRestoreRunner, DumpSection};
use pg_migrate_core::stage_driver::StageDriver;
use pg_migrate_core::{ArchiveTocEntry, FilterSpec, RestoreOptions, RunContext, SourceCatalog, WorkDir};
use r2d2_postgres::PostgresConnectionManager;
use r2d2_postgres::postgres::NoTls;
use serial_test::serial;
use std::path::Path;

struct UnusedRunner;

impl DumpRestoreRunner for UnusedRunner {
    fn dump(&self, _: &str, _: DumpSection, _: &str, _: &Path) -> Result<()> {
        unreachable!("this test never dumps")
    }

    fn restore(&self, _: &str, _: &Path, _: &Path) -> Result<()> {
        unreachable!("this test never restores")
    }
}

struct EmptyReader;

impl ArchiveReader for EmptyReader {
    fn read_toc(&self, _: &Path) -> Result<Vec<ArchiveTocEntry>> {
        Ok(Vec::new())
    }
}

fn driver_for<'a>(
    ctx: &'a RunContext,
    catalog: &'a SourceCatalog,
    runner: &'a UnusedRunner,
    reader: &'a EmptyReader,
    db_url: &str,
) -> StageDriver<'a> {
    let manager = PostgresConnectionManager::new(db_url.parse().unwrap(), NoTls);
    let pool = r2d2::Pool::builder().max_size(2).build(manager).unwrap();
    StageDriver {
        ctx,
        catalog,
        dump_restore: runner,
        archive_reader: reader,
        pool,
    }
}

/// S1: empty catalog, dropIfExists=true — DROP TABLE never runs, call succeeds.
#[test]
#[serial]
fn drop_target_tables_is_a_noop_against_a_real_database() {
    let test_db = common::setup_test_db();
    let dir = std::env::temp_dir().join(format!("pgmigrate-sd-{}", uuid::Uuid::new_v4()));
    let ctx = RunContext::new(
        WorkDir::new(&dir),
        "unused",
        test_db.db_url.as_str(),
        FilterSpec::default(),
        RestoreOptions { drop_if_exists: true },
    );
    let catalog = SourceCatalog::default();
    let runner = UnusedRunner;
    let reader = EmptyReader;
    let driver = driver_for(&ctx, &catalog, &runner, &reader, &test_db.db_url);

    driver.drop_target_tables().unwrap();

    std::fs::remove_dir_all(&dir).ok();
}

/// Include-only-schemas is non-empty: `createTargetNamespaces` must create
/// every named schema on the target in one round trip.
#[test]
#[serial]
fn create_target_namespaces_creates_every_named_schema() {
    let test_db = common::setup_test_db();
    let dir = std::env::temp_dir().join(format!("pgmigrate-sd-{}", uuid::Uuid::new_v4()));
    let ctx = RunContext::new(
        WorkDir::new(&dir),
        "unused",
        test_db.db_url.as_str(),
        FilterSpec {
            include_only_schemas: vec!["migrated_one".into(), "migrated_two".into()],
            ..Default::default()
        },
        RestoreOptions::default(),
    );
    let catalog = SourceCatalog::default();
    let runner = UnusedRunner;
    let reader = EmptyReader;
    let driver = driver_for(&ctx, &catalog, &runner, &reader, &test_db.db_url);

    driver.create_target_namespaces().unwrap();

    let mut client = test_db.pool.get().unwrap();
    for schema in ["migrated_one", "migrated_two"] {
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
                &[&schema],
            )
            .unwrap();
        let exists: bool = row.get(0);
        assert!(exists, "schema {schema} was not created");
    }

    std::fs::remove_dir_all(&dir).ok();
}
