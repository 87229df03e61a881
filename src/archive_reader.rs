//! External archive reader seam (spec.md §4.C step 1): obtains a dump
//! archive's table of contents as an ordered sequence of entries.
//!
//! The teacher has no equivalent (it never shells out to an external
//! toolchain); this is grounded on `dump_restore.c`'s `pg_restore_list`,
//! which invokes `pg_restore --list` and parses its stdout. We keep that
//! shape but isolate it behind a trait so the TOC rewriter can be tested
//! against a fake without a real archive or a `pg_restore` binary on PATH.

use crate::error::{CopyError, Result};
use crate::toc::ArchiveTocEntry;
use std::path::Path;
use std::process::Command;

pub trait ArchiveReader {
    fn read_toc(&self, archive_path: &Path) -> Result<Vec<ArchiveTocEntry>>;
}

/// Invokes `pg_restore --list` and parses the output using the same
/// five-field grammar the rewriter itself writes (spec.md §6).
pub struct PgRestoreArchiveReader {
    pub pg_restore_path: String,
}

impl Default for PgRestoreArchiveReader {
    fn default() -> Self {
        Self {
            pg_restore_path: "pg_restore".to_string(),
        }
    }
}

impl ArchiveReader for PgRestoreArchiveReader {
    fn read_toc(&self, archive_path: &Path) -> Result<Vec<ArchiveTocEntry>> {
        let output = Command::new(&self.pg_restore_path)
            .arg("--list")
            .arg(archive_path)
            .output()
            .map_err(|source| CopyError::Io {
                path: archive_path.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CopyError::ChildFailure {
                program: self.pg_restore_path.clone(),
                status: output.status.code().unwrap_or(-1),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_toc_lines(&stdout)
    }
}

/// Parses lines of the form `<dumpId>; <catalogOid> <objectOid> <desc> <restoreName>`,
/// skipping header/comment lines (those starting with `;` or not containing
/// a `;` at all, e.g. pg_restore's leading archive-metadata banner).
fn parse_toc_lines(text: &str) -> Result<Vec<ArchiveTocEntry>> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        let Some((id_part, rest)) = line.split_once(';') else {
            continue;
        };
        let Ok(dump_id) = id_part.trim().parse::<i64>() else {
            continue;
        };
        let rest = rest.trim();
        let mut fields = rest.splitn(4, ' ');
        let (Some(catalog_oid), Some(object_oid), Some(desc), Some(restore_name)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let (Ok(catalog_oid), Ok(object_oid)) =
            (catalog_oid.parse::<u32>(), object_oid.parse::<u32>())
        else {
            continue;
        };
        entries.push(ArchiveTocEntry {
            dump_id,
            catalog_oid,
            object_oid,
            desc: desc.to_string(),
            restore_name: restore_name.to_string(),
        });
    }
    Ok(entries)
}
