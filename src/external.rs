//! External dumper/restorer seam (spec.md §6 "Invoked external programs").
//!
//! The pg_dump/pg_restore binaries themselves are explicitly out of scope
//! (spec.md §1); what belongs to this crate is deciding *when* to invoke
//! them and *what* to pass. `DumpRestoreRunner` isolates that invocation so
//! the Schema Stage Driver can be tested against a fake that never touches
//! a real toolchain or database.

use crate::error::{CopyError, Result};
use std::path::Path;
use std::process::Command;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpSection {
    PreData,
    PostData,
    All,
}

impl DumpSection {
    fn flag(self) -> &'static str {
        match self {
            DumpSection::PreData => "pre-data",
            DumpSection::PostData => "post-data",
            DumpSection::All => "all",
        }
    }
}

pub trait DumpRestoreRunner {
    fn dump(
        &self,
        source_pguri: &str,
        section: DumpSection,
        snapshot: &str,
        out_file: &Path,
    ) -> Result<()>;

    fn restore(&self, target_pguri: &str, use_list: &Path, archive_file: &Path) -> Result<()>;
}

pub struct ProcessDumpRestoreRunner {
    pub pg_dump_path: String,
    pub pg_restore_path: String,
}

impl Default for ProcessDumpRestoreRunner {
    fn default() -> Self {
        Self {
            pg_dump_path: "pg_dump".to_string(),
            pg_restore_path: "pg_restore".to_string(),
        }
    }
}

impl DumpRestoreRunner for ProcessDumpRestoreRunner {
    fn dump(
        &self,
        source_pguri: &str,
        section: DumpSection,
        snapshot: &str,
        out_file: &Path,
    ) -> Result<()> {
        let status = Command::new(&self.pg_dump_path)
            .arg("--format=custom")
            .arg(format!("--section={}", section.flag()))
            .arg("--snapshot")
            .arg(snapshot)
            .arg("--file")
            .arg(out_file)
            .arg(source_pguri)
            .status()
            .map_err(|source| CopyError::Io {
                path: self.pg_dump_path.clone(),
                source,
            })?;

        run_status(&self.pg_dump_path, status)
    }

    fn restore(&self, target_pguri: &str, use_list: &Path, archive_file: &Path) -> Result<()> {
        let status = Command::new(&self.pg_restore_path)
            .arg("--use-list")
            .arg(use_list)
            .arg("--dbname")
            .arg(target_pguri)
            .arg(archive_file)
            .status()
            .map_err(|source| CopyError::Io {
                path: self.pg_restore_path.clone(),
                source,
            })?;

        run_status(&self.pg_restore_path, status)
    }
}

fn run_status(program: &str, status: std::process::ExitStatus) -> Result<()> {
    if status.success() {
        Ok(())
    } else {
        Err(CopyError::ChildFailure {
            program: program.to_string(),
            status: status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_section_flags_match_pg_dump_vocabulary() {
        assert_eq!(DumpSection::PreData.flag(), "pre-data");
        assert_eq!(DumpSection::PostData.flag(), "post-data");
        assert_eq!(DumpSection::All.flag(), "all");
    }
}
