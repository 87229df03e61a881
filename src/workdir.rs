//! Work-Directory Manager (spec.md §4.A): deterministic, collision-free
//! paths for every on-disk artifact of a run, plus atomic writes so a
//! zero-byte done-marker is never observed half-written.

use crate::error::{CopyError, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    PreDataDump,
    PreDataRestore,
    PostDataDump,
    PostDataRestore,
}

impl Stage {
    fn file_name(self) -> &'static str {
        match self {
            Stage::PreDataDump => "pre-data-dump",
            Stage::PreDataRestore => "pre-data-restore",
            Stage::PostDataDump => "post-data-dump",
            Stage::PostDataRestore => "post-data-restore",
        }
    }
}

/// Layout rooted at a single run directory. All paths are pure functions of
/// `root` and, for per-object markers, the object's OID — never looked up,
/// never mutated after construction.
#[derive(Clone, Debug)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.root.join("schema")
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join("run")
    }

    pub fn pre_dump_path(&self) -> PathBuf {
        self.schema_dir().join("pre.dump")
    }

    pub fn post_dump_path(&self) -> PathBuf {
        self.schema_dir().join("post.dump")
    }

    pub fn pre_list_path(&self) -> PathBuf {
        self.schema_dir().join("pre.list")
    }

    pub fn post_list_path(&self) -> PathBuf {
        self.schema_dir().join("post.list")
    }

    pub fn stage_done_path(&self, stage: Stage) -> PathBuf {
        self.run_dir().join("done").join(stage.file_name())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.run_dir().join("indexes")
    }

    pub fn index_done_path(&self, oid: u32) -> PathBuf {
        self.index_dir().join(format!("{oid}.done"))
    }

    /// Supplemented per SPEC_FULL §5.2: on-disk streaming context (timeline,
    /// WAL segment size), mirroring the other done-marker artifacts.
    pub fn stream_context_path(&self) -> PathBuf {
        self.run_dir().join("stream-context.json")
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Writes `bytes` to `path`, atomic w.r.t. readers: write to a sibling
    /// temp file then rename. Creates parent directories as needed. A
    /// zero-byte write is legal and is how done-markers are created.
    pub fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CopyError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let tmp_path = path.with_extension(format!(
            "tmp-{}",
            uuid::Uuid::new_v4().simple()
        ));
        fs::write(&tmp_path, bytes).map_err(|source| CopyError::Io {
            path: tmp_path.display().to_string(),
            source,
        })?;
        fs::rename(&tmp_path, path).map_err(|source| CopyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    pub fn write_done_marker(&self, path: &Path) -> Result<()> {
        self.write(path, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_deterministic_and_well_formed() {
        let wd = WorkDir::new("/tmp/run1");
        assert_eq!(wd.pre_dump_path(), Path::new("/tmp/run1/schema/pre.dump"));
        assert_eq!(
            wd.stage_done_path(Stage::PreDataDump),
            Path::new("/tmp/run1/run/done/pre-data-dump")
        );
        assert_eq!(
            wd.index_done_path(12345),
            Path::new("/tmp/run1/run/indexes/12345.done")
        );
    }

    #[test]
    fn write_then_exists_round_trips() {
        let dir = tempdir();
        let wd = WorkDir::new(dir.path());
        let marker = wd.stage_done_path(Stage::PostDataRestore);
        assert!(!wd.exists(&marker));
        wd.write_done_marker(&marker).unwrap();
        assert!(wd.exists(&marker));
        assert_eq!(fs::read(&marker).unwrap().len(), 0);
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempdir();
        let wd = WorkDir::new(dir.path());
        wd.write(&wd.index_done_path(7), &[]).unwrap();
        assert!(wd.index_dir().is_dir());
    }

    fn tempdir() -> TempDir {
        TempDir::new()
    }

    struct TempDir {
        path: PathBuf,
    }

    impl TempDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!("pgmigrate-test-{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&path).unwrap();
            Self { path }
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}
