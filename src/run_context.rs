//! Run Context (spec.md §3): a process-scoped, read-only-after-construction
//! value borrowed by every component. Ground: the teacher builds `Migration`
//! the same way — parsed once in `main`, then threaded by reference into
//! every stage.

use crate::filter::FilterSpec;
use crate::workdir::WorkDir;

#[derive(Clone, Debug, Default)]
pub struct RestoreOptions {
    pub drop_if_exists: bool,
}

#[derive(Clone, Debug)]
pub struct RunContext {
    pub work_dir: WorkDir,
    pub source_pguri: String,
    pub target_pguri: String,
    pub filters: FilterSpec,
    pub restore_options: RestoreOptions,
}

impl RunContext {
    pub fn new(
        work_dir: WorkDir,
        source_pguri: impl Into<String>,
        target_pguri: impl Into<String>,
        filters: FilterSpec,
        restore_options: RestoreOptions,
    ) -> Self {
        Self {
            work_dir,
            source_pguri: source_pguri.into(),
            target_pguri: target_pguri.into(),
            filters,
            restore_options,
        }
    }
}
