//! Archive TOC entry type (spec.md §3) and the Archive TOC Rewriter (§4.C).

use crate::archive_reader::ArchiveReader;
use crate::error::Result;
use crate::filter::FilterEngine;
use crate::workdir::WorkDir;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveTocEntry {
    pub dump_id: i64,
    pub catalog_oid: u32,
    pub object_oid: u32,
    pub desc: String,
    pub restore_name: String,
}

impl ArchiveTocEntry {
    /// Renders the line format from spec.md §6:
    /// `[;]<dumpId>; <catalogOid> <objectOid> <desc> <restoreName>`
    pub fn render(&self, commented: bool) -> String {
        let prefix = if commented { ";" } else { "" };
        format!(
            "{prefix}{}; {} {} {} {}\n",
            self.dump_id, self.catalog_oid, self.object_oid, self.desc, self.restore_name
        )
    }
}

/// Reads `archive_path`'s TOC, decides keep/comment per entry, and writes
/// the rewritten list atomically to `list_path`. Preserves input order
/// exactly; only the leading `;` prefix changes (spec.md §4.C, §8 invariant 3).
pub fn rewrite_toc(
    reader: &dyn ArchiveReader,
    filter: &FilterEngine,
    work_dir: &WorkDir,
    archive_path: &Path,
    list_path: &Path,
) -> Result<()> {
    let entries = reader.read_toc(archive_path)?;

    let mut buffer = String::new();
    for entry in &entries {
        let already_done = filter.has_been_processed(entry.object_oid);
        let filtered_out = filter.is_filtered_out(&entry.restore_name);
        let commented = already_done || filtered_out;

        if already_done {
            tracing::debug!(
                dump_id = entry.dump_id,
                oid = entry.object_oid,
                "skipping already-processed entry"
            );
        } else if filtered_out {
            tracing::debug!(
                dump_id = entry.dump_id,
                oid = entry.object_oid,
                "skipping filtered-out entry"
            );
        }

        buffer.push_str(&entry.render(commented));
    }

    work_dir.write(list_path, buffer.as_bytes())
}
