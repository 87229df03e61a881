//! Filter Specification and Filter Engine (spec.md §3, §4.B).

use crate::workdir::WorkDir;

#[derive(Clone, Debug, Default)]
pub struct FilterSpec {
    pub include_only_schemas: Vec<String>,
    pub include_only_tables: Vec<String>,
    pub exclude_schemas: Vec<String>,
    pub exclude_tables: Vec<String>,
}

impl FilterSpec {
    /// `true` iff the object should be kept per spec.md §4.B / §8 invariant 4:
    /// `(includeOnly=∅ ∨ O ∈ includeOnly) ∧ O ∉ exclude`.
    ///
    /// Per SPEC_FULL §Open Questions (spec.md §9b): when both
    /// include-only-schemas and include-only-tables are non-empty, the
    /// object must match both lists (conjunctive), not either.
    pub fn is_kept(&self, schema: &str, table_name: &str) -> bool {
        let have_schema_allowlist = !self.include_only_schemas.is_empty();
        let have_table_allowlist = !self.include_only_tables.is_empty();

        if have_schema_allowlist || have_table_allowlist {
            let schema_ok =
                !have_schema_allowlist || self.include_only_schemas.iter().any(|s| s == schema);
            let table_ok =
                !have_table_allowlist || self.include_only_tables.iter().any(|t| t == table_name);
            if !(schema_ok && table_ok) {
                return false;
            }
            // include-only wins over exclude: the catalog is authoritative.
            return true;
        }

        let excluded = self.exclude_schemas.iter().any(|s| s == schema)
            || self.exclude_tables.iter().any(|t| t == table_name);
        !excluded
    }
}

/// Combines the filter specification with per-OID done-markers (4.A) to
/// answer the two questions the TOC rewriter and stage driver need.
pub struct FilterEngine<'a> {
    pub spec: &'a FilterSpec,
    pub work_dir: &'a WorkDir,
}

impl<'a> FilterEngine<'a> {
    pub fn new(spec: &'a FilterSpec, work_dir: &'a WorkDir) -> Self {
        Self { spec, work_dir }
    }

    /// `restore_name` is the archive's restore-list name, typically
    /// `schema.object` or just `object` for schema-less entries (some
    /// archive entries lack OIDs but still carry an identifying name).
    pub fn is_filtered_out(&self, restore_name: &str) -> bool {
        let (schema, name) = split_restore_name(restore_name);
        !self.spec.is_kept(schema, name)
    }

    pub fn has_been_processed(&self, oid: u32) -> bool {
        self.work_dir.exists(&self.work_dir.index_done_path(oid))
    }
}

fn split_restore_name(restore_name: &str) -> (&str, &str) {
    match restore_name.split_once(' ') {
        Some((schema, name)) => (schema, name),
        None => ("", restore_name),
    }
}
