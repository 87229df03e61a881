//! Source Object Catalog (spec.md §3): the list of tables and extensions
//! selected for migration, produced by catalog introspection external to
//! this crate and consumed here as plain data.

use serde::Deserialize;
use std::fmt;

/// A schema-qualified table name. Ported from the teacher's `table::Table`,
/// which carries the same `Option<schema>` + `name` shape for exactly this
/// purpose (quoting rules differ: catalog entries are always schema-qualified).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct QualifiedName {
    pub schema: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Double-quoted `"schema"."name"` form used in generated DDL.
    pub fn quoted(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SourceTable {
    pub oid: u32,
    pub name: QualifiedName,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ExtensionConfigTable {
    pub name: QualifiedName,
    pub where_clause: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SourceExtension {
    pub name: String,
    pub config: Vec<ExtensionConfigTable>,
}

/// The full selected-objects catalog the orchestrator plans against.
/// Produced externally by catalog introspection (spec.md §1 Out of scope)
/// and handed to this crate as a JSON file; `Deserialize` is how that
/// boundary is crossed, not a sign the catalog is built here.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SourceCatalog {
    #[serde(default)]
    pub tables: Vec<SourceTable>,
    #[serde(default)]
    pub extensions: Vec<SourceExtension>,
}

impl SourceCatalog {
    /// Reads a catalog JSON file produced by the external planner.
    pub fn read_from(path: &std::path::Path) -> crate::error::Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| crate::error::CopyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| crate::error::CopyError::ProtocolError(format!("malformed catalog file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_form_escapes_each_part() {
        let qn = QualifiedName::new("public", "accounts");
        assert_eq!(qn.quoted(), "\"public\".\"accounts\"");
        assert_eq!(qn.to_string(), "public.accounts");
    }

    #[test]
    fn reads_catalog_from_json_file() {
        let dir = std::env::temp_dir().join(format!("catalog-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalog.json");
        std::fs::write(
            &path,
            r#"{"tables":[{"oid":16386,"name":{"schema":"public","name":"accounts"}}],"extensions":[]}"#,
        )
        .unwrap();

        let catalog = SourceCatalog::read_from(&path).unwrap();
        assert_eq!(catalog.tables.len(), 1);
        assert_eq!(catalog.tables[0].oid, 16386);
        assert_eq!(catalog.tables[0].name.schema, "public");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_tables_and_extensions_default_to_empty() {
        let dir = std::env::temp_dir().join(format!("catalog-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalog.json");
        std::fs::write(&path, r#"{}"#).unwrap();

        let catalog = SourceCatalog::read_from(&path).unwrap();
        assert!(catalog.tables.is_empty());
        assert!(catalog.extensions.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
