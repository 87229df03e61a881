//! CLI argument parsing. Flag catalog, help text, and pid-file/locking are
//! explicitly out of scope (spec.md §1) — this stays a thin `clap` derive
//! that lowers into a [`RunContext`], the same shape the teacher's `Args`
//! feeds straight into `Migration::new`.

use crate::filter::FilterSpec;
use crate::run_context::{RestoreOptions, RunContext};
use crate::workdir::WorkDir;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Source PostgreSQL connection URI
    #[arg(long)]
    pub source: String,

    /// Target PostgreSQL connection URI
    #[arg(long)]
    pub target: String,

    /// Work directory for dumps, lists, and done-markers
    #[arg(long, default_value = "./pgmigrate-work")]
    pub work_dir: String,

    /// Drop target tables (CASCADE) before restoring pre-data
    #[arg(long, default_value_t = false)]
    pub drop_if_exists: bool,

    #[arg(long = "include-only-schema")]
    pub include_only_schemas: Vec<String>,

    #[arg(long = "include-only-table")]
    pub include_only_tables: Vec<String>,

    #[arg(long = "exclude-schema")]
    pub exclude_schemas: Vec<String>,

    #[arg(long = "exclude-table")]
    pub exclude_tables: Vec<String>,

    /// Path to the source object catalog (produced by catalog introspection,
    /// external to this crate) as a JSON file
    #[arg(long)]
    pub catalog: Option<String>,

    /// Create each extension on the target before copying its config tables
    #[arg(long, default_value_t = false)]
    pub create_extensions: bool,

    /// Run the change-data-capture replay phase after the copy phase.
    /// The stop LSN itself is not a flag here: it's read from the source
    /// sentinel row (spec.md §3 "Sentinel Row... authoritative endpos"),
    /// which an external tool sets independently of this process.
    #[arg(long, default_value_t = false)]
    pub replay: bool,
}

pub fn get_args() -> Result<Args, clap::Error> {
    Args::try_parse()
}

impl From<&Args> for RunContext {
    fn from(args: &Args) -> Self {
        RunContext::new(
            WorkDir::new(args.work_dir.clone()),
            args.source.clone(),
            args.target.clone(),
            FilterSpec {
                include_only_schemas: args.include_only_schemas.clone(),
                include_only_tables: args.include_only_tables.clone(),
                exclude_schemas: args.exclude_schemas.clone(),
                exclude_tables: args.exclude_tables.clone(),
            },
            RestoreOptions {
                drop_if_exists: args.drop_if_exists,
            },
        )
    }
}
