//! `fsa import`: bulk-load legacy rows through the store path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fsa_index::JsonlSource;
use fsa_service::AssetStoreService;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Directory holding <TABLE>.jsonl
    #[arg(value_name = "DIR")]
    dir: PathBuf,

    /// Table name
    #[arg(value_name = "TABLE")]
    table: String,

    /// First row to import
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Maximum number of rows
    #[arg(long, default_value_t = usize::MAX)]
    count: usize,

    /// Re-store rows whose ID already exists
    #[arg(long)]
    overwrite: bool,
}

pub fn run(service: &AssetStoreService, args: ImportArgs) -> Result<()> {
    let source = JsonlSource::new(&args.dir);
    let report = service
        .import(&source, &args.table, args.start, args.count, args.overwrite)
        .with_context(|| format!("Import of {} from {} failed", args.table, args.dir.display()))?;

    println!(
        "Imported {} assets ({} skipped, {} failed)",
        report.imported, report.skipped, report.failed
    );
    Ok(())
}
