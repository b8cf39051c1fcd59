//! Single-shot admin commands over an open store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use console::style;
use fsa_config::log_cli_info;
use fsa_index::{type_name, Asset};
use fsa_service::AssetStoreService;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct PutArgs {
    /// File to store
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Asset name (default: the file name)
    #[arg(long)]
    name: Option<String>,

    /// Asset type code
    #[arg(long = "type", default_value_t = 0)]
    asset_type: i8,

    #[arg(long, default_value = "")]
    description: String,

    /// MIME type (default: derived from the asset type)
    #[arg(long)]
    content_type: Option<String>,
}

pub fn count(service: &AssetStoreService) -> Result<()> {
    println!("{}", service.count()?);
    Ok(())
}

pub fn show(service: &AssetStoreService, id: &str) -> Result<()> {
    let Some(digest) = service.digest(id)? else {
        bail!("Asset {id} not found");
    };
    let meta = &digest.entry.metadata;

    println!();
    println!("  {} {}", style("Asset").bold(), style(meta.id).cyan());
    println!("    Name:         {}", meta.name);
    if !meta.description.is_empty() {
        println!("    Description:  {}", meta.description);
    }
    println!("    Type:         {} ({})", type_name(meta.asset_type), meta.asset_type);
    println!("    Content type: {}", meta.content_type);
    println!("    Flags:        {}", meta.flags);
    if !meta.creator_id.is_empty() {
        println!("    Creator:      {}", meta.creator_id);
    }
    println!("    Created:      {}", format_time(meta.created));
    println!("    Accessed:     {}", format_time(meta.access_time));
    println!();
    println!("  {}", style("Content").bold());
    println!("    Hash:         {}", digest.entry.hash);
    println!("    References:   {}", digest.references);
    println!(
        "    Tier:         {}",
        match (digest.spooled, digest.committed) {
            (true, true) => style("spooled + committed").yellow(),
            (true, false) => style("spooled").yellow(),
            (false, true) => style("committed").green(),
            (false, false) => style("missing").red(),
        }
    );
    match digest.size {
        Some(size) => println!("    Size:         {size} bytes"),
        None => println!("    Size:         {}", style("unreadable").red()),
    }
    if !digest.preview.is_empty() {
        println!("    Preview:      {}", digest.preview);
    }
    println!();
    Ok(())
}

pub fn delete(service: &AssetStoreService, id: &str) -> Result<()> {
    if !service.delete(id) {
        bail!("Asset {id} not found");
    }
    log_cli_info!("Deleted asset", id = id);
    println!("Deleted {id}");
    Ok(())
}

pub fn put(service: &AssetStoreService, args: PutArgs) -> Result<()> {
    let data = fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let name = args.name.unwrap_or_else(|| {
        args.file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let mut asset = Asset::new(args.asset_type, name, data);
    asset.metadata.description = args.description;
    if let Some(content_type) = args.content_type {
        asset.metadata.content_type = content_type;
    }

    let id = service.store(asset)?;
    println!("{id}");
    Ok(())
}

pub fn get(service: &AssetStoreService, id: &str, output: Option<&Path>) -> Result<()> {
    let Some(data) = service.get_data(id) else {
        bail!("Asset {id} not found");
    };
    match output {
        Some(path) => {
            fs::write(path, &data).with_context(|| format!("Failed to write {}", path.display()))?
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub fn compact(service: &AssetStoreService) -> Result<()> {
    let report = service.compact_now()?;
    println!(
        "Compacted {} blobs ({} moved, {} already committed, {} failed) in {:.2?}",
        report.scanned, report.moved, report.deduplicated, report.failed, report.elapsed
    );
    if report.failed > 0 {
        bail!("{} blobs could not be committed; see log", report.failed);
    }
    Ok(())
}

#[derive(Serialize)]
struct StatsOutput {
    assets: u64,
    committed_blobs: u64,
    committed_bytes: u64,
    spooled_blobs: u64,
    spooled_bytes: u64,
}

pub fn stats(service: &AssetStoreService, json: bool) -> Result<()> {
    let blobs = service.blob_stats()?;
    let output = StatsOutput {
        assets: service.count()?,
        committed_blobs: blobs.committed_blobs,
        committed_bytes: blobs.committed_bytes,
        spooled_blobs: blobs.spooled_blobs,
        spooled_bytes: blobs.spooled_bytes,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("FSAssets Store").bold());
    println!("    Base:       {}", service.blob_store().base().display());
    println!("    Layout:     {}", service.blob_store().layout());
    println!("    Assets:     {}", output.assets);
    println!(
        "    Committed:  {} blobs, {}",
        output.committed_blobs,
        format_bytes(output.committed_bytes)
    );
    println!(
        "    Spooled:    {} blobs, {}",
        output.spooled_blobs,
        format_bytes(output.spooled_bytes)
    );
    println!();
    Ok(())
}

fn format_time(unix: i64) -> String {
    if unix == 0 {
        return "-".to_string();
    }
    DateTime::<Utc>::from_timestamp(unix, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix.to_string())
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
