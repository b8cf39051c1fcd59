//! Bulk import of legacy asset rows.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::{Asset, AssetFlags, AssetMetadata};
use crate::{CallbackError, IndexError, IndexResult, MetadataIndex};

/// Progress is logged every this many rows.
const PROGRESS_EVERY: usize = 1000;

/// Rows yielded one at a time by an [`ImportSource`].
pub type RowIter<'a> = Box<dyn Iterator<Item = IndexResult<Asset>> + 'a>;

/// A source of legacy rows, addressed by table name and row window.
pub trait ImportSource {
    /// Up to `count` rows of `table`, starting at row `start`.
    ///
    /// Rows are produced lazily so a large table is never held in memory.
    /// The outer error aborts the import (e.g. the table cannot be opened);
    /// an inner error marks a single unreadable row, which is counted as
    /// failed and skipped.
    fn rows(&self, table: &str, start: usize, count: usize) -> IndexResult<RowIter<'_>>;
}

/// Outcome of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Rows handed to the store callback successfully
    pub imported: u64,
    /// Rows skipped because the ID already existed
    pub skipped: u64,
    /// Unreadable rows and store failures
    pub failed: u64,
}

pub(crate) fn run_import<I: MetadataIndex + ?Sized>(
    index: &I,
    source: &dyn ImportSource,
    table: &str,
    start_offset: usize,
    count: usize,
    overwrite: bool,
    store: &mut dyn FnMut(Asset) -> Result<(), CallbackError>,
) -> IndexResult<ImportReport> {
    let started = Instant::now();
    let rows = source.rows(table, start_offset, count)?;
    info!(table, start_offset, count, overwrite, "Import started");

    let mut report = ImportReport::default();
    for (n, row) in rows.enumerate() {
        match row {
            Ok(asset) => {
                let id = asset.id();
                if !overwrite && index.get(&id)?.is_some() {
                    report.skipped += 1;
                } else {
                    match store(asset) {
                        Ok(()) => report.imported += 1,
                        Err(e) => {
                            warn!(%id, error = %e, "Import store failed");
                            report.failed += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable import row");
                report.failed += 1;
            }
        }

        if (n + 1) % PROGRESS_EVERY == 0 {
            info!(done = n + 1, failed = report.failed, "Import progress");
        }
    }

    info!(
        table,
        imported = report.imported,
        skipped = report.skipped,
        failed = report.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Import finished"
    );
    Ok(report)
}

/// Legacy rows stored as JSON lines: `<dir>/<table>.jsonl`.
///
/// Each line is one object; `data` holds the asset bytes hex-encoded.
///
/// ```text
/// {"id":"...","asset_type":0,"name":"tex","create_time":1700000000,"data":"ff4fff51"}
/// ```
#[derive(Debug, Clone)]
pub struct JsonlSource {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct JsonlRow {
    id: Uuid,
    #[serde(alias = "assetType", alias = "type")]
    asset_type: i8,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    flags: u32,
    #[serde(default, alias = "CreatorID")]
    creator_id: String,
    #[serde(default)]
    create_time: i64,
    #[serde(default)]
    access_time: i64,
    data: String,
}

impl JsonlSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// File backing `table`. Table names are restricted so they cannot
    /// name anything outside the source directory.
    pub fn table_path(&self, table: &str) -> IndexResult<PathBuf> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(IndexError::InvalidTable(table.to_string()));
        }
        Ok(self.dir.join(format!("{table}.jsonl")))
    }

    fn parse_row(table: &str, line_no: usize, line: &str) -> IndexResult<Asset> {
        let bad = |reason: String| IndexError::BadRow {
            table: table.to_string(),
            line: line_no,
            reason,
        };
        let row: JsonlRow = serde_json::from_str(line).map_err(|e| bad(e.to_string()))?;
        let data = hex::decode(row.data.trim()).map_err(|e| bad(format!("data: {e}")))?;
        Ok(Asset {
            metadata: AssetMetadata {
                id: row.id,
                asset_type: row.asset_type,
                name: row.name,
                description: row.description,
                content_type: row.content_type,
                flags: AssetFlags(row.flags),
                creator_id: row.creator_id,
                created: row.create_time,
                access_time: row.access_time,
            },
            data,
        })
    }
}

impl ImportSource for JsonlSource {
    fn rows(&self, table: &str, start: usize, count: usize) -> IndexResult<RowIter<'_>> {
        let reader = BufReader::new(File::open(self.table_path(table)?)?);
        let rows = JsonlRows {
            table: table.to_string(),
            lines: reader.lines(),
            line_no: 0,
            failed: false,
        };
        Ok(Box::new(rows.skip(start).take(count)))
    }
}

/// Lazy reader over a JSON lines table. Blank lines are not rows. A read
/// error is yielded once and ends the table.
struct JsonlRows {
    table: String,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    failed: bool,
}

impl Iterator for JsonlRows {
    type Item = IndexResult<Asset>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.line_no += 1;
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(JsonlSource::parse_row(&self.table, self.line_no, &line)),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryIndex;
    use tempfile::TempDir;

    fn row(id: Uuid, name: &str, data: &[u8]) -> String {
        format!(
            r#"{{"id":"{id}","asset_type":0,"name":"{name}","create_time":1700000000,"data":"{}"}}"#,
            hex::encode(data)
        )
    }

    fn write_table(dir: &Path, table: &str, lines: &[String]) {
        std::fs::write(dir.join(format!("{table}.jsonl")), lines.join("\n")).unwrap();
    }

    #[test]
    fn test_jsonl_rows_window() {
        let temp = TempDir::new().unwrap();
        let ids: Vec<_> = (0..5).map(|_| Uuid::new_v4()).collect();
        let lines: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| row(*id, &format!("a{i}"), &[i as u8]))
            .collect();
        write_table(temp.path(), "assets", &lines);

        let source = JsonlSource::new(temp.path());
        let rows = source.rows("assets", 1, 3).unwrap();
        let names: Vec<_> = rows
            .map(|r| r.unwrap().metadata.name)
            .collect();
        assert_eq!(names, vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn test_jsonl_bad_row_is_isolated() {
        let temp = TempDir::new().unwrap();
        let lines = vec![
            row(Uuid::new_v4(), "good", b"ok"),
            r#"{"id":"not-a-uuid","asset_type":0,"data":""}"#.to_string(),
            row(Uuid::new_v4(), "also-good", b"ok2"),
        ];
        write_table(temp.path(), "assets", &lines);

        let rows: Vec<_> = JsonlSource::new(temp.path())
            .rows("assets", 0, 10)
            .unwrap()
            .collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_ok());
        assert!(matches!(rows[1], Err(IndexError::BadRow { line: 2, .. })));
        assert!(rows[2].is_ok());
    }

    #[test]
    fn test_jsonl_rows_are_read_lazily() {
        let temp = TempDir::new().unwrap();
        let lines = vec![
            row(Uuid::new_v4(), "first", b"1"),
            String::new(),
            row(Uuid::new_v4(), "second", b"2"),
        ];
        write_table(temp.path(), "assets", &lines);

        let source = JsonlSource::new(temp.path());
        let mut rows = source.rows("assets", 0, usize::MAX).unwrap();
        assert_eq!(rows.next().unwrap().unwrap().metadata.name, "first");

        // Rows appended after the first read are still seen.
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(temp.path().join("assets.jsonl"))
            .unwrap();
        std::io::Write::write_all(&mut file, format!("\n{}", row(Uuid::new_v4(), "third", b"3")).as_bytes())
            .unwrap();
        drop(file);

        let rest: Vec<_> = rows.map(|r| r.unwrap().metadata.name).collect();
        assert_eq!(rest, vec!["second", "third"]);
    }

    #[test]
    fn test_table_name_cannot_escape() {
        let source = JsonlSource::new("/tmp");
        assert!(matches!(
            source.table_path("../etc/passwd"),
            Err(IndexError::InvalidTable(_))
        ));
        assert!(source.table_path("assets_2019").is_ok());
    }

    #[test]
    fn test_import_skips_existing_unless_overwrite() {
        let temp = TempDir::new().unwrap();
        let existing = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        write_table(
            temp.path(),
            "assets",
            &[row(existing, "old", b"1"), row(fresh, "new", b"2")],
        );

        let index = MemoryIndex::new();
        let mut meta = AssetMetadata::new(0, "old");
        meta.id = existing;
        index.put(&meta, &fsa_cas::compute_hash(b"1")).unwrap();

        let source = JsonlSource::new(temp.path());
        let mut stored = Vec::new();
        let report = index
            .import(&source, "assets", 0, 100, false, &mut |asset| {
                stored.push(asset.id());
                Ok(())
            })
            .unwrap();
        assert_eq!(
            report,
            ImportReport {
                imported: 1,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(stored, vec![fresh]);

        let report = index
            .import(&source, "assets", 0, 100, true, &mut |_| Ok(()))
            .unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_import_counts_store_failures() {
        let temp = TempDir::new().unwrap();
        write_table(temp.path(), "assets", &[row(Uuid::new_v4(), "x", b"x")]);

        let index = MemoryIndex::new();
        let report = index
            .import(&JsonlSource::new(temp.path()), "assets", 0, 10, false, &mut |_| {
                Err("disk full".into())
            })
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.imported, 0);
    }

    #[test]
    fn test_import_missing_table_errors() {
        let temp = TempDir::new().unwrap();
        let index = MemoryIndex::new();
        let result = index.import(&JsonlSource::new(temp.path()), "nope", 0, 10, false, &mut |_| Ok(()));
        assert!(matches!(result, Err(IndexError::Io(_))));
    }
}
