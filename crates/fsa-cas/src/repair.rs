//! Chicken-bone repair.
//!
//! Stores migrated from flat legacy layouts occasionally contain a plain file
//! where the sharder now needs a directory, which makes `create_dir_all`
//! fail for every blob below that segment.

use std::fs;
use std::path::Path;

use tracing::{error, warn};

/// Locate and remove a plain file blocking creation of `failed`.
///
/// Walks upward from `failed`, creating each ancestor in turn. The first
/// ancestor that can be created identifies its child on the walk as the
/// offending segment; that child is removed only if it is not a directory.
/// The walk never leaves `root`.
///
/// Returns `true` when a blocking file was removed and the caller should
/// retry its directory creation once.
pub(crate) fn clear_blocking_file(root: &Path, failed: &Path) -> bool {
    let mut child = failed;

    for ancestor in failed.ancestors().skip(1) {
        if !ancestor.starts_with(root) {
            break;
        }

        if fs::create_dir_all(ancestor).is_ok() {
            return match fs::symlink_metadata(child) {
                Ok(meta) if !meta.is_dir() => match fs::remove_file(child) {
                    Ok(()) => {
                        warn!(path = %child.display(), "Removed file blocking shard directory");
                        true
                    }
                    Err(e) => {
                        error!(path = %child.display(), error = %e, "Failed to remove blocking file");
                        false
                    }
                },
                _ => false,
            };
        }

        child = ancestor;
    }

    false
}
