//! Write-then-rename file replacement

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replaces `path` with `contents` so readers only ever see the old or the new file
///
/// The data is written and synced to a sibling temporary file first, then
/// renamed over the target. The temporary file is removed if the rename fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;

    let tmp_path = temp_path(path);
    let mut tmp = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    tmp.write_all(contents)?;
    tmp.sync_all()?;
    drop(tmp);

    // Windows refuses to rename over an existing file
    if cfg!(target_os = "windows") && path.exists() {
        fs::remove_file(path)?;
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    Ok(())
}

/// Creates the directory a file will live in, if it has one
pub(crate) fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
