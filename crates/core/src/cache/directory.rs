//! Cache directory location, permission checks and size reporting.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::Error;

/// Name of the tool, used for the cache and config directories.
pub const APP_DIR_NAME: &str = "arch-wiki-search";

/// Platform cache location for the tool.
///
/// `$XDG_CACHE_HOME` or `~/.cache` on Linux, `~/Library/Caches` on macOS,
/// `%LOCALAPPDATA%` on Windows. Falls back to the temp directory when the
/// platform reports no cache location.
pub fn default_cache_dir() -> PathBuf {
    platform_dir(dirs_next::cache_dir(), "cache")
}

/// Platform config location for the tool.
pub fn default_config_dir() -> PathBuf {
    platform_dir(dirs_next::config_dir(), "config")
}

fn platform_dir(base: Option<PathBuf>, kind: &str) -> PathBuf {
    match base {
        Some(base) => base.join(APP_DIR_NAME),
        None => {
            let fallback = std::env::temp_dir().join(APP_DIR_NAME);
            tracing::warn!(path = %fallback.display(), "no platform {kind} directory, using temp directory");
            fallback
        }
    }
}

/// Make sure `dir` exists and is writable, creating it if needed.
///
/// # Errors
///
/// Returns `Error::CacheDir` if the path exists but is not a writable
/// directory, or if it cannot be created.
pub fn prepare(dir: &Path) -> Result<(), Error> {
    if dir.is_dir() {
        probe_writable(dir)
            .map_err(|e| Error::CacheDir(format!("{} is not writable: {e}", dir.display())))?;
        tracing::debug!(path = %dir.display(), "cache directory exists and is writable");
        return Ok(());
    }

    fs::create_dir_all(dir).map_err(|e| Error::CacheDir(format!("failed to create {}: {e}", dir.display())))?;
    tracing::info!(path = %dir.display(), "created cache directory");
    Ok(())
}

fn probe_writable(dir: &Path) -> io::Result<()> {
    let probe = dir.join(format!(".write-probe-{}", std::process::id()));
    OpenOptions::new().write(true).create_new(true).open(&probe)?;
    fs::remove_file(&probe)
}

/// Total size in bytes of all files below `dir`.
///
/// Blocking; run it on a blocking thread from async code.
pub fn size_on_disk(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Human readable byte count, e.g. `1.50MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in &UNITS[..UNITS.len() - 1] {
        if size < 1024.0 {
            return format!("{size:.2}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2}{}", UNITS[UNITS.len() - 1])
}
