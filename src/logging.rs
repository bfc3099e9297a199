//! Log file placement and rotation.
//!
//! stdout carries the protocol in stdio mode, so logs always go to a file.
//! The `tracing-subscriber` setup itself lives in `main.rs`.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Maximum size of a single log file before rotation (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to retain.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

const LOG_FILE_NAME: &str = "nsbridge.log";

/// `configured` if set, otherwise `nsbridge.log` under `log_dir`.
pub fn log_file_path(log_dir: &Path, configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(path) => path.to_path_buf(),
        None => log_dir.join(LOG_FILE_NAME),
    }
}

/// Ensure the parent directory of a log file exists.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Rotate log files when the current file exceeds `max_size` bytes.
///
/// ```text
///   nsbridge.log   → nsbridge.log.1
///   nsbridge.log.1 → nsbridge.log.2
///   …
///   nsbridge.log.<max_files> is deleted
/// ```
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    if !log_path.exists() {
        return Ok(());
    }
    if fs::metadata(log_path)?.len() < max_size {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }
    fs::rename(log_path, rotated_path(log_path, 1))?;
    Ok(())
}

/// Prepare and open the log file for appending, rotating it first if it
/// has grown too large.
pub fn open_log_file(log_path: &Path) -> io::Result<File> {
    ensure_log_dir(log_path)?;
    rotate_log_files(log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)?;
    OpenOptions::new().create(true).append(true).open(log_path)
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}.{}", name, index))
}
