use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::instrument;

/// Resolves a binary from an explicit path override, falling back to a `PATH` lookup of `name`.
///
/// An override that is not an existing file is itself looked up in `PATH`, so bare names such as
/// `adb.exe` work too.
#[instrument(level = "debug", ret, err)]
pub fn resolve_binary_path(explicit: Option<&str>, name: &str) -> Result<PathBuf> {
    match explicit.filter(|p| !p.is_empty()) {
        Some(path) => {
            let path = Path::new(path);
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            which::which(path)
                .with_context(|| format!("{name} binary not found at '{}'", path.display()))
        }
        None => which::which(name).with_context(|| format!("{name} binary not found in PATH")),
    }
}
