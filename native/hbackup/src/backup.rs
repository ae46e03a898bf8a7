//! On-device backup of an app's private data directory.
//!
//! A backup is a fixed sequence of root shell commands ([`BackupPlan`]) that links the app's
//! external data next to its private data, archives both into a temporary device file and
//! removes the links again. The archive is then pulled to the host and deleted from the device.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use forensic_adb::{UnixPath, UnixPathBuf};

mod archive;
mod cleanup;
mod command;
mod metadata;
mod orchestrator;
mod plan;
#[cfg(test)]
mod testing;

pub use archive::{ArchivePath, local_timestamp, sanitize_component};
pub use command::{ShellCommand, quote};
pub use metadata::{query_apk_path, query_device_metadata};
pub use orchestrator::{BackupError, BackupOrchestrator};
pub use plan::{BackupPlan, Effect, RemoteStep, Resource, StepKind};

/// Request/response access to a device.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Runs `command` in the device shell and returns its output.
    /// A non-zero exit status is an error.
    async fn shell(&self, command: &str) -> Result<String>;

    /// Copies the remote file `remote` into the local directory (or file path) `local`
    /// and returns where it was written.
    async fn pull(&self, remote: &UnixPath, local: &Path) -> Result<PathBuf>;
}

/// Settings that stay fixed for a whole backup run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    /// Device directory the archive is written to
    pub remote_dir: UnixPathBuf,
    /// Busybox binary prefixed to file utilities (`rm`, `ln`, `tar`, `zip`, `chown`)
    pub busybox: Option<String>,
    /// Host directory the archive is pulled into
    pub output_dir: PathBuf,
    /// Remove links and the device archive left behind by a failed run
    pub cleanup_on_failure: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            remote_dir: UnixPathBuf::from("/data/local/tmp"),
            busybox: None,
            output_dir: PathBuf::from("."),
            cleanup_on_failure: true,
        }
    }
}
