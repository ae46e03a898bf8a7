use std::{
    error::Error,
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail, ensure};
use async_trait::async_trait;
use derive_more::Debug;
use forensic_adb::{Device, UnixFileStatus, UnixPath};
use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt},
};
use tracing::{debug, error, instrument, trace, warn};

use crate::backup::DeviceTransport;

/// An opened device on the local ADB server
#[derive(Debug, Clone)]
pub struct AdbDevice {
    #[debug(skip)]
    pub inner: Device,
    /// `product:` field from `adb devices -l`
    pub product: Option<String>,
    /// ADB serial, `host:port` for network devices
    pub serial: String,
}

impl fmt::Display for AdbDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.product.as_deref().unwrap_or("Unknown"), self.serial)
    }
}

impl AdbDevice {
    /// Wraps a connected `forensic_adb` device
    pub(super) fn new(inner: Device) -> Self {
        let serial = inner.serial.clone();
        let product = inner.info.get("product").map(ToString::to_string);
        Self { inner, product, serial }
    }

    /// Runs `command` with `adb shell` semantics; the exit status is not checked
    #[instrument(level = "debug", skip(self), err)]
    pub async fn shell(&self, command: &str) -> Result<String> {
        let output = self
            .inner
            .execute_host_shell_command(command)
            .await
            .with_context(|| format!("Failed to run '{command}' on {}", self.serial))?;
        trace!(output = output.as_str(), "Shell output");
        Ok(output)
    }

    /// Like [`Self::shell`], but a non-zero exit status is an error carrying the output.
    ///
    /// The status is echoed on a line of its own after the command output.
    #[instrument(level = "debug", skip(self), err, ret)]
    pub async fn shell_checked(&self, command: &str) -> Result<String> {
        let raw = self.shell(&format!("{command} ; printf '\\n%s' $?")).await?;
        let (output, exit_code) = split_exit_code(&raw)
            .with_context(|| format!("No exit status in output of '{command}'"))?;
        if exit_code != "0" {
            error!(exit_code, output, "Device command failed");
            bail!("Command {command} failed with exit code {exit_code}. Output: {output}");
        }
        Ok(output.to_string())
    }

    /// Host file a pull of `remote` into `dest` writes to, following `adb pull`: a directory
    /// receives the remote file name, anything else is taken as the file path itself.
    #[instrument(level = "debug", ret, err)]
    fn pull_destination(remote: &UnixPath, dest: &Path) -> Result<PathBuf> {
        let name = remote
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("'{}' has no usable file name", remote.display()))?;

        if dest.is_dir() {
            return Ok(dest.join(name));
        }
        let parent = dest.parent().with_context(|| format!("Bad pull target {}", dest.display()))?;
        ensure!(
            parent.as_os_str().is_empty() || parent.is_dir(),
            "Directory {} does not exist",
            parent.display()
        );
        Ok(dest.to_path_buf())
    }

    /// Copies the regular file `remote` to `dest` (a directory or file path) and returns the
    /// host path written. A partially written file is removed when the transfer fails.
    #[instrument(level = "debug", skip(self), err)]
    pub async fn pull(&self, remote: &UnixPath, dest: &Path) -> Result<PathBuf> {
        let stat = self
            .inner
            .stat(remote)
            .await
            .with_context(|| format!("Failed to stat {}", remote.display()))?;
        ensure!(
            stat.file_mode == UnixFileStatus::RegularFile,
            "{} is not a regular file",
            remote.display()
        );

        let dest_path = Self::pull_destination(remote, dest)?;
        debug!(remote = %remote.display(), dest = %dest_path.display(), "Pulling");
        let mut file = File::create(&dest_path)
            .await
            .with_context(|| format!("Failed to create {}", dest_path.display()))?;
        let pulled = self
            .inner
            .pull(remote, &mut file)
            .await
            .map(|_| ())
            .with_context(|| format!("Failed to pull {}", remote.display()));
        finish_pull(file, &dest_path, pulled).await?;
        Ok(dest_path)
    }
}

/// Flushes the host file after a pull. The partial file at `path` is removed when either the
/// transfer or the flush failed.
async fn finish_pull<W: AsyncWrite + Unpin>(
    mut writer: W,
    path: &Path,
    pulled: Result<()>,
) -> Result<()> {
    let result = match pulled {
        Ok(()) => {
            writer.flush().await.with_context(|| format!("Failed to write {}", path.display()))
        }
        Err(e) => Err(e),
    };
    if result.is_err() {
        drop(writer);
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!(
                error = &remove_err as &dyn Error,
                path = %path.display(),
                "Failed to remove partial file"
            );
        }
    }
    result
}

#[async_trait]
impl DeviceTransport for AdbDevice {
    async fn shell(&self, command: &str) -> Result<String> {
        self.shell_checked(command).await
    }

    async fn pull(&self, remote: &UnixPath, local: &Path) -> Result<PathBuf> {
        AdbDevice::pull(self, remote, local).await
    }
}

/// Splits the output of a checked shell command into the command output and its exit status.
fn split_exit_code(shell_output: &str) -> Result<(&str, &str)> {
    match shell_output.rsplit_once('\n') {
        Some(parts) => Ok(parts),
        None => {
            let trimmed = shell_output.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                Ok(("", trimmed))
            } else {
                Err(anyhow!("Failed to extract exit code"))
            }
        }
    }
}
