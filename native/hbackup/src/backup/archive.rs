use forensic_adb::{UnixPath, UnixPathBuf};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::{adb::PackageName, models::Compression};

const ARCHIVE_PREFIX: &str = "HBackup";
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Makes a device-reported value usable as part of a file name.
///
/// Characters that are invalid in file names are dropped and spaces become hyphens.
pub fn sanitize_component(value: &str) -> String {
    sanitize_filename::sanitize(value.trim()).replace(' ', "-")
}

/// Current local time, or UTC when the local offset cannot be determined
pub fn local_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Temporary archive location on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePath {
    remote: UnixPathBuf,
    file_name: String,
}

impl ArchivePath {
    /// `<remote_dir>/HBackup_<package>_<version>_<model>_<YYYYMMDDhhmmss><ext>`
    ///
    /// `version` and `model` are expected to be sanitized already.
    pub fn new(
        remote_dir: &UnixPath,
        package: &PackageName,
        version: &str,
        model: &str,
        compression: Compression,
        timestamp: OffsetDateTime,
    ) -> Self {
        let timestamp =
            timestamp.format(TIMESTAMP_FORMAT).unwrap_or_else(|_| "00000000000000".into());
        let file_name = format!(
            "{ARCHIVE_PREFIX}_{package}_{version}_{model}_{timestamp}{}",
            compression.extension()
        );
        Self { remote: remote_dir.join(&file_name), file_name }
    }

    pub fn remote(&self) -> &UnixPath {
        &self.remote
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}
