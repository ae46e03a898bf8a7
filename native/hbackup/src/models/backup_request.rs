use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::adb::PackageName;

/// Archive format produced on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Plain tar
    #[default]
    None,
    /// Gzip-compressed tar
    Gzip,
    /// Zip archive
    Zip,
}

impl Compression {
    /// File extension including the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            Compression::None => ".tar",
            Compression::Gzip => ".tar.gz",
            Compression::Zip => ".zip",
        }
    }
}

/// What to back up, built once per invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub package: PackageName,
    /// Device to target; `None` means the only online device
    pub device_serial: Option<String>,
    /// Stop the app before archiving and again afterwards
    pub force_stop: bool,
    /// Add the installed APK to the archive
    pub include_apk: bool,
    pub compression: Compression,
}

impl BackupRequest {
    pub fn new(package: PackageName) -> Self {
        Self {
            package,
            device_serial: None,
            force_stop: true,
            include_apk: false,
            compression: Compression::None,
        }
    }
}
