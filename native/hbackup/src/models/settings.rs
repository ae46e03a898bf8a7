use serde::{Deserialize, Serialize};

use super::Compression;

/// Defaults for every command line option, read from `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// ADB binary; empty means search `PATH`
    pub adb_path: String,
    /// On-device busybox used as a prefix for file utilities; empty means none
    pub busybox_path: String,
    /// Device directory the archive is written to before pulling
    pub remote_dir: String,
    /// Host directory the archive is pulled into; empty means the working directory
    pub output_dir: String,
    pub force_stop: bool,
    pub backup_apk: bool,
    pub compression: Compression,
    /// Remove temporary links and the device archive when a step fails
    pub cleanup_on_failure: bool,
    /// Directory for rolling log files; empty disables file logging
    pub log_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adb_path: "".to_string(),
            busybox_path: "".to_string(),
            remote_dir: "/data/local/tmp".to_string(),
            output_dir: "".to_string(),
            force_stop: true,
            backup_apk: false,
            compression: Compression::None,
            cleanup_on_failure: true,
            log_dir: "".to_string(),
        }
    }
}
