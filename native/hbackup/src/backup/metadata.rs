use std::error::Error;

use anyhow::{Context, Result, bail};
use forensic_adb::UnixPathBuf;
use lazy_regex::{Lazy, Regex, lazy_regex};
use tracing::{debug, instrument, warn};

use super::{DeviceTransport, command::ShellCommand};
use crate::{adb::PackageName, models::DeviceMetadata};

static VERSION_NAME_REGEX: Lazy<Regex> = lazy_regex!(r"versionName=(.*)");

/// Extracts the first `versionName=` value from `dumpsys package` output
fn parse_version_name(dumpsys_output: &str) -> Option<String> {
    VERSION_NAME_REGEX
        .captures(dumpsys_output)
        .map(|caps| caps[1].trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Extracts the first APK path from `pm path` output
fn parse_apk_path(pm_output: &str) -> Option<&str> {
    pm_output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::trim)
        .find(|p| !p.is_empty())
}

/// Queries the package version name and device model.
///
/// Either value is left empty when its query fails; this never aborts a backup.
#[instrument(level = "debug", skip(device), ret)]
pub async fn query_device_metadata<T: DeviceTransport + ?Sized>(
    device: &T,
    package: &PackageName,
) -> DeviceMetadata {
    let dumpsys = ShellCommand::new("dumpsys").arg("package").arg(package.as_str());
    let version_name = match device.shell(&format!("{dumpsys} | grep versionName")).await {
        Ok(output) => parse_version_name(&output).unwrap_or_else(|| {
            warn!(output = output.trim(), "No versionName in dumpsys output");
            String::new()
        }),
        Err(e) => {
            warn!(error = e.as_ref() as &dyn Error, "Failed to query version name");
            String::new()
        }
    };

    let getprop = ShellCommand::new("getprop").arg("ro.product.model");
    let model = match device.shell(&getprop.render()).await {
        Ok(output) => output.trim().to_string(),
        Err(e) => {
            warn!(error = e.as_ref() as &dyn Error, "Failed to query device model");
            String::new()
        }
    };

    DeviceMetadata { version_name, model }
}

/// Gets APK path reported by `pm path <package>`
#[instrument(level = "debug", skip(device), err)]
pub async fn query_apk_path<T: DeviceTransport + ?Sized>(
    device: &T,
    package: &PackageName,
) -> Result<UnixPathBuf> {
    let pm_path = ShellCommand::new("pm").arg("path").arg(package.as_str());
    let output = device.shell(&pm_path.render()).await.context("Failed to run 'pm path'")?;
    match parse_apk_path(&output) {
        Some(path) => {
            debug!(path, "Found APK path");
            Ok(UnixPathBuf::from(path))
        }
        None => bail!("Failed to parse APK path for package '{package}': {output}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::testing::FakeDevice;

    fn package() -> PackageName {
        PackageName::parse("com.example.app").unwrap()
    }

    #[test]
    fn version_name_from_dumpsys() {
        let output = "    versionName=1.2 3\n    versionName=1.1\n";
        assert_eq!(parse_version_name(output).as_deref(), Some("1.2 3"));
        assert_eq!(parse_version_name("      versionName=\n"), None);
        assert_eq!(parse_version_name(""), None);
    }

    #[test]
    fn apk_path_from_pm_output() {
        let output = "package:/data/app/~~Xy==/com.example.app-Ab==/base.apk\n\
                      package:/data/app/~~Xy==/com.example.app-Ab==/split_config.arm64_v8a.apk\n";
        assert_eq!(parse_apk_path(output), Some("/data/app/~~Xy==/com.example.app-Ab==/base.apk"));
        assert_eq!(parse_apk_path("package:\n"), None);
        assert_eq!(parse_apk_path(""), None);
    }

    #[tokio::test]
    async fn metadata_is_read_from_the_device() {
        let device = FakeDevice::with_metadata("1.2 3", "Pixel 5");
        let metadata = query_device_metadata(&device, &package()).await;
        assert_eq!(metadata.version_name, "1.2 3");
        assert_eq!(metadata.model, "Pixel 5");
        assert_eq!(
            device.shell_calls(),
            ["dumpsys package com.example.app | grep versionName", "getprop ro.product.model"]
        );
    }

    #[test_log::test(tokio::test)]
    async fn metadata_failures_degrade_to_empty_strings() {
        let device = FakeDevice::new()
            .fail_on("dumpsys", "exit code 1")
            .fail_on("getprop", "device offline");
        let metadata = query_device_metadata(&device, &package()).await;
        assert_eq!(metadata, DeviceMetadata::default());
    }

    #[tokio::test]
    async fn apk_path_query_errors_are_reported() {
        let device = FakeDevice::new().respond("pm path", "");
        let err = query_apk_path(&device, &package()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse APK path"));

        let device = FakeDevice::new().fail_on("pm path", "Error: package not found");
        let err = query_apk_path(&device, &package()).await.unwrap_err();
        assert!(format!("{err:#}").contains("package not found"));
    }
}
