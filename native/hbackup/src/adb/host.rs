use std::{error::Error, path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use forensic_adb::{DeviceInfo, DeviceState};
use tokio::{process::Command, time::timeout};
use tracing::{debug, error, info, instrument, warn};

use super::device::AdbDevice;
use crate::utils::resolve_binary_path;

const SERVER_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const SERVER_START_TIMEOUT: Duration = Duration::from_secs(10);

/// Local ADB server plus the binary used to start it
#[derive(Debug, Clone)]
pub struct AdbHost {
    server: forensic_adb::Host,
    /// Explicit `adb` binary; `None` means `PATH`
    adb_path: Option<String>,
}

impl AdbHost {
    pub fn new(adb_path: Option<String>) -> Self {
        // "localhost" may resolve to an address the server doesn't listen on under Windows
        let server = if cfg!(target_os = "windows") {
            forensic_adb::Host { host: Some("127.0.0.1".to_string()), port: Some(5037) }
        } else {
            forensic_adb::Host::default()
        };
        Self { server, adb_path: adb_path.filter(|p| !p.is_empty()) }
    }

    /// Starts the ADB server unless one already answers
    #[instrument(level = "debug", skip(self), err)]
    pub async fn ensure_server_running(&self) -> Result<()> {
        if self.is_server_running().await {
            return Ok(());
        }
        let adb = resolve_binary_path(self.adb_path.as_deref(), "adb")
            .context("Cannot start the ADB server")?;
        info!(adb = %adb.display(), "No ADB server answering, starting one");
        start_server(&adb).await
    }

    #[instrument(level = "debug", skip(self), ret)]
    async fn is_server_running(&self) -> bool {
        match timeout(SERVER_PROBE_TIMEOUT, self.server.check_host_running()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(error = &e as &dyn Error, "ADB server probe failed");
                false
            }
            Err(_) => {
                debug!("ADB server probe timed out");
                false
            }
        }
    }

    /// Connects to the device with `serial`, or to the only online device when `serial` is `None`
    #[instrument(skip(self), err)]
    pub async fn connect(&self, serial: Option<&str>) -> Result<AdbDevice> {
        self.ensure_server_running().await?;

        let devices: Vec<DeviceInfo> =
            self.server.devices().await.context("Failed to list ADB devices")?;
        debug!(count = devices.len(), "Listed devices");
        let selected = select_device(devices, serial)?;

        info!(serial = %selected.serial, "Opening device");
        let inner = forensic_adb::Device::new(
            self.server.clone(),
            selected.serial.clone(),
            selected.info.clone(),
        )
        .await
        .inspect_err(|e| {
            error!(error = e as &dyn Error, serial = %selected.serial, "Failed to open device")
        })
        .with_context(|| format!("Failed to connect to device {}", selected.serial))?;

        let device = AdbDevice::new(inner);
        info!(%device, "Connected");
        Ok(device)
    }
}

async fn start_server(adb: &Path) -> Result<()> {
    let mut command = Command::new(adb);
    command.arg("start-server");
    #[cfg(target_os = "windows")]
    command.creation_flags(0x08000000); // CREATE_NO_WINDOW

    let output = timeout(SERVER_START_TIMEOUT, command.output())
        .await
        .context("Timed out starting the ADB server")?
        .context("Failed to run 'adb start-server'")?;
    if !output.status.success() {
        bail!("'adb start-server' failed: {}", String::from_utf8_lossy(&output.stderr).trim());
    }
    info!("ADB server started");
    Ok(())
}

/// Picks the target out of the server's device list
fn select_device(devices: Vec<DeviceInfo>, serial: Option<&str>) -> Result<DeviceInfo> {
    match serial {
        Some(serial) => {
            let device = devices
                .into_iter()
                .find(|d| d.serial == serial)
                .with_context(|| format!("Device {serial} is not attached"))?;
            match device.state {
                DeviceState::Device => Ok(device),
                DeviceState::Unauthorized => {
                    bail!("Device {serial} is unauthorized, accept the USB debugging prompt")
                }
                ref other => bail!("Device {serial} is not ready (state: {other:?})"),
            }
        }
        None => {
            let mut online: Vec<_> =
                devices.into_iter().filter(|d| d.state == DeviceState::Device).collect();
            match online.len() {
                0 => bail!("No online devices"),
                1 => Ok(online.remove(0)),
                n => {
                    warn!(count = n, "Several devices online and no serial given");
                    bail!("{n} devices online, select one with --serial or ANDROID_SERIAL")
                }
            }
        }
    }
}
