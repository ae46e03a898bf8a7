use std::{error::Error, path::PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::{
    BackupConfig, DeviceTransport,
    archive::local_timestamp,
    cleanup::CleanupStack,
    metadata::{query_apk_path, query_device_metadata},
    plan::{BackupPlan, Resource, StepKind},
};
use crate::models::BackupRequest;

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Why a backup failed. The source carries the device or transport diagnostics.
#[derive(Debug, Error)]
pub enum BackupError {
    /// A device command failed or the device could not be reached
    #[error("device command failed during {step}")]
    Transport {
        step: StepKind,
        #[source]
        source: BoxError,
    },

    /// The installed APK could not be located
    #[error("failed to query the APK path of {package}")]
    Query {
        package: String,
        #[source]
        source: BoxError,
    },

    /// The archive could not be copied to the host
    #[error("failed to pull {remote}")]
    Pull {
        remote: String,
        #[source]
        source: BoxError,
    },

    /// The archive was pulled but could not be deleted from the device
    #[error("failed to delete {remote} from the device")]
    Cleanup {
        remote: String,
        #[source]
        source: BoxError,
    },
}

/// Runs app data backups against a device
#[derive(Debug)]
pub struct BackupOrchestrator<T> {
    device: T,
}

impl<T: DeviceTransport> BackupOrchestrator<T> {
    pub fn new(device: T) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &T {
        &self.device
    }

    /// Backs up the private and external data of `request.package` and returns the host path
    /// of the pulled archive.
    ///
    /// Nothing is changed on the device before the APK path (if requested) is known. When a
    /// device step fails and `config.cleanup_on_failure` is set, temporary links and the device
    /// archive are removed again before the error is returned.
    #[instrument(skip(self, config, request), fields(package = %request.package), err)]
    pub async fn backup(
        &self,
        config: &BackupConfig,
        request: &BackupRequest,
    ) -> Result<PathBuf, BackupError> {
        info!(package = %request.package, "Creating app backup");
        let metadata = query_device_metadata(&self.device, &request.package).await;

        let apk_path = if request.include_apk {
            let path = query_apk_path(&self.device, &request.package).await.map_err(|e| {
                BackupError::Query { package: request.package.to_string(), source: e.into() }
            })?;
            info!(path = %path.display(), "APK path");
            Some(path)
        } else {
            None
        };

        let plan = BackupPlan::build(
            config,
            request,
            &metadata,
            apk_path.as_deref(),
            local_timestamp(),
        );
        info!(
            archive = %plan.archive.remote().display(),
            steps = plan.steps.len(),
            "Built backup plan"
        );

        let mut cleanup = CleanupStack::default();
        let result = self.execute(&plan, config, &mut cleanup).await;
        match &result {
            Err(e) if !cleanup.is_empty() && config.cleanup_on_failure => {
                warn!(error = e as &dyn Error, "Backup failed, removing temporary device files");
                cleanup.unwind(&self.device).await;
            }
            Err(_) if !cleanup.is_empty() => {
                warn!(
                    held = ?cleanup.held(),
                    "Backup failed, leaving temporary device files in place"
                );
            }
            _ => {}
        }
        result
    }

    async fn execute(
        &self,
        plan: &BackupPlan,
        config: &BackupConfig,
        cleanup: &mut CleanupStack,
    ) -> Result<PathBuf, BackupError> {
        for step in &plan.steps {
            debug!(step = %step.kind, command = %step.command, "Running backup step");
            cleanup.before_step(&step.effect);
            let output = self
                .device
                .shell(&step.command.as_root())
                .await
                .map_err(|e| BackupError::Transport { step: step.kind, source: e.into() })?;
            if !output.trim().is_empty() {
                debug!(output = output.trim(), "Step output");
            }
            cleanup.after_step(&step.effect);
        }

        let remote = plan.archive.remote();
        let local = self.device.pull(remote, &config.output_dir).await.map_err(|e| {
            BackupError::Pull { remote: remote.display().to_string(), source: e.into() }
        })?;
        info!(path = %local.display(), "Pulled archive");

        // Deleted once, even if this fails
        cleanup.release(Resource::Archive);
        self.device.shell(&plan.delete_archive.as_root()).await.map_err(|e| {
            BackupError::Cleanup { remote: remote.display().to_string(), source: e.into() }
        })?;
        info!(path = %local.display(), "Backup created successfully");
        Ok(local)
    }
}
