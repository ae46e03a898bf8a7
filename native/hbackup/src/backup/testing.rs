//! Scripted stand-in for a device, recording every request it receives.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use forensic_adb::UnixPath;

use super::DeviceTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Shell(String),
    Pull { remote: String, local: PathBuf },
}

/// Answers shell commands from a list of `(needle, outcome)` rules; the first rule whose needle
/// occurs in the command wins and unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub(crate) struct FakeDevice {
    rules: Vec<(String, Result<String, String>)>,
    pull_error: Option<String>,
    calls: Mutex<Vec<Call>>,
}

impl FakeDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A device reporting the given package version and model
    pub(crate) fn with_metadata(version_name: &str, model: &str) -> Self {
        Self::new()
            .respond("dumpsys package", &format!("    versionName={version_name}\n"))
            .respond("getprop ro.product.model", &format!("{model}\n"))
    }

    pub(crate) fn respond(mut self, needle: &str, output: &str) -> Self {
        self.rules.push((needle.to_owned(), Ok(output.to_owned())));
        self
    }

    pub(crate) fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.rules.push((needle.to_owned(), Err(message.to_owned())));
        self
    }

    pub(crate) fn fail_pull(mut self, message: &str) -> Self {
        self.pull_error = Some(message.to_owned());
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn shell_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Shell(command) => Some(command),
                Call::Pull { .. } => None,
            })
            .collect()
    }

    /// Shell calls that were run through `su -c`
    pub(crate) fn root_calls(&self) -> Vec<String> {
        self.shell_calls().into_iter().filter(|c| c.starts_with("su -c ")).collect()
    }
}

#[async_trait]
impl DeviceTransport for FakeDevice {
    async fn shell(&self, command: &str) -> Result<String> {
        self.calls.lock().unwrap().push(Call::Shell(command.to_owned()));
        match self.rules.iter().find(|(needle, _)| command.contains(needle.as_str())) {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(message))) => {
                bail!("Command {command} failed with exit code 1. Output: {message}")
            }
            None => Ok(String::new()),
        }
    }

    async fn pull(&self, remote: &UnixPath, local: &Path) -> Result<PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Pull { remote: remote.display().to_string(), local: local.to_owned() });
        if let Some(message) = &self.pull_error {
            return Err(anyhow!("{message}"));
        }
        let name = remote
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("remote path has no file name"))?;
        let dest = local.join(name);
        std::fs::write(&dest, b"archive")?;
        Ok(dest)
    }
}
