use std::error::Error;

use tracing::{debug, info, warn};

use super::{
    DeviceTransport,
    command::ShellCommand,
    plan::{Effect, Resource},
};

/// Temporary device artifacts that still need removing, in acquisition order
#[derive(Debug, Default)]
pub(crate) struct CleanupStack {
    held: Vec<(Resource, ShellCommand)>,
}

impl CleanupStack {
    /// Records acquisitions of a step that is about to run.
    ///
    /// Recorded before the command runs since a failed `ln` or redirect can still leave a
    /// partial link or file behind. The undo commands tolerate missing paths.
    pub(crate) fn before_step(&mut self, effect: &Effect) {
        if let Effect::Acquire { resource, undo } = effect {
            self.acquire(*resource, undo.clone());
        }
    }

    /// Records releases of a step that completed successfully
    pub(crate) fn after_step(&mut self, effect: &Effect) {
        if let Effect::Release(resource) = effect {
            self.release(*resource);
        }
    }

    pub(crate) fn acquire(&mut self, resource: Resource, undo: ShellCommand) {
        self.release(resource);
        self.held.push((resource, undo));
    }

    pub(crate) fn release(&mut self, resource: Resource) {
        self.held.retain(|(held, _)| *held != resource);
    }

    pub(crate) fn held(&self) -> Vec<Resource> {
        self.held.iter().map(|(resource, _)| *resource).collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Removes everything still held, newest first.
    /// Failures are logged and do not stop the remaining removals.
    pub(crate) async fn unwind<T: DeviceTransport + ?Sized>(&mut self, device: &T) {
        while let Some((resource, undo)) = self.held.pop() {
            debug!(?resource, command = %undo, "Removing temporary device file");
            match device.shell(&undo.as_root()).await {
                Ok(_) => info!(?resource, "Removed temporary device file"),
                Err(e) => warn!(
                    ?resource,
                    error = e.as_ref() as &dyn Error,
                    "Failed to remove temporary device file"
                ),
            }
        }
    }
}
