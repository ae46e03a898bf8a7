use std::fmt;

use forensic_adb::{UnixPath, UnixPathBuf};
use time::OffsetDateTime;

use super::{
    BackupConfig,
    archive::{ArchivePath, sanitize_component},
    command::ShellCommand,
};
use crate::models::{BackupRequest, Compression, DeviceMetadata};

/// Parent of every app's private data directory
pub const PRIVATE_DATA_ROOT: &str = "/data/data";
/// Parent of every app's external data directory
pub const EXTERNAL_DATA_ROOT: &str = "/sdcard/Android/data";
/// Owner given to the archive so it can be pulled without root
const ARCHIVE_OWNER: &str = "media_rw:media_rw";

/// One entry of the backup command sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    ForceStop,
    RemoveStaleExternalLink,
    LinkExternalData,
    LinkApk,
    Archive,
    UnlinkExternalData,
    UnlinkApk,
    RestoreForceStop,
    ChownArchive,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepKind::ForceStop => "force-stop",
            StepKind::RemoveStaleExternalLink => "stale external data link removal",
            StepKind::LinkExternalData => "external data link",
            StepKind::LinkApk => "APK link",
            StepKind::Archive => "archive",
            StepKind::UnlinkExternalData => "external data link removal",
            StepKind::UnlinkApk => "APK link removal",
            StepKind::RestoreForceStop => "final force-stop",
            StepKind::ChownArchive => "archive ownership change",
        })
    }
}

/// Temporary device-side artifacts created during a backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    ExternalLink,
    ApkLink,
    Archive,
}

/// What a step does to the set of temporary device artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    /// The step creates `resource`; `undo` removes it again
    Acquire { resource: Resource, undo: ShellCommand },
    /// The step removes `resource`
    Release(Resource),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStep {
    pub kind: StepKind,
    pub command: ShellCommand,
    pub effect: Effect,
}

/// The complete, ordered set of device commands for one backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub archive: ArchivePath,
    pub steps: Vec<RemoteStep>,
    /// Removes the device archive once it has been pulled
    pub delete_archive: ShellCommand,
}

impl BackupPlan {
    /// Builds the command sequence for `request`.
    ///
    /// `apk_path` is the installed APK location; it is only used when the request includes the
    /// APK and must have been queried beforehand.
    pub fn build(
        config: &BackupConfig,
        request: &BackupRequest,
        metadata: &DeviceMetadata,
        apk_path: Option<&UnixPath>,
        timestamp: OffsetDateTime,
    ) -> Self {
        let busybox = config.busybox.as_deref();
        let package = &request.package;
        let version = sanitize_component(&metadata.version_name);
        let model = sanitize_component(&metadata.model);
        let archive = ArchivePath::new(
            &config.remote_dir,
            package,
            &version,
            &model,
            request.compression,
            timestamp,
        );

        let private_dir = format!("{PRIVATE_DATA_ROOT}/{package}/");
        let external_dir = UnixPath::new(EXTERNAL_DATA_ROOT).join(package.as_str());
        let external_link = UnixPath::new(PRIVATE_DATA_ROOT).join(format!(".external.{package}"));
        let apk = apk_path.filter(|_| request.include_apk).map(|path| {
            let link = UnixPath::new(PRIVATE_DATA_ROOT).join(format!("{package}_{version}.apk"));
            (path, link)
        });
        let remove = |path: &UnixPath| ShellCommand::tool(busybox, "rm").arg("-rf").path(path);
        let force_stop =
            || ShellCommand::new("am").arg("force-stop").arg(package.as_str());

        let mut steps = Vec::new();
        let mut push = |kind, command, effect| steps.push(RemoteStep { kind, command, effect });

        if request.force_stop {
            push(StepKind::ForceStop, force_stop(), Effect::None);
        }
        push(StepKind::RemoveStaleExternalLink, remove(&external_link), Effect::None);
        push(
            StepKind::LinkExternalData,
            ShellCommand::tool(busybox, "ln").arg("-sf").path(&external_dir).path(&external_link),
            Effect::Acquire { resource: Resource::ExternalLink, undo: remove(&external_link) },
        );
        if let Some((apk_path, apk_link)) = &apk {
            push(
                StepKind::LinkApk,
                ShellCommand::tool(busybox, "ln").arg("-sfn").path(apk_path).path(apk_link),
                Effect::Acquire { resource: Resource::ApkLink, undo: remove(apk_link) },
            );
        }

        let sources = [private_dir, format!("{}/.", external_link.display())];
        let extra: Option<UnixPathBuf> = apk.as_ref().map(|(_, link)| link.clone());
        let archive_command = match request.compression {
            Compression::None | Compression::Gzip => ShellCommand::tool(busybox, "tar")
                .arg(if request.compression == Compression::Gzip { "-chzf" } else { "-chf" })
                .arg("-")
                .args(sources)
                .args(extra.iter().map(|p| p.display().to_string()))
                .arg("--exclude")
                .arg(format!("data/data/{package}/lib/")),
            Compression::Zip => ShellCommand::tool(busybox, "zip")
                .arg("-qr")
                .arg("-")
                .args(sources)
                .args(extra.iter().map(|p| p.display().to_string()))
                .arg("-x")
                .arg(format!("data/data/{package}/lib/*")),
        }
        .stdout_to(archive.remote());
        push(
            StepKind::Archive,
            archive_command,
            Effect::Acquire { resource: Resource::Archive, undo: remove(archive.remote()) },
        );

        push(
            StepKind::UnlinkExternalData,
            remove(&external_link),
            Effect::Release(Resource::ExternalLink),
        );
        if let Some((_, apk_link)) = &apk {
            push(StepKind::UnlinkApk, remove(apk_link), Effect::Release(Resource::ApkLink));
        }
        // Querying the package manager and touching the data directory may restart the app
        if request.force_stop {
            push(StepKind::RestoreForceStop, force_stop(), Effect::None);
        }
        push(
            StepKind::ChownArchive,
            ShellCommand::tool(busybox, "chown").arg(ARCHIVE_OWNER).path(archive.remote()),
            Effect::None,
        );

        let delete_archive = remove(archive.remote());
        Self { archive, steps, delete_archive }
    }

    pub fn kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::adb::PackageName;

    fn request(force_stop: bool, include_apk: bool, compression: Compression) -> BackupRequest {
        BackupRequest {
            force_stop,
            include_apk,
            compression,
            ..BackupRequest::new(PackageName::parse("com.example.app").unwrap())
        }
    }

    fn metadata() -> DeviceMetadata {
        DeviceMetadata { version_name: "1.2 3".into(), model: "Pixel 5".into() }
    }

    fn build(request: &BackupRequest, apk: Option<&str>) -> BackupPlan {
        BackupPlan::build(
            &BackupConfig::default(),
            request,
            &metadata(),
            apk.map(UnixPath::new),
            datetime!(2026-10-17 09:08:07 UTC),
        )
    }

    fn count_force_stops(plan: &BackupPlan) -> usize {
        plan.steps
            .iter()
            .filter(|s| s.command.program() == "am" && s.command.arguments()[0] == "force-stop")
            .count()
    }

    fn archive_step(plan: &BackupPlan) -> &RemoteStep {
        plan.steps.iter().find(|s| s.kind == StepKind::Archive).unwrap()
    }

    #[test]
    fn force_stop_wraps_the_archive_step() {
        let plan = build(&request(true, false, Compression::None), None);
        assert_eq!(count_force_stops(&plan), 2);

        let kinds = plan.kinds();
        let archive = kinds.iter().position(|k| *k == StepKind::Archive).unwrap();
        assert_eq!(kinds.first(), Some(&StepKind::ForceStop));
        let restore = kinds.iter().position(|k| *k == StepKind::RestoreForceStop).unwrap();
        assert!(restore > archive);
    }

    #[test]
    fn no_force_stop_when_disabled() {
        let plan = build(&request(false, true, Compression::Gzip), Some("/data/app/base.apk"));
        assert_eq!(count_force_stops(&plan), 0);
    }

    #[test]
    fn apk_link_created_and_removed_once_with_same_version() {
        let plan = build(
            &request(true, true, Compression::Gzip),
            Some("/data/app/~~abc==/com.example.app-xyz==/base.apk"),
        );
        let link = "/data/data/com.example.app_1.2-3.apk";

        let created: Vec<_> = plan.steps.iter().filter(|s| s.kind == StepKind::LinkApk).collect();
        let removed: Vec<_> = plan.steps.iter().filter(|s| s.kind == StepKind::UnlinkApk).collect();
        assert_eq!(created.len(), 1);
        assert_eq!(removed.len(), 1);
        assert_eq!(
            created[0].command.render(),
            format!("ln -sfn '/data/app/~~abc==/com.example.app-xyz==/base.apk' {link}")
        );
        assert_eq!(removed[0].command.render(), format!("rm -rf {link}"));
        assert!(archive_step(&plan).command.arguments().contains(&link.to_string()));
    }

    #[test]
    fn without_apk_there_are_no_apk_steps_or_extra_paths() {
        // A stray APK path is ignored when the request does not include the APK
        let plan = build(&request(false, false, Compression::None), Some("/data/app/base.apk"));
        assert!(!plan.kinds().contains(&StepKind::LinkApk));
        assert!(!plan.kinds().contains(&StepKind::UnlinkApk));
        assert!(plan.steps.iter().all(|s| !s.command.render().contains(".apk")));

        assert_eq!(
            archive_step(&plan).command.arguments(),
            [
                "-chf",
                "-",
                "/data/data/com.example.app/",
                "/data/data/.external.com.example.app/.",
                "--exclude",
                "data/data/com.example.app/lib/",
            ]
        );
    }

    #[test]
    fn zip_plan_has_seven_steps_in_order() {
        let plan = build(&request(true, false, Compression::Zip), None);
        assert_eq!(
            plan.kinds(),
            [
                StepKind::ForceStop,
                StepKind::RemoveStaleExternalLink,
                StepKind::LinkExternalData,
                StepKind::Archive,
                StepKind::UnlinkExternalData,
                StepKind::RestoreForceStop,
                StepKind::ChownArchive,
            ]
        );
        let archive = "/data/local/tmp/HBackup_com.example.app_1.2-3_Pixel-5_20261017090807.zip";
        let rendered: Vec<String> = plan.steps.iter().map(|s| s.command.render()).collect();
        assert_eq!(
            rendered,
            [
                "am force-stop com.example.app".to_string(),
                "rm -rf /data/data/.external.com.example.app".to_string(),
                "ln -sf /sdcard/Android/data/com.example.app /data/data/.external.com.example.app"
                    .to_string(),
                format!(
                    "zip -qr - /data/data/com.example.app/ /data/data/.external.com.example.app/. \
                     -x 'data/data/com.example.app/lib/*' > {archive}"
                ),
                "rm -rf /data/data/.external.com.example.app".to_string(),
                "am force-stop com.example.app".to_string(),
                format!("chown media_rw:media_rw {archive}"),
            ]
        );
        assert_eq!(plan.delete_archive.render(), format!("rm -rf {archive}"));
    }

    #[test]
    fn gzip_uses_compressed_tar() {
        let plan = build(&request(false, false, Compression::Gzip), None);
        let archive = archive_step(&plan);
        assert_eq!(archive.command.program(), "tar");
        assert_eq!(archive.command.arguments()[0], "-chzf");
        assert!(plan.archive.file_name().ends_with(".tar.gz"));
    }

    #[test]
    fn busybox_prefixes_file_utilities_only() {
        let config = BackupConfig {
            busybox: Some("/data/local/busybox".into()),
            ..BackupConfig::default()
        };
        let plan = BackupPlan::build(
            &config,
            &request(true, false, Compression::None),
            &metadata(),
            None,
            datetime!(2026-10-17 09:08:07 UTC),
        );
        for step in &plan.steps {
            let rendered = step.command.render();
            if step.command.program() == "am" {
                assert!(rendered.starts_with("am "), "{rendered}");
            } else {
                assert!(rendered.starts_with("/data/local/busybox "), "{rendered}");
            }
        }
    }

    #[test]
    fn links_and_archive_are_tracked_as_resources() {
        let plan = build(&request(false, true, Compression::None), Some("/data/app/base.apk"));
        let acquired: Vec<Resource> = plan
            .steps
            .iter()
            .filter_map(|s| match &s.effect {
                Effect::Acquire { resource, .. } => Some(*resource),
                _ => None,
            })
            .collect();
        let released: Vec<Resource> = plan
            .steps
            .iter()
            .filter_map(|s| match &s.effect {
                Effect::Release(resource) => Some(*resource),
                _ => None,
            })
            .collect();
        assert_eq!(acquired, [Resource::ExternalLink, Resource::ApkLink, Resource::Archive]);
        assert_eq!(released, [Resource::ExternalLink, Resource::ApkLink]);
    }
}
