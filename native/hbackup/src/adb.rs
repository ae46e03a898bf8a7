use std::fmt;

use anyhow::{Result, ensure};
use lazy_regex::{Lazy, Regex, lazy_regex};

pub mod device;
pub mod host;

pub use device::AdbDevice;
pub use host::AdbHost;

pub static PACKAGE_NAME_REGEX: Lazy<Regex> =
    lazy_regex!(r"^(?:[A-Za-z][\w]*\.)+[A-Za-z][\w]*$");

/// Android application id, e.g. `com.example.app`.
///
/// Only dotted identifier segments are accepted, so a package name is always a plain shell word.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName(String);

impl PackageName {
    pub fn parse(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        ensure!(PACKAGE_NAME_REGEX.is_match(name), "Invalid package name: '{name}'");
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
