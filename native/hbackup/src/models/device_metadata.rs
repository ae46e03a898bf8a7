/// Device-reported details used to name the archive.
///
/// Fields are empty when the device could not be queried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMetadata {
    /// `versionName` of the package being backed up
    pub version_name: String,
    /// `ro.product.model`
    pub model: String,
}
