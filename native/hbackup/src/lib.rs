//! Backs up an Android app's private data directory over ADB.
//!
//! The app's `/data/data/<package>` directory, its external data directory and optionally its
//! APK are archived on a rooted device, pulled to the host and removed from the device again.

pub mod adb;
pub mod backup;
pub mod logging;
pub mod models;
pub mod settings;
pub mod utils;
