mod backup_request;
pub use backup_request::*;
mod device_metadata;
pub use device_metadata::*;
mod settings;
pub use settings::*;
