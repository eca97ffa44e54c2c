//! Configuration management
//!
//! Connection profiles, the libpq service file, and user settings.

pub mod connections;
pub mod service_file;
pub mod settings;

pub use connections::{ConnectionConfig, SslMode};
pub use settings::{Settings, StorageKind};
