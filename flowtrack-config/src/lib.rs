//! Layered configuration loading for the container network traffic observer
//! (§6): compiled-in defaults → optional TOML file → `FLOWTRACK_*`
//! environment variables → CLI flags.

pub mod error;
pub mod loader;
pub mod models;

pub use error::ConfigLoadError;
pub use loader::{ConfigLoad, ConfigLoader, ConfigLoaderOptions};
pub use models::{CliOverrides, CollectorSettings};
