//! Configuration data structures for reconstruction runs.

mod settings;

pub use settings::{DEFAULT_MAX_ATTEMPTS, Settings, SettingsError};
