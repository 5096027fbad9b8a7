//! Layered settings
//!
//! Four layers, later ones winning:
//! 1. Built-in defaults
//! 2. Host config (~/.config/studio-routing/config.toml)
//! 3. Project config (./studio-routing.toml, or --config)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::{LockSettings, LogSettings, Settings, StoreSettings};
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveSettings, HOST_CONFIG_PATH,
    PROJECT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
