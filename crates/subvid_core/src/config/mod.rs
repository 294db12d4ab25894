//! Configuration management.
//!
//! TOML-based configuration with logical sections, atomic file writes
//! (write to temp, then rename), and defaults for every missing key.
//!
//! # Example
//!
//! ```no_run
//! use subvid_core::config::ConfigManager;
//!
//! let mut config = ConfigManager::new(".config/settings.toml");
//! config.load_or_create().unwrap();
//!
//! println!("scratch root: {}", config.settings().paths.scratch_root);
//!
//! config.settings_mut().render.frame_rate = 24;
//! config.save().unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    LoggingSettings, PathSettings, RenderSettings, Settings, SynthesisSettings, TimingSettings,
};
