//! Runtime configuration for the portal core.

use std::{path::Path, time::Duration};

use serde::Deserialize;

fn default_init_timeout_secs() -> u64 {
  30
}

/// Portal configuration, deserialised from `portal.toml` with a
/// `WATCHDESK_`-prefixed environment overlay.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
  /// Maximum wait for the identity and store subsystems to become ready
  /// before startup fails with an initialization error.
  #[serde(default = "default_init_timeout_secs")]
  pub init_timeout_secs: u64,
}

impl Default for PortalConfig {
  fn default() -> Self {
    Self { init_timeout_secs: default_init_timeout_secs() }
  }
}

impl PortalConfig {
  /// Load from `path` (optional) overlaid with `WATCHDESK_*` environment
  /// variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("WATCHDESK"))
      .build()?
      .try_deserialize()
  }

  pub fn init_timeout(&self) -> Duration {
    Duration::from_secs(self.init_timeout_secs)
  }
}
