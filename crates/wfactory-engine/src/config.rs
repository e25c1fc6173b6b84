use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FactoryError;

const DEFAULT_LEDGER_CAPACITY: usize = 3;
const DEFAULT_LOAD_TIMEOUT_MS: u64 = 30_000;

/// Configuration for the workflow factory.
///
/// ```json
/// { "ledger_capacity": 3, "load_timeout_ms": 30000 }
/// ```
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
  /// Number of instance slots kept per template.
  #[serde(default = "default_ledger_capacity")]
  pub ledger_capacity: usize,

  /// Upper bound on waiting for an in-flight template load.
  #[serde(default = "default_load_timeout_ms")]
  pub load_timeout_ms: u64,
}

fn default_ledger_capacity() -> usize {
  DEFAULT_LEDGER_CAPACITY
}

fn default_load_timeout_ms() -> u64 {
  DEFAULT_LOAD_TIMEOUT_MS
}

impl Default for FactoryConfig {
  fn default() -> Self {
    Self {
      ledger_capacity: DEFAULT_LEDGER_CAPACITY,
      load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
    }
  }
}

impl FactoryConfig {
  /// Read a JSON configuration file and validate it.
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FactoryError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| FactoryError::InvalidConfig {
      message: format!("{}: {e}", path.display()),
    })?;
    let config: FactoryConfig =
      serde_json::from_str(&content).map_err(|e| FactoryError::InvalidConfig {
        message: format!("{}: {e}", path.display()),
      })?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), FactoryError> {
    if self.ledger_capacity == 0 {
      return Err(FactoryError::InvalidConfig {
        message: "ledger_capacity must be at least 1".to_string(),
      });
    }
    Ok(())
  }

  pub fn load_timeout(&self) -> Duration {
    Duration::from_millis(self.load_timeout_ms)
  }
}
