//! Bridge configuration.

use serde::{Deserialize, Serialize};
use workbridge_core::{DEFAULT_CALL_ID_PREFIX, Error, Result};

/// Settings for one [`crate::Bridge`] instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Tag prepended to the call counter, e.g. `rpc1`.
    pub call_id_prefix: String,

    /// Worker threads are named `<prefix>-<context>`.
    pub thread_name_prefix: String,

    /// Stack size for worker threads. `None` uses the platform default.
    pub worker_stack_size: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_id_prefix: DEFAULT_CALL_ID_PREFIX.to_string(),
            thread_name_prefix: "workbridge".to_string(),
            worker_stack_size: None,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.call_id_prefix.is_empty() {
            return Err(Error::Config("call_id_prefix must not be empty".to_string()));
        }
        if self.worker_stack_size == Some(0) {
            return Err(Error::Config("worker_stack_size must be positive".to_string()));
        }
        Ok(())
    }
}
