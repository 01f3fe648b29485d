//! Global configuration record.

use serde::{Deserialize, Serialize};

use super::{read_json, write_json_atomic, DataStore};
use crate::error::AppError;
use crate::interval::{is_allowed_interval, validate_interval, DEFAULT_INTERVAL_SECONDS};

/// Process-wide settings, always fully populated.
///
/// | field                      | key        | default |
/// |----------------------------|------------|---------|
/// | `default_interval_seconds` | `interval` | 30      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(rename = "interval")]
    pub default_interval_seconds: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }
}

/// Partial config: both the on-disk shape and an update request.
/// Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(rename = "interval", default, skip_serializing_if = "Option::is_none")]
    pub default_interval_seconds: Option<u64>,
}

impl ConfigPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(secs) = self.default_interval_seconds {
            validate_interval(secs)?;
        }
        Ok(())
    }

    /// Overlay the fields present in `self` onto `base`.
    pub fn merge_onto(self, base: GlobalConfig) -> GlobalConfig {
        GlobalConfig {
            default_interval_seconds: self
                .default_interval_seconds
                .unwrap_or(base.default_interval_seconds),
        }
    }
}

impl From<GlobalConfig> for ConfigPatch {
    fn from(config: GlobalConfig) -> Self {
        Self {
            default_interval_seconds: Some(config.default_interval_seconds),
        }
    }
}

impl DataStore {
    /// Current global config: the stored record merged over the defaults.
    ///
    /// A stored interval outside the allowed set is ignored in favour of
    /// the default.
    pub async fn global_config(&self) -> Result<GlobalConfig, AppError> {
        let mut stored: ConfigPatch = read_json(&self.config_file()).await?.unwrap_or_default();

        if let Some(secs) = stored.default_interval_seconds {
            if !is_allowed_interval(secs) {
                tracing::warn!(
                    "Stored default interval {}s is not allowed, using {}s",
                    secs,
                    DEFAULT_INTERVAL_SECONDS
                );
                stored.default_interval_seconds = None;
            }
        }

        Ok(stored.merge_onto(GlobalConfig::default()))
    }

    /// Merge `patch` into the stored config and persist the result.
    pub async fn update_global_config(&self, patch: ConfigPatch) -> Result<GlobalConfig, AppError> {
        patch.validate()?;

        let _guard = self.write_lock.lock().await;
        let updated = patch.merge_onto(self.global_config().await?);
        write_json_atomic(&self.config_file(), &ConfigPatch::from(updated)).await?;

        tracing::info!(
            "Global config updated (default interval: {}s)",
            updated.default_interval_seconds
        );
        Ok(updated)
    }

    pub async fn set_default_interval(&self, secs: u64) -> Result<GlobalConfig, AppError> {
        self.update_global_config(ConfigPatch {
            default_interval_seconds: Some(secs),
        })
        .await
    }
}
