use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::flags::MAX_FLAG_SLOTS;

/// Configuration for a cache manager instance and its service wrapper.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total per-connection flag slots available in the registry.
    pub flag_slots: u8,
    /// Slots already taken by other peer-manager modules sharing the
    /// registry layout.
    pub reserved_flag_slots: u8,
    /// Depth of the command queue in front of the service task.
    pub command_queue: usize,
    /// Lagging subscribers of the service event stream drop events beyond this.
    pub event_buffer: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flag_slots: 24,
            reserved_flag_slots: 0,
            command_queue: 64,
            event_buffer: 256,
        }
    }
}

impl CacheConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        let config: CacheConfig =
            serde_json::from_str(json).map_err(|e| CacheError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.flag_slots > MAX_FLAG_SLOTS {
            return Err(CacheError::InvalidConfig(format!(
                "flag_slots {} exceeds {}",
                self.flag_slots, MAX_FLAG_SLOTS
            )));
        }
        if self.reserved_flag_slots > self.flag_slots {
            return Err(CacheError::InvalidConfig(format!(
                "reserved_flag_slots {} exceeds flag_slots {}",
                self.reserved_flag_slots, self.flag_slots
            )));
        }
        if self.command_queue == 0 || self.event_buffer == 0 {
            return Err(CacheError::InvalidConfig(
                "queue sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
