//! Resource limits for devices and sessions.
//!
//! Limits are persisted with the state they govern, so a restored session
//! enforces the same bounds it was created with.

use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Number of one-time prekeys published when the caller has no preference.
pub const DEFAULT_BUNDLE_SIZE: u32 = 5;

/// Default upper bound on one-time prekeys minted per bundle.
pub const DEFAULT_MAX_BUNDLE_SIZE: u32 = 100;

/// Default upper bound on unconsumed one-time prekeys a device retains.
pub const DEFAULT_MAX_RETAINED_ONE_TIME_PREKEYS: u32 = 1000;

/// Default maximum number of message keys skipped for a single envelope.
pub const DEFAULT_MAX_SKIP: u32 = 1000;

/// Default capacity of the skipped message key cache.
pub const DEFAULT_MAX_SKIPPED_KEYS: u32 = 2000;

/// Limits on the Double Ratchet's out-of-order tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetConfig {
    /// Maximum counter gap a single envelope may open in one receiving chain.
    ///
    /// Bounds the work done per decrypt. Larger gaps are rejected with
    /// [`CryptoError::TooManySkippedMessages`].
    pub max_skip: u32,

    /// Capacity of the skipped-key cache. Oldest entries are evicted first.
    ///
    /// Eviction does not fail the decrypt that caused it; it is only logged
    /// at `warn`. A message whose key was evicted later fails with
    /// [`CryptoError::DuplicateOrUnknownMessage`]. Size this above the
    /// reordering depth the transport can produce.
    pub max_skipped_keys: u32,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self { max_skip: DEFAULT_MAX_SKIP, max_skipped_keys: DEFAULT_MAX_SKIPPED_KEYS }
    }
}

impl RatchetConfig {
    /// Check the limits are coherent.
    ///
    /// A single harvest must fit in the cache, otherwise one envelope could
    /// evict keys it just cached.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.max_skipped_keys < self.max_skip {
            return Err(CryptoError::invalid_request(format!(
                "max_skipped_keys ({}) must be at least max_skip ({})",
                self.max_skipped_keys, self.max_skip
            )));
        }
        Ok(())
    }
}

/// Limits on device-side prekey bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Maximum one-time prekeys minted by one `publish_prekey_bundle` call.
    pub max_bundle_size: u32,

    /// Maximum unconsumed one-time prekeys held locally.
    pub max_retained_one_time_prekeys: u32,

    /// Limits applied to sessions this device establishes.
    pub ratchet: RatchetConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_bundle_size: DEFAULT_MAX_BUNDLE_SIZE,
            max_retained_one_time_prekeys: DEFAULT_MAX_RETAINED_ONE_TIME_PREKEYS,
            ratchet: RatchetConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Check the limits are coherent.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.max_bundle_size == 0 {
            return Err(CryptoError::invalid_request("max_bundle_size must be non-zero"));
        }
        if self.max_retained_one_time_prekeys < self.max_bundle_size {
            return Err(CryptoError::invalid_request(format!(
                "max_retained_one_time_prekeys ({}) must be at least max_bundle_size ({})",
                self.max_retained_one_time_prekeys, self.max_bundle_size
            )));
        }
        self.ratchet.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RatchetConfig::default().validate().is_ok());
        assert!(DeviceConfig::default().validate().is_ok());
    }

    #[test]
    fn cache_smaller_than_skip_is_rejected() {
        let config = RatchetConfig { max_skip: 100, max_skipped_keys: 50 };
        assert!(matches!(config.validate(), Err(CryptoError::InvalidRequest { .. })));
    }

    #[test]
    fn zero_bundle_size_is_rejected() {
        let config = DeviceConfig { max_bundle_size: 0, ..DeviceConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn device_config_checks_ratchet_limits() {
        let config = DeviceConfig {
            ratchet: RatchetConfig { max_skip: 10, max_skipped_keys: 5 },
            ..DeviceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
