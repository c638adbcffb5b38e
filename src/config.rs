use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SAMPLES: usize = 1000;
pub const DEFAULT_MAX_AUDIT_ENTRIES: usize = 10_000;

/// Settings for a [crate::Telemetry] collector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// Maximum number of samples retained; older samples are dropped first.
    pub max_samples: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// Settings for an [crate::AuditLog].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    pub enabled: bool,
    /// Maximum number of entries retained; older entries are dropped first.
    pub max_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_MAX_AUDIT_ENTRIES,
        }
    }
}

/// CollectorConfig groups the settings of both collectors so hosts can embed them in their own
/// configuration files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub telemetry: TelemetryConfig,
    pub audit: AuditConfig,
}
