//! Runtime configuration record.
//!
//! Configuration is an explicit value handed to the provisioner, reaper,
//! and service at construction time — loaded once per scheduled run or
//! admin request, never read from ambient globals. The record
//! round-trips through serde so the service can persist it in the
//! key-value store under a single `config` key.

use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::IdentityId;

/// How long audit events are retained before the daily sweep removes
/// them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Events are kept forever; the sweep is a no-op.
    #[default]
    Never,
    /// Events older than 7 days are removed.
    Weekly,
    /// Events older than 30 days are removed.
    Monthly,
}

impl RetentionPolicy {
    /// The retention window in days, or `None` when events are kept
    /// forever.
    pub fn days(self) -> Option<u32> {
        match self {
            Self::Never => None,
            Self::Weekly => Some(7),
            Self::Monthly => Some(30),
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(format!("unknown retention policy '{other}' (never|weekly|monthly)")),
        }
    }
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Sudogate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SudoConfig {
    /// Audit retention policy applied by the daily sweep.
    pub retention: RetentionPolicy,

    /// Whether teardown also purges the audit log.
    pub delete_data_on_uninstall: bool,

    /// Default grant lifetime when the operator does not specify one.
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,

    /// Identity that inherits content owned by deleted identities.
    pub fallback_owner: IdentityId,

    /// Base URL access links are built against
    /// (`{base_url}?sudo_token={token}`).
    pub base_url: String,
}

impl Default for SudoConfig {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::Never,
            delete_data_on_uninstall: false,
            default_ttl: Duration::from_secs(24 * 3600),
            fallback_owner: IdentityId::from(1),
            base_url: "http://localhost".to_owned(),
        }
    }
}

/// Serde adapter storing a [`Duration`] as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
