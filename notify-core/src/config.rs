//! Configuration
//!
//! The only tunable is which [`GcProtector`] derived values register with.
//! It can be deserialized from a config file or read from the
//! `NOTIFY_GC_PROTECTOR` environment variable.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{NotifyError, Result};
use crate::gc::{
    set_active_protector, DebugGcProtector, FastGcProtector, GcProtector, RaisingGcProtector,
};

/// Environment variable read by [`NotifyConfig::from_env`].
pub const PROTECTOR_ENV: &str = "NOTIFY_GC_PROTECTOR";

/// Which protector implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectorKind {
    /// Counts protections; ignores unbalanced unprotects.
    #[default]
    Fast,
    /// Fails on unbalanced unprotects.
    Raising,
    /// Logs every protection and records violations.
    Debug,
}

impl ProtectorKind {
    pub fn build(self) -> Arc<dyn GcProtector> {
        match self {
            Self::Fast => Arc::new(FastGcProtector::new()),
            Self::Raising => Arc::new(RaisingGcProtector::new()),
            Self::Debug => Arc::new(DebugGcProtector::new()),
        }
    }
}

impl FromStr for ProtectorKind {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "raising" => Ok(Self::Raising),
            "debug" => Ok(Self::Debug),
            other => Err(NotifyError::InvalidConfig(format!(
                "unknown protector `{}` (expected fast, raising or debug)",
                other
            ))),
        }
    }
}

impl fmt::Display for ProtectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fast => "fast",
            Self::Raising => "raising",
            Self::Debug => "debug",
        };
        f.write_str(name)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub protector: ProtectorKind,
}

impl NotifyConfig {
    /// Read the configuration from the environment.
    ///
    /// An unset variable gives the default configuration.
    pub fn from_env() -> Result<Self> {
        Self::from_protector_setting(std::env::var(PROTECTOR_ENV).ok().as_deref())
    }

    fn from_protector_setting(setting: Option<&str>) -> Result<Self> {
        let protector = match setting {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => ProtectorKind::default(),
        };
        Ok(Self { protector })
    }

    /// Make a fresh protector of the configured kind the active one.
    ///
    /// Fails if the current protector still has outstanding protections.
    /// Only values created afterwards use the new protector.
    pub fn install(&self) -> Result<Arc<dyn GcProtector>> {
        let protector = self.protector.build();
        set_active_protector(Arc::clone(&protector))?;
        info!(protector = %self.protector, "installed gc protector");
        Ok(protector)
    }
}
