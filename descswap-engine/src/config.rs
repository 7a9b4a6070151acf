//! The patch profile: the JSON configuration the loader reads once at
//! process start. Absence or a parse failure is fatal before any swap step
//! runs.

use serde::{Deserialize, Serialize};

use crate::SwapError;

/// How far identity bypass goes. Ordered: each level implies the ones
/// below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum BypassLevel {
    /// No identity rewriting at all.
    Disabled = 0,
    /// Identity queries through the package surface report the configured
    /// original identity.
    PackageQueries = 1,
    /// Additionally redirect direct file access to the original content.
    /// Specified by interface only; see `NativeRedirect`.
    SyscallRedirect = 2,
}

impl TryFrom<u8> for BypassLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BypassLevel::Disabled),
            1 => Ok(BypassLevel::PackageQueries),
            2 => Ok(BypassLevel::SyscallRedirect),
            other => Err(format!("unknown bypass level {other}")),
        }
    }
}

impl From<BypassLevel> for u8 {
    fn from(level: BypassLevel) -> u8 {
        level as u8
    }
}

impl Default for BypassLevel {
    fn default() -> Self {
        BypassLevel::Disabled
    }
}

/// The embedded patch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchProfile {
    /// Whether a manager service is present. The service client itself is
    /// out of scope; the flag is carried and logged.
    #[serde(default)]
    pub use_manager: bool,

    #[serde(default)]
    pub identity_bypass_level: BypassLevel,

    /// The signing credential identity queries should report after attach,
    /// opaque to the engine.
    #[serde(default)]
    pub original_identity: Option<String>,

    /// Dynamic component-factory override to carry onto replacement
    /// descriptors. A value starting with `.` is namespaced under the
    /// package name at build time.
    #[serde(default)]
    pub dynamic_factory_override: Option<String>,
}

impl PatchProfile {
    /// Parses the profile from its serialized form. `None` means the
    /// profile asset is absent; both absence and malformed content are
    /// fatal.
    pub fn load(raw: Option<&str>) -> Result<Self, SwapError> {
        let raw = raw.ok_or_else(|| SwapError::Configuration("profile asset missing".into()))?;
        serde_json::from_str(raw).map_err(|e| SwapError::Configuration(e.to_string()))
    }
}
