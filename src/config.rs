//! Branch and gateway configuration.
//!
//! The HTTP layer (or whatever hosts this crate) owns configuration
//! persistence; this module only defines the shapes the core consumes plus
//! the validation pass that runs before a [`crate::transport::ConnectionManager`]
//! is built from them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default connect/request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default manager-wide SC location code sent in Login frames.
pub const DEFAULT_LOCATION_CODE: &str = "SC";

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_location_code() -> String {
    DEFAULT_LOCATION_CODE.to_string()
}

fn default_true() -> bool {
    true
}

/// Service credentials for the per-branch Login handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCredentials {
    /// SC login user id (`CN`)
    pub user: String,
    /// SC login password (`CO`)
    pub password: String,
}

/// Vendor-specific protocol quirks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VendorProfile {
    /// Whether inbound frames must carry a valid checksum. When false, bad
    /// or missing checksums are tolerated with a warning.
    #[serde(default = "default_true")]
    pub checksum_required: bool,
    /// Whether to follow a successful Login with an SC Status round-trip.
    pub post_login_sc_status: bool,
    /// Display name for logs only.
    pub name: Option<String>,
}

impl Default for VendorProfile {
    fn default() -> Self {
        Self {
            checksum_required: true,
            post_login_sc_status: false,
            name: None,
        }
    }
}

/// Configuration for a single LMS branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfig {
    /// Stable branch identifier used in the inbound API.
    pub id: String,
    /// LMS host name or address.
    pub host: String,
    /// LMS SIP2 port.
    pub port: u16,
    /// Connect and per-request timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Institution id sent as `AO` on every request.
    pub institution_id: String,
    /// Whether to wrap the socket in TLS.
    #[serde(default)]
    pub tls: bool,
    /// Strict certificate validation. Only an explicit `false` accepts
    /// self-signed certificates.
    #[serde(default = "default_true")]
    pub tls_verify: bool,
    /// Optional SC service credentials; when present a Login handshake runs
    /// before the first operation on a fresh connection.
    #[serde(default)]
    pub credentials: Option<ServiceCredentials>,
    /// Optional vendor quirks.
    #[serde(default)]
    pub profile: Option<VendorProfile>,
}

impl BranchConfig {
    /// The connect/request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether inbound frames must checksum-verify on this branch.
    #[must_use]
    pub fn checksum_required(&self) -> bool {
        self.profile
            .as_ref()
            .map_or(true, |p| p.checksum_required)
    }

    /// Whether Login must be followed by an SC Status probe.
    #[must_use]
    pub fn post_login_sc_status(&self) -> bool {
        self.profile
            .as_ref()
            .is_some_and(|p| p.post_login_sc_status)
    }
}

/// Whole-gateway configuration: the branch list plus manager-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// All configured branches.
    pub branches: Vec<BranchConfig>,
    /// SC location code (`CP`) sent in Login frames.
    #[serde(default = "default_location_code")]
    pub location_code: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            branches: Vec::new(),
            location_code: default_location_code(),
        }
    }
}

/// Configuration rejection reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A branch is missing its id.
    #[error("branch at index {index} has an empty id")]
    EmptyBranchId {
        /// Position in the branch list
        index: usize,
    },

    /// Two branches share an id.
    #[error("duplicate branch id '{id}'")]
    DuplicateBranchId {
        /// The colliding id
        id: String,
    },

    /// A branch has no host.
    #[error("branch '{id}' has an empty host")]
    EmptyHost {
        /// The offending branch
        id: String,
    },

    /// A branch has port zero.
    #[error("branch '{id}' has port 0")]
    InvalidPort {
        /// The offending branch
        id: String,
    },

    /// A branch has an empty institution id.
    #[error("branch '{id}' has an empty institution id")]
    EmptyInstitution {
        /// The offending branch
        id: String,
    },

    /// Credentials were given with an empty user.
    #[error("branch '{id}' has credentials with an empty user")]
    EmptyCredentialUser {
        /// The offending branch
        id: String,
    },

    /// A timeout outside the supported range.
    #[error("branch '{id}' timeout {timeout_ms} ms is outside 100..=300000")]
    TimeoutOutOfRange {
        /// The offending branch
        id: String,
        /// The configured timeout
        timeout_ms: u64,
    },
}

/// Non-fatal findings surfaced alongside a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// The branch the warning concerns
    pub branch_id: String,
    /// Human-readable description
    pub message: String,
}

/// Validates a gateway configuration.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered; warnings are only
/// returned for otherwise valid configurations.
pub fn validate(config: &GatewayConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    let mut warnings = Vec::new();

    for (index, branch) in config.branches.iter().enumerate() {
        if branch.id.trim().is_empty() {
            return Err(ConfigError::EmptyBranchId { index });
        }
        if !seen.insert(branch.id.clone()) {
            return Err(ConfigError::DuplicateBranchId {
                id: branch.id.clone(),
            });
        }
        if branch.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost {
                id: branch.id.clone(),
            });
        }
        if branch.port == 0 {
            return Err(ConfigError::InvalidPort {
                id: branch.id.clone(),
            });
        }
        if branch.institution_id.trim().is_empty() {
            return Err(ConfigError::EmptyInstitution {
                id: branch.id.clone(),
            });
        }
        if let Some(credentials) = &branch.credentials {
            if credentials.user.trim().is_empty() {
                return Err(ConfigError::EmptyCredentialUser {
                    id: branch.id.clone(),
                });
            }
            if credentials.password.is_empty() {
                warnings.push(ConfigWarning {
                    branch_id: branch.id.clone(),
                    message: "credentials configured with an empty password".to_string(),
                });
            }
        }
        if !(100..=300_000).contains(&branch.timeout_ms) {
            return Err(ConfigError::TimeoutOutOfRange {
                id: branch.id.clone(),
                timeout_ms: branch.timeout_ms,
            });
        }
        if branch.timeout_ms < 1_000 {
            warnings.push(ConfigWarning {
                branch_id: branch.id.clone(),
                message: format!(
                    "timeout of {} ms is unusually low for a production LMS",
                    branch.timeout_ms
                ),
            });
        }
        if branch.tls && !branch.tls_verify {
            warnings.push(ConfigWarning {
                branch_id: branch.id.clone(),
                message: "TLS certificate validation is disabled".to_string(),
            });
        }
    }

    Ok(warnings)
}
