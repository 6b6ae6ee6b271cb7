//! Engine configuration
//!
//! Defines all configurable parameters for the engine including the
//! workspace location, the bounded authentication wait, and the external
//! tool commands.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
///
/// The upload token is the one ambient secret: it comes from the invoking
/// environment, is handed only to the report sink, and never appears in
/// Debug output or logs.
#[derive(Clone)]
pub struct EngineConfig {
    /// Base directory for run workspaces
    pub workspace_root: PathBuf,

    /// Bounded wait for the identity provider before `AuthTimeout`
    pub auth_timeout: Duration,

    /// Test harness command
    pub harness: String,

    /// Package tool command used by the installer
    pub package_tool: String,

    /// Upload token for the coverage collector, if the invoking
    /// environment supplies one
    pub upload_token: Option<String>,
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Recognized variables (all optional):
    /// - CAPSTAN_WORKSPACE (default: <tmp>/capstan)
    /// - CAPSTAN_AUTH_TIMEOUT_SECS (default: 10)
    /// - CAPSTAN_HARNESS (default: pytest)
    /// - CAPSTAN_PACKAGE_TOOL (default: pip)
    /// - CAPSTAN_UPLOAD_TOKEN (secret, default: unset)
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("CAPSTAN_WORKSPACE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("capstan"));

        let auth_timeout = std::env::var("CAPSTAN_AUTH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(10));

        let harness =
            std::env::var("CAPSTAN_HARNESS").unwrap_or_else(|_| "pytest".to_string());

        let package_tool =
            std::env::var("CAPSTAN_PACKAGE_TOOL").unwrap_or_else(|_| "pip".to_string());

        let upload_token = std::env::var("CAPSTAN_UPLOAD_TOKEN").ok();

        Self {
            workspace_root,
            auth_timeout,
            harness,
            package_tool,
            upload_token,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            anyhow::bail!("workspace_root cannot be empty");
        }

        if self.auth_timeout.as_secs() == 0 {
            anyhow::bail!("auth_timeout must be greater than 0");
        }

        if self.harness.is_empty() {
            anyhow::bail!("harness command cannot be empty");
        }

        if self.package_tool.is_empty() {
            anyhow::bail!("package_tool command cannot be empty");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("capstan"),
            auth_timeout: Duration::from_secs(10),
            harness: "pytest".to_string(),
            package_tool: "pip".to_string(),
            upload_token: None,
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("workspace_root", &self.workspace_root)
            .field("auth_timeout", &self.auth_timeout)
            .field("harness", &self.harness)
            .field("package_tool", &self.package_tool)
            .field("upload_token", &self.upload_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
