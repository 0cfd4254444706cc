//! Sync layer configuration.
//!
//! Defaults are suitable for interactive sessions; overrides come from a
//! TOML file or environment variables, environment winning.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pk_core::{PkError, PkResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// How long a resolved current-user profile stays fresh, in seconds.
    pub current_user_ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            current_user_ttl_secs: 60,
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with any `PIPEKIT_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Parse a TOML document, then apply environment overrides on top.
    pub fn from_toml_str(raw: &str) -> PkResult<Self> {
        let mut config: Self = toml::from_str(raw)
            .map_err(|err| PkError::InvalidArgument(format!("invalid config: {err}")))?;
        config.apply_env();
        Ok(config)
    }

    /// Load from a config file on disk.
    pub fn load(path: impl AsRef<Path>) -> PkResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            PkError::InvalidArgument(format!(
                "cannot read config {}: {err}",
                path.as_ref().display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn current_user_ttl(&self) -> Duration {
        Duration::from_secs(self.identity.current_user_ttl_secs)
    }

    fn apply_env(&mut self) {
        if let Some(ttl) = env_u64("PIPEKIT_CURRENT_USER_TTL_SECS") {
            self.identity.current_user_ttl_secs = ttl;
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_give_a_one_minute_user_ttl() {
        let config = SyncConfig::default();
        assert_eq!(config.current_user_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn toml_overrides_the_ttl() {
        let config = SyncConfig::from_toml_str(
            r#"
            [identity]
            current_user_ttl_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.current_user_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn partial_toml_keeps_defaults_for_the_rest() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config.identity.current_user_ttl_secs, 60);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SyncConfig::from_toml_str("[identity]\nuser_ttl = 5\n").unwrap_err();
        assert!(matches!(err, PkError::InvalidArgument(_)));
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[identity]\ncurrent_user_ttl_secs = 120").unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.current_user_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(SyncConfig::load("/nonexistent/pipekit.toml").is_err());
    }
}
