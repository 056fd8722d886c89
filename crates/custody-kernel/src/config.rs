//! Kernel configuration.

use std::path::Path;
use std::time::Duration;

use custody_authority::ChallengeKind;
use custody_confirm::ConfirmationConfig;
use custody_gates::ExportConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level kernel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub confirmation: ConfirmationSection,

    #[serde(default)]
    pub consent: ConsentSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub export: ExportSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hold-to-confirm timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSection {
    /// Minimum continuous hold before a confirmation arms, in milliseconds.
    #[serde(default = "default_min_hold_ms")]
    pub min_hold_ms: u64,

    /// Lifetime of a confirmation machine, in seconds.
    #[serde(default = "default_confirmation_ttl")]
    pub ttl_secs: u64,
}

impl Default for ConfirmationSection {
    fn default() -> Self {
        Self {
            min_hold_ms: default_min_hold_ms(),
            ttl_secs: default_confirmation_ttl(),
        }
    }
}

/// Consent checkpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentSection {
    /// Lifetime of a consent token, in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Challenge kind used when the caller does not pick one.
    #[serde(default = "default_challenge_kind")]
    pub default_kind: ChallengeKind,
}

impl Default for ConsentSection {
    fn default() -> Self {
        Self {
            token_ttl_secs: default_token_ttl(),
            default_kind: default_challenge_kind(),
        }
    }
}

/// Session lifetime and the dead-man's timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Absolute session lifetime, in seconds. Never extended.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Silence after which a consent checkpoint is forced, in seconds.
    #[serde(default = "default_silence_timeout")]
    pub silence_timeout_secs: u64,

    /// Grant lifetime used when the caller does not give one, in seconds.
    #[serde(default = "default_grant_ttl")]
    pub default_grant_ttl_secs: u64,

    /// Requests reporting a confidence below this are halted.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            silence_timeout_secs: default_silence_timeout(),
            default_grant_ttl_secs: default_grant_ttl(),
            confidence_floor: default_confidence_floor(),
        }
    }
}

/// Export cancellation timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSection {
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stable_window_ms")]
    pub stable_window_ms: u64,

    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            stable_window_ms: default_stable_window_ms(),
            verify_timeout_ms: default_verify_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_min_hold_ms() -> u64 {
    400
}

fn default_confirmation_ttl() -> u64 {
    120
}

fn default_token_ttl() -> u64 {
    60
}

fn default_challenge_kind() -> ChallengeKind {
    ChallengeKind::TypeCode
}

fn default_session_ttl() -> u64 {
    60 * 60
}

fn default_silence_timeout() -> u64 {
    5 * 60
}

fn default_grant_ttl() -> u64 {
    15 * 60
}

fn default_confidence_floor() -> f64 {
    0.5
}

fn default_grace_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_stable_window_ms() -> u64 {
    500
}

fn default_verify_timeout_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl KernelConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.confirmation.min_hold_ms == 0 {
            return Err(ConfigError::Invalid(
                "confirmation.min_hold_ms must be positive".into(),
            ));
        }
        if self.confirmation.ttl_secs * 1_000 <= self.confirmation.min_hold_ms {
            return Err(ConfigError::Invalid(
                "confirmation.ttl_secs must exceed the minimum hold".into(),
            ));
        }
        if self.consent.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "consent.token_ttl_secs must be positive".into(),
            ));
        }
        if self.session.ttl_secs == 0 || self.session.silence_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "session timers must be positive".into(),
            ));
        }
        if self.session.silence_timeout_secs > self.session.ttl_secs {
            return Err(ConfigError::Invalid(
                "session.silence_timeout_secs must not exceed session.ttl_secs".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.session.confidence_floor) {
            return Err(ConfigError::Invalid(
                "session.confidence_floor must be within 0.0..=1.0".into(),
            ));
        }
        if self.export.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "export.poll_interval_ms must be positive".into(),
            ));
        }
        if self.export.stable_window_ms >= self.export.verify_timeout_ms {
            return Err(ConfigError::Invalid(
                "export.stable_window_ms must be shorter than export.verify_timeout_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn confirmation_config(&self) -> ConfirmationConfig {
        ConfirmationConfig {
            min_hold: Duration::from_millis(self.confirmation.min_hold_ms),
            ttl: Duration::from_secs(self.confirmation.ttl_secs),
        }
    }

    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            grace: Duration::from_millis(self.export.grace_ms),
            poll_interval: Duration::from_millis(self.export.poll_interval_ms),
            stable_window: Duration::from_millis(self.export.stable_window_ms),
            verify_timeout: Duration::from_millis(self.export.verify_timeout_ms),
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.consent.token_ttl_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_secs)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_secs(self.session.silence_timeout_secs)
    }

    pub fn default_grant_ttl(&self) -> Duration {
        Duration::from_secs(self.session.default_grant_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.confirmation_config(), ConfirmationConfig::default());
        assert_eq!(config.consent.default_kind, ChallengeKind::TypeCode);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = KernelConfig::from_toml_str(
            r#"
            [confirmation]
            min_hold_ms = 600

            [consent]
            default_kind = "VOICE_PHRASE"

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.confirmation.min_hold_ms, 600);
        assert_eq!(config.confirmation.ttl_secs, 120);
        assert_eq!(config.consent.default_kind, ChallengeKind::VoicePhrase);
        assert!(config.logging.json);
        assert_eq!(config.session.ttl_secs, 3600);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = KernelConfig::from_toml_str("").unwrap();
        assert_eq!(config.export.grace_ms, 2_000);
        assert_eq!(config.session.confidence_floor, 0.5);
    }

    #[test]
    fn test_confidence_floor_out_of_range_rejected() {
        let err = KernelConfig::from_toml_str("[session]\nconfidence_floor = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = KernelConfig::from_toml_str("[confirmation]\nmin_hold_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = KernelConfig::from_toml_str(
            "[session]\nttl_secs = 60\nsilence_timeout_secs = 120\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = KernelConfig::from_toml_str(
            "[export]\nstable_window_ms = 5000\nverify_timeout_ms = 1000\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.toml");
        std::fs::write(&path, "[session]\nsilence_timeout_secs = 30\n").unwrap();
        let config = KernelConfig::load(&path).unwrap();
        assert_eq!(config.silence_timeout(), Duration::from_secs(30));

        assert!(matches!(
            KernelConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
