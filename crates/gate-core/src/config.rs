//! Configuration management for the trade gate.
//!
//! Values are layered: built-in defaults, then an optional TOML/JSON/YAML
//! file, then `GATE__<SECTION>__<FIELD>` environment variables (a `.env`
//! file is honoured).

use crate::{Error, Result};
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

const ENV_PREFIX: &str = "GATE";
const ENV_SEPARATOR: &str = "__";

/// Top-level gate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub position_opening: PositionOpeningConfig,
    pub retry: RetrySettings,
}

/// Thresholds for the system-wide circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Daily loss as a fraction of portfolio value (0.05 = 5%).
    pub max_daily_loss_pct: Decimal,
    /// Drop in portfolio value within the drawdown window.
    pub max_rapid_drawdown_pct: Decimal,
    /// Length of the rolling drawdown window.
    pub rapid_drawdown_window_minutes: i64,
    /// Open positions at which the breaker trips.
    pub max_positions: u32,
    /// Losing trades in a row at which the breaker trips.
    pub max_consecutive_losses: u32,
    /// Relative increase of current over baseline volatility.
    pub max_volatility_spike_pct: Decimal,
    /// Time spent OPEN before the breaker moves to HALF_OPEN.
    pub cooldown_seconds: i64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: Decimal::new(5, 2),       // 5%
            max_rapid_drawdown_pct: Decimal::new(2, 2),   // 2%
            rapid_drawdown_window_minutes: 15,
            max_positions: 10,
            max_consecutive_losses: 5,
            max_volatility_spike_pct: Decimal::new(20, 2), // 20%
            cooldown_seconds: 300,                         // 5 minutes
        }
    }
}

impl CircuitBreakerConfig {
    /// Drawdown window as a duration.
    pub fn rapid_drawdown_window(&self) -> Duration {
        Duration::minutes(self.rapid_drawdown_window_minutes)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_daily_loss_pct", self.max_daily_loss_pct),
            ("max_rapid_drawdown_pct", self.max_rapid_drawdown_pct),
            ("max_volatility_spike_pct", self.max_volatility_spike_pct),
        ] {
            if value <= Decimal::ZERO {
                return Err(Error::config(format!(
                    "circuit_breaker.{name} must be positive, got {value}"
                )));
            }
        }
        if self.rapid_drawdown_window_minutes <= 0 {
            return Err(Error::config(
                "circuit_breaker.rapid_drawdown_window_minutes must be positive",
            ));
        }
        if self.max_positions == 0 || self.max_consecutive_losses == 0 {
            return Err(Error::config(
                "circuit_breaker.max_positions and max_consecutive_losses must be at least 1",
            ));
        }
        if self.cooldown_seconds < 0 {
            return Err(Error::config("circuit_breaker.cooldown_seconds cannot be negative"));
        }
        Ok(())
    }
}

/// Thresholds for the per-signal opening decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionOpeningConfig {
    /// Intraday drop of available capital that blocks new positions.
    pub max_daily_loss_pct: Decimal,
    /// Open positions at which new signals are rejected.
    pub max_positions: u32,
    /// Lowest signal confidence accepted, within [0, 1].
    pub min_confidence: Decimal,
}

impl Default for PositionOpeningConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: Decimal::new(2, 2), // 2%
            max_positions: 10,
            min_confidence: Decimal::new(70, 2),
        }
    }
}

impl PositionOpeningConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_daily_loss_pct <= Decimal::ZERO {
            return Err(Error::config("position_opening.max_daily_loss_pct must be positive"));
        }
        if self.min_confidence < Decimal::ZERO || self.min_confidence > Decimal::ONE {
            return Err(Error::config(format!(
                "position_opening.min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Raw retry settings; turned into a validated policy by the recovery crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl GateConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_with_env(path, environment())
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&GateConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let gate: GateConfig = builder.add_source(env).build()?.try_deserialize()?;
        gate.validate()?;

        tracing::debug!(
            max_daily_loss_pct = %gate.circuit_breaker.max_daily_loss_pct,
            max_positions = gate.circuit_breaker.max_positions,
            cooldown_seconds = gate.circuit_breaker.cooldown_seconds,
            min_confidence = %gate.position_opening.min_confidence,
            "Loaded gate configuration"
        );

        Ok(gate)
    }

    pub fn validate(&self) -> Result<()> {
        self.circuit_breaker.validate()?;
        self.position_opening.validate()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = GateConfig::default();
        assert_eq!(config.circuit_breaker.max_daily_loss_pct, Decimal::new(5, 2));
        assert_eq!(config.circuit_breaker.cooldown(), Duration::seconds(300));
        assert_eq!(config.circuit_breaker.rapid_drawdown_window(), Duration::minutes(15));
        assert_eq!(config.position_opening.max_daily_loss_pct, Decimal::new(2, 2));
        assert_eq!(config.position_opening.min_confidence, Decimal::new(70, 2));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_sources_yields_defaults() {
        let config = GateConfig::load_with_env(None, env_from(&[])).unwrap();
        assert_eq!(config, GateConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[circuit_breaker]\nmax_positions = 4\ncooldown_seconds = 60\n\n[retry]\njitter = false"
        )
        .unwrap();

        let config = GateConfig::load_with_env(Some(file.path()), env_from(&[])).unwrap();
        assert_eq!(config.circuit_breaker.max_positions, 4);
        assert_eq!(config.circuit_breaker.cooldown_seconds, 60);
        assert!(!config.retry.jitter);
        // Untouched fields keep their defaults
        assert_eq!(config.circuit_breaker.max_consecutive_losses, 5);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[position_opening]\nmax_positions = 3").unwrap();

        let env = env_from(&[
            ("GATE__POSITION_OPENING__MAX_POSITIONS", "7"),
            ("GATE__CIRCUIT_BREAKER__MAX_CONSECUTIVE_LOSSES", "2"),
        ]);
        let config = GateConfig::load_with_env(Some(file.path()), env).unwrap();
        assert_eq!(config.position_opening.max_positions, 7);
        assert_eq!(config.circuit_breaker.max_consecutive_losses, 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let env = env_from(&[("GATE__CIRCUIT_BREAKER__MAX_POSITIONS", "0")]);
        let err = GateConfig::load_with_env(None, env).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let opening = PositionOpeningConfig {
            min_confidence: Decimal::new(12, 1),
            ..Default::default()
        };
        assert!(opening.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = GateConfig::load_with_env(Some(Path::new("/nonexistent/gate.toml")), env_from(&[]));
        assert!(matches!(result, Err(Error::ConfigFile(_))));
    }
}
