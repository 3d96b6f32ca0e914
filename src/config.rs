// src/config.rs
// Chain parameters (what the engine needs) and the host service settings (where it listens).
// Defaults mirror the reference store: 10 links of length 0.1, a 500-entry trail.

use crate::error::ChainError;
use serde::{Deserialize, Serialize};

/// Environment variable naming the address the web service binds to.
pub const BIND_ENV: &str = "N_PENDULUM_BIND";

/// Default bind address for the web service.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Parameters of one chain. Deserializes with every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub link_count: usize, // Number of links N; joints are N + 1 with the anchor.
    pub link_length: f64,  // Uniform link length, shared by kinematics, IK and dynamics.
    pub gravity: f64,      // Gravitational acceleration, dynamics only.
    pub trace_limit: usize, // Trace Buffer capacity.
    pub max_step: f64,     // Longest single RK4 step; longer frames are sub-stepped.
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            link_count: 10,
            link_length: 0.1,
            gravity: 9.8,
            trace_limit: 500,
            max_step: 1.0 / 120.0,
        }
    }
}

impl ChainConfig {
    /// Builds a config with the given geometry and default everything else.
    pub fn new(link_count: usize, link_length: f64, gravity: f64) -> Self {
        Self {
            link_count,
            link_length,
            gravity,
            ..Self::default()
        }
    }

    /// Checks every field, reporting the first one out of range.
    pub fn validate(&self) -> Result<(), ChainError> {
        validate_link_length(self.link_length)?;
        validate_gravity(self.gravity)?;
        validate_trace_limit(self.trace_limit)?;
        if !(self.max_step.is_finite() && self.max_step > 0.0) {
            return Err(ChainError::config(format!(
                "max_step must be positive and finite, got {}",
                self.max_step
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_link_length(link_length: f64) -> Result<(), ChainError> {
    if link_length.is_finite() && link_length > 0.0 {
        Ok(())
    } else {
        Err(ChainError::config(format!(
            "link_length must be positive and finite, got {link_length}"
        )))
    }
}

pub(crate) fn validate_gravity(gravity: f64) -> Result<(), ChainError> {
    if gravity.is_finite() {
        Ok(())
    } else {
        Err(ChainError::config(format!("gravity must be finite, got {gravity}")))
    }
}

pub(crate) fn validate_trace_limit(trace_limit: usize) -> Result<(), ChainError> {
    if trace_limit >= 1 {
        Ok(())
    } else {
        Err(ChainError::config("trace_limit must be at least 1"))
    }
}

/// Settings for the hosting web service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String, // host:port handed to HttpServer::bind.
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl ServerConfig {
    /// Reads `N_PENDULUM_BIND`, falling back to the default address.
    pub fn from_env() -> Self {
        Self::from_bind(std::env::var(BIND_ENV).ok())
    }

    fn from_bind(bind: Option<String>) -> Self {
        match bind {
            Some(bind) if !bind.trim().is_empty() => Self {
                bind: bind.trim().to_string(),
            },
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ChainConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_link_length() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = ChainConfig::new(3, bad, 9.8);
            assert!(matches!(cfg.validate(), Err(ChainError::InvalidConfig(_))));
        }
    }

    #[test]
    fn rejects_zero_trace_limit() {
        let cfg = ChainConfig {
            trace_limit: 0,
            ..ChainConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_links_is_valid() {
        assert!(ChainConfig::new(0, 1.0, 9.8).validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ChainConfig = serde_json::from_str(r#"{"link_count": 3, "link_length": 0.5}"#)
            .expect("valid json");
        assert_eq!(cfg.link_count, 3);
        assert_eq!(cfg.link_length, 0.5);
        assert_eq!(cfg.trace_limit, 500);
    }

    #[test]
    fn negative_link_count_is_rejected_by_serde() {
        let parsed: Result<ChainConfig, _> = serde_json::from_str(r#"{"link_count": -2}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn bind_falls_back_to_default() {
        assert_eq!(ServerConfig::from_bind(None).bind, DEFAULT_BIND);
        assert_eq!(ServerConfig::from_bind(Some("  ".into())).bind, DEFAULT_BIND);
        assert_eq!(
            ServerConfig::from_bind(Some("0.0.0.0:9000".into())).bind,
            "0.0.0.0:9000"
        );
    }
}
