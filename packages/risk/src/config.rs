//! Engine configuration.
//!
//! Every field has a default, so an empty or partial TOML file is valid.

use std::path::Path;

use risk_map_risk_models::{BoundingBox, PredictRequest};
use serde::{Deserialize, Serialize};

use crate::RiskError;
use crate::decay::{DEFAULT_LENGTHSCALE_KM, DEFAULT_TIMESCALE_DAYS, DecayParams};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV_VAR: &str = "RISK_MAP_CONFIG";

/// Tunables for the risk engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Temporal decay e-folding time, in days.
    pub timescale_days: f64,
    /// Spatial decay e-folding distance, in kilometers.
    pub lengthscale_km: f64,
    /// Largest grid a single request may build.
    pub max_grid_cells: usize,
    /// Most events read from the store per request.
    pub max_events: usize,
    /// Horizon used when a request omits one.
    pub default_horizon_days: u32,
    /// Cell size used when a request omits one.
    pub default_cell_size_deg: f64,
    /// Lookback used when a request omits one.
    pub default_lookback_days: u32,
    /// Subdirectory of the cache root that holds computed surfaces.
    pub cache_namespace: String,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            timescale_days: DEFAULT_TIMESCALE_DAYS,
            lengthscale_km: DEFAULT_LENGTHSCALE_KM,
            max_grid_cells: 250_000,
            max_events: 100_000,
            default_horizon_days: 90,
            default_cell_size_deg: 1.0,
            default_lookback_days: 365,
            cache_namespace: "predict".to_string(),
        }
    }
}

impl RiskConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::ConfigParse`] for malformed TOML and
    /// [`RiskError::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(s: &str) -> Result<Self, RiskError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, RiskError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Loads the file named by `RISK_MAP_CONFIG`, or the defaults when the
    /// variable is unset.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError`] if the named file cannot be loaded.
    pub fn from_env() -> Result<Self, RiskError> {
        match std::env::var_os(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            Some(path) => {
                let path = Path::new(&path);
                log::info!("Loading risk config from {}", path.display());
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<(), RiskError> {
        let positive = [
            ("timescale_days", self.timescale_days),
            ("lengthscale_km", self.lengthscale_km),
            ("default_cell_size_deg", self.default_cell_size_deg),
        ];

        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(RiskError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("max_grid_cells", self.max_grid_cells),
            ("max_events", self.max_events),
        ] {
            if value == 0 {
                return Err(RiskError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }

        if self.cache_namespace.is_empty()
            || self
                .cache_namespace
                .contains(|c: char| c == '/' || c == '\\' || c == '.')
        {
            return Err(RiskError::InvalidConfig(format!(
                "cache_namespace must be a plain directory name, got {:?}",
                self.cache_namespace
            )));
        }

        Ok(())
    }

    /// The decay scales.
    #[must_use]
    pub const fn decay_params(&self) -> DecayParams {
        DecayParams {
            timescale_days: self.timescale_days,
            lengthscale_km: self.lengthscale_km,
        }
    }

    /// A request with every field at its configured default.
    #[must_use]
    pub fn default_request(&self) -> PredictRequest {
        PredictRequest {
            horizon_days: self.default_horizon_days,
            bbox: BoundingBox::WORLD,
            cell_size_deg: self.default_cell_size_deg,
            lookback_days: self.default_lookback_days,
            ..PredictRequest::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RiskConfig::default();
        config.validate().unwrap();
        assert!((config.timescale_days - 30.0).abs() < f64::EPSILON);
        assert!((config.lengthscale_km - 200.0).abs() < f64::EPSILON);
        assert_eq!(config.max_grid_cells, 250_000);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = RiskConfig::from_toml_str("timescale_days = 7.5\nmax_events = 10\n").unwrap();
        assert!((config.timescale_days - 7.5).abs() < f64::EPSILON);
        assert_eq!(config.max_events, 10);
        assert!((config.lengthscale_km - 200.0).abs() < f64::EPSILON);
        assert_eq!(config.cache_namespace, "predict");
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(RiskConfig::from_toml_str("").unwrap(), RiskConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        for toml in [
            "timescale_days = 0.0",
            "lengthscale_km = -1.0",
            "default_cell_size_deg = 0.0",
            "max_grid_cells = 0",
            "max_events = 0",
            "cache_namespace = \"../up\"",
        ] {
            assert!(
                matches!(RiskConfig::from_toml_str(toml), Err(RiskError::InvalidConfig(_))),
                "{toml} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            RiskConfig::from_toml_str("timescale_days = \"soon\""),
            Err(RiskError::ConfigParse(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("risk_map_config_{}.toml", std::process::id()));
        std::fs::write(&path, "lengthscale_km = 50.0\n").unwrap();

        let config = RiskConfig::load(&path).unwrap();
        assert!((config.decay_params().lengthscale_km - 50.0).abs() < f64::EPSILON);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("risk_map_config_does_not_exist.toml");
        assert!(matches!(RiskConfig::load(&path), Err(RiskError::ConfigIo(_))));
    }

    #[test]
    fn default_request_uses_configured_defaults() {
        let config = RiskConfig {
            default_horizon_days: 30,
            default_cell_size_deg: 2.0,
            ..RiskConfig::default()
        };
        let request = config.default_request();
        assert_eq!(request.horizon_days, 30);
        assert!((request.cell_size_deg - 2.0).abs() < f64::EPSILON);
        assert_eq!(request.lookback_days, 365);
        assert_eq!(request.bbox, BoundingBox::WORLD);
    }
}
