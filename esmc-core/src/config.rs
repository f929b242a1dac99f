//! Run configuration for the coupler, read from TOML.
//!
//! ```toml
//! start_date = "1979-01-01"
//! t_start = 0.0
//! t_end = 864000.0
//! dt_cpl = 3600.0
//! flux_strategy = "combined_state"
//!
//! [conservation]
//! energy = true
//! water = true
//! tolerance = 1e-6
//! soft_fail = true
//!
//! [checkpoint]
//! dir = "output/checkpoints"
//! schedule = { every_n_steps = 24 }
//!
//! [diagnostics]
//! fields = ["T_sfc", "F_turb_energy"]
//! schedule = "monthly"
//! ```

use crate::callbacks::CallbackSchedule;
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{FieldTag, FloatValue, Time};
use crate::surface::DEFAULT_MASK_TOLERANCE;
use crate::surface_fluxes::FluxStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_start_date() -> String {
    "1979-01-01".to_string()
}

fn default_mask_tolerance() -> FloatValue {
    DEFAULT_MASK_TOLERANCE
}

fn default_conservation_tolerance() -> FloatValue {
    1e-6
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConservationConfig {
    #[serde(default)]
    pub energy: bool,
    #[serde(default)]
    pub water: bool,
    /// Maximum accepted relative drift of the global totals
    #[serde(default = "default_conservation_tolerance")]
    pub tolerance: FloatValue,
    /// Log a warning instead of failing when the tolerance is exceeded
    #[serde(default = "default_true")]
    pub soft_fail: bool,
    /// Directory the conservation reports are written to
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Default for ConservationConfig {
    fn default() -> Self {
        Self {
            energy: false,
            water: false,
            tolerance: default_conservation_tolerance(),
            soft_fail: true,
            output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    pub dir: PathBuf,
    pub schedule: CallbackSchedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Symbols of the coupler fields to average, e.g. `"T_sfc"`
    pub fields: Vec<String>,
    pub schedule: CallbackSchedule,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl DiagnosticsConfig {
    /// Resolve the field symbols to tags
    pub fn tags(&self) -> ESMCResult<Vec<FieldTag>> {
        self.fields
            .iter()
            .map(|symbol| {
                FieldTag::from_symbol(symbol).ok_or_else(|| {
                    ESMCError::Config(format!("unknown diagnostic field '{}'", symbol))
                })
            })
            .collect()
    }
}

/// Settings controlling a coupled run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CouplerConfig {
    /// Calendar date at t = 0, `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`
    #[serde(default = "default_start_date")]
    pub start_date: String,
    /// unit: s
    #[serde(default)]
    pub t_start: Time,
    /// unit: s
    pub t_end: Time,
    /// Coupling interval
    /// unit: s
    pub dt_cpl: Time,
    #[serde(default)]
    pub flux_strategy: FluxStrategy,
    /// Tolerance of the area-fraction partition check
    #[serde(default = "default_mask_tolerance")]
    pub mask_tolerance: FloatValue,
    #[serde(default)]
    pub conservation: ConservationConfig,
    #[serde(default)]
    pub checkpoint: Option<CheckpointConfig>,
    #[serde(default)]
    pub diagnostics: Option<DiagnosticsConfig>,
}

impl CouplerConfig {
    pub fn new(t_start: Time, t_end: Time, dt_cpl: Time) -> Self {
        Self {
            start_date: default_start_date(),
            t_start,
            t_end,
            dt_cpl,
            flux_strategy: FluxStrategy::default(),
            mask_tolerance: default_mask_tolerance(),
            conservation: ConservationConfig::default(),
            checkpoint: None,
            diagnostics: None,
        }
    }

    pub fn from_toml_str(contents: &str) -> ESMCResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ESMCResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Number of coupling steps in the run
    pub fn n_steps(&self) -> usize {
        ((self.t_end - self.t_start) / self.dt_cpl).round() as usize
    }

    /// Check the time span, coupling interval and tolerances
    pub fn validate(&self) -> ESMCResult<()> {
        validate_tspan(self.t_start, self.t_end, self.dt_cpl)?;
        if !(self.mask_tolerance >= 0.0) {
            return Err(ESMCError::Config(format!(
                "mask tolerance must be non-negative, got {}",
                self.mask_tolerance
            )));
        }
        if !(self.conservation.tolerance >= 0.0) {
            return Err(ESMCError::Config(format!(
                "conservation tolerance must be non-negative, got {}",
                self.conservation.tolerance
            )));
        }
        if let Some(diagnostics) = &self.diagnostics {
            diagnostics.tags()?;
        }
        Ok(())
    }
}

/// The coupling interval must be positive and divide the run into whole steps
pub fn validate_tspan(t_start: Time, t_end: Time, dt_cpl: Time) -> ESMCResult<()> {
    if !(dt_cpl > 0.0 && dt_cpl.is_finite()) {
        return Err(ESMCError::Config(format!(
            "coupling interval must be positive, got {}",
            dt_cpl
        )));
    }
    if !(t_end > t_start) {
        return Err(ESMCError::Config(format!(
            "end time {} must be after start time {}",
            t_end, t_start
        )));
    }
    let n_steps = (t_end - t_start) / dt_cpl;
    if (n_steps - n_steps.round()).abs() > 1e-9 * n_steps.max(1.0) {
        return Err(ESMCError::Config(format!(
            "coupling interval {} does not divide the run [{}, {}]",
            dt_cpl, t_start, t_end
        )));
    }
    Ok(())
}
