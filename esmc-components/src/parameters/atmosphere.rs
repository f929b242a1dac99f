//! Column atmosphere parameters

use esmc_core::field::FloatValue;
use serde::{Deserialize, Serialize};

/// Parameters for the single-layer column atmosphere.
///
/// The layer is a gray absorber in the longwave and transparent in the
/// shortwave. Its emissivity increases logarithmically with CO2:
///
/// $$ \epsilon = \epsilon_0 + a \ln(C / C_0) $$
///
/// clamped to $[0, 1]$.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAtmosphereParameters {
    /// Surface pressure (Pa). The column mass is $p_s / g$.
    /// Default: 1.0e5
    pub surface_pressure: FloatValue,

    /// Initial layer temperature (K).
    /// Default: 255.0
    pub initial_temperature: FloatValue,

    /// Initial relative humidity of the layer (dimensionless).
    /// Default: 0.5
    pub initial_relative_humidity: FloatValue,

    /// Difference between the near-surface air and the layer temperature (K).
    /// The layer temperature is representative of the emission level.
    /// Default: 30.0
    pub near_surface_offset: FloatValue,

    /// Height of the lowest model level above the surface (m).
    /// Default: 10.0
    pub reference_height: FloatValue,

    /// Near-surface wind speed (m/s).
    /// Default: 5.0
    pub wind_speed: FloatValue,

    /// Longwave emissivity at the reference CO2 concentration.
    /// Default: 0.78
    pub emissivity: FloatValue,

    /// Sensitivity of the emissivity to $\ln(C / C_0)$.
    /// Default: 0.03
    pub emissivity_co2_sensitivity: FloatValue,

    /// Reference CO2 concentration $C_0$ (ppm).
    /// Default: 280.0
    pub reference_co2: FloatValue,

    /// Initial CO2 concentration (ppm).
    /// Default: 280.0
    pub co2: FloatValue,

    /// Solar constant ($\text{W/m}^2$).
    /// Default: 1361.0
    pub solar_constant: FloatValue,

    /// Equator-to-pole contrast of the annual-mean insolation (dimensionless).
    /// Insolation is $S_0/4 \, (1 - \Delta P_2(\sin\phi))$.
    /// Default: 0.482
    pub insolation_contrast: FloatValue,

    /// Relaxation time of supersaturation into precipitation (s).
    /// Default: 10800.0
    pub condensation_timescale: FloatValue,

    /// Longest internal integration step (s).
    /// Default: 600.0
    pub max_substep: FloatValue,
}

impl Default for ColumnAtmosphereParameters {
    fn default() -> Self {
        Self {
            surface_pressure: 1.0e5,
            initial_temperature: 255.0,
            initial_relative_humidity: 0.5,
            near_surface_offset: 30.0,
            reference_height: 10.0,
            wind_speed: 5.0,
            emissivity: 0.78,
            emissivity_co2_sensitivity: 0.03,
            reference_co2: 280.0,
            co2: 280.0,
            solar_constant: 1361.0,
            insolation_contrast: 0.482,
            condensation_timescale: 10800.0,
            max_substep: 600.0,
        }
    }
}
