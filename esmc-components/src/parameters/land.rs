//! Bucket land parameters

use esmc_core::field::FloatValue;
use serde::{Deserialize, Serialize};

/// Parameters for the bucket land model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketLandParameters {
    /// Areal heat capacity of the active soil layer ($\text{J/m}^2\text{/K}$).
    /// Default: 2.0e6
    pub heat_capacity: FloatValue,

    /// Bucket capacity $W_{cap}$ (m of liquid water).
    /// Default: 0.15
    pub bucket_capacity: FloatValue,

    /// Initial surface temperature (K).
    /// Default: 288.0
    pub initial_temperature: FloatValue,

    /// Initial bucket water (m).
    /// Default: 0.1
    pub initial_water: FloatValue,

    /// Initial snow water equivalent (m).
    /// Default: 0.0
    pub initial_snow: FloatValue,

    /// Albedo of snow-free ground.
    /// Default: 0.3
    pub albedo_bare: FloatValue,

    /// Albedo of deep snow.
    /// Default: 0.7
    pub albedo_snow: FloatValue,

    /// Snow depth at which the albedo is halfway to the snow value (m).
    /// Default: 0.01
    pub snow_masking_depth: FloatValue,

    /// Degree-day melt factor (m/s/K).
    /// Default: 3.0e-8
    pub melt_factor: FloatValue,

    /// Timescale for draining water above the bucket capacity (s).
    /// Default: 86400.0
    pub runoff_timescale: FloatValue,

    /// Roughness length for momentum (m).
    /// Default: 0.01
    pub roughness_momentum: FloatValue,

    /// Roughness length for heat and moisture (m).
    /// Default: 0.001
    pub roughness_buoyancy: FloatValue,

    /// Longest internal integration step (s).
    /// Default: 900.0
    pub max_substep: FloatValue,
}

impl Default for BucketLandParameters {
    fn default() -> Self {
        Self {
            heat_capacity: 2.0e6,
            bucket_capacity: 0.15,
            initial_temperature: 288.0,
            initial_water: 0.1,
            initial_snow: 0.0,
            albedo_bare: 0.3,
            albedo_snow: 0.7,
            snow_masking_depth: 0.01,
            melt_factor: 3.0e-8,
            runoff_timescale: 86400.0,
            roughness_momentum: 0.01,
            roughness_buoyancy: 0.001,
            max_substep: 900.0,
        }
    }
}
