//! Slab ocean parameters

use esmc_core::field::FloatValue;
use serde::{Deserialize, Serialize};

/// Parameters for the slab (mixed-layer) ocean.
///
/// The areal heat capacity is $\rho c_p h$.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlabOceanParameters {
    /// Mixed layer depth $h$ (m).
    /// Default: 50.0
    pub depth: FloatValue,

    /// Sea water density ($\text{kg/m}^3$).
    /// Default: 1026.0
    pub density: FloatValue,

    /// Specific heat of sea water (J/kg/K).
    /// Default: 3989.0
    pub specific_heat: FloatValue,

    /// Initial sea surface temperature (K).
    /// Default: 290.0
    pub initial_temperature: FloatValue,

    /// Default: 0.06
    pub albedo: FloatValue,

    /// Roughness length for momentum (m).
    /// Default: 1.0e-4
    pub roughness_momentum: FloatValue,

    /// Roughness length for heat and moisture (m).
    /// Default: 1.0e-4
    pub roughness_buoyancy: FloatValue,

    /// Longest internal integration step (s).
    /// Default: 3600.0
    pub max_substep: FloatValue,
}

impl SlabOceanParameters {
    /// Areal heat capacity ($\text{J/m}^2\text{/K}$)
    pub fn heat_capacity(&self) -> FloatValue {
        self.density * self.specific_heat * self.depth
    }
}

impl Default for SlabOceanParameters {
    fn default() -> Self {
        Self {
            depth: 50.0,
            density: 1026.0,
            specific_heat: 3989.0,
            initial_temperature: 290.0,
            albedo: 0.06,
            roughness_momentum: 1.0e-4,
            roughness_buoyancy: 1.0e-4,
            max_substep: 3600.0,
        }
    }
}
