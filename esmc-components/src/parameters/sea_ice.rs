//! Prescribed sea-ice parameters

use esmc_core::constants::{RHO_ICE, T_FREEZE_SEAWATER};
use esmc_core::field::FloatValue;
use serde::{Deserialize, Serialize};

/// Parameters for sea ice of fixed thickness.
///
/// Heat is conducted through the ice from its base, held at the freezing
/// point of sea water, to a thin surface layer whose temperature evolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrescribedSeaIceParameters {
    /// Ice thickness (m).
    /// Default: 2.0
    pub thickness: FloatValue,

    /// Thermal conductivity of ice (W/m/K).
    /// Default: 2.03
    pub conductivity: FloatValue,

    /// Thickness of the thermally active surface layer (m).
    /// Default: 0.1
    pub surface_layer_thickness: FloatValue,

    /// Specific heat of ice (J/kg/K).
    /// Default: 2100.0
    pub specific_heat: FloatValue,

    /// Temperature at the ice base (K).
    /// Default: 271.2
    pub base_temperature: FloatValue,

    /// Initial surface temperature (K).
    /// Default: 260.0
    pub initial_temperature: FloatValue,

    /// Default: 0.65
    pub albedo: FloatValue,

    /// Roughness length for momentum (m).
    /// Default: 1.0e-3
    pub roughness_momentum: FloatValue,

    /// Roughness length for heat and moisture (m).
    /// Default: 1.0e-4
    pub roughness_buoyancy: FloatValue,

    /// Longest internal integration step (s).
    /// Default: 900.0
    pub max_substep: FloatValue,
}

impl PrescribedSeaIceParameters {
    /// Areal heat capacity of the surface layer ($\text{J/m}^2\text{/K}$)
    pub fn heat_capacity(&self) -> FloatValue {
        RHO_ICE * self.specific_heat * self.surface_layer_thickness
    }
}

impl Default for PrescribedSeaIceParameters {
    fn default() -> Self {
        Self {
            thickness: 2.0,
            conductivity: 2.03,
            surface_layer_thickness: 0.1,
            specific_heat: 2100.0,
            base_temperature: T_FREEZE_SEAWATER,
            initial_temperature: 260.0,
            albedo: 0.65,
            roughness_momentum: 1.0e-3,
            roughness_buoyancy: 1.0e-4,
            max_substep: 900.0,
        }
    }
}
