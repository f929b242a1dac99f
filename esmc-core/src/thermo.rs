//! Closed-form thermodynamic relations used during the flux exchange.

use crate::constants::{CV_D, E_SAT_0, R_D, R_V, T_FREEZE};
use crate::field::{FieldBuffer, FloatValue};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Condensed phase in equilibrium with the vapour at a surface
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Liquid,
    Ice,
}

/// Saturation vapour pressure (Pa) over a plane surface of the given phase.
///
/// Uses the Tetens-type fits
/// $$ e_s = e_0 \exp\left(\frac{a (T - T_0)}{T - b}\right) $$
/// with $(a, b) = (17.5043, 31.473)$ over liquid and $(22.4422, 0.6)$ over ice.
pub fn saturation_vapor_pressure(temperature: FloatValue, phase: Phase) -> FloatValue {
    let (a, b) = match phase {
        Phase::Liquid => (17.5043, 31.473),
        Phase::Ice => (22.4422, 0.6),
    };
    E_SAT_0 * (a * (temperature - T_FREEZE) / (temperature - b)).exp()
}

/// Saturation specific humidity for air of density `density` at `temperature`
///
/// $$ q_{sat} = \frac{e_s(T)}{\rho R_v T} $$
pub fn saturation_specific_humidity(
    temperature: FloatValue,
    density: FloatValue,
    phase: Phase,
) -> FloatValue {
    saturation_vapor_pressure(temperature, phase) / (density * R_V * temperature)
}

/// Extrapolate the density of the lowest atmospheric level to the surface.
///
/// Assumes an adiabatic ideal-gas profile between the lowest level and the
/// surface:
/// $$ \rho_{sfc} = \rho_{air} \left(\frac{T_{sfc}}{T_{air}}\right)^{c_v / R_d} $$
pub fn surface_air_density(
    air_density: FloatValue,
    air_temperature: FloatValue,
    surface_temperature: FloatValue,
) -> FloatValue {
    air_density * (surface_temperature / air_temperature).powf(CV_D / R_D)
}

/// Column-wise [`surface_air_density`]
pub fn surface_air_density_field(
    air_density: &FieldBuffer,
    air_temperature: &FieldBuffer,
    surface_temperature: &FieldBuffer,
) -> FieldBuffer {
    Zip::from(air_density)
        .and(air_temperature)
        .and(surface_temperature)
        .map_collect(|rho, t_air, t_sfc| surface_air_density(*rho, *t_air, *t_sfc))
}

/// Column-wise [`saturation_specific_humidity`]
pub fn saturation_specific_humidity_field(
    temperature: &FieldBuffer,
    density: &FieldBuffer,
    phase: Phase,
) -> FieldBuffer {
    Zip::from(temperature)
        .and(density)
        .map_collect(|t, rho| saturation_specific_humidity(*t, *rho, phase))
}
