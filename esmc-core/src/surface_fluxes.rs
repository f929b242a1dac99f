//! Turbulent surface fluxes between the atmosphere and the surface.
//!
//! Fluxes are computed column by column from the state of the lowest
//! atmospheric level and the surface state. The scheme is pluggable through
//! [`TurbulentFluxScheme`]; [`BulkAerodynamic`] is a neutral-stability bulk
//! formula.
//!
//! Sign convention: fluxes are positive upward (from the surface into the
//! atmosphere).

use crate::constants::{CP_D, LH_V0, VON_KARMAN};
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{FieldBuffer, FloatValue};
use crate::surface::SurfaceType;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// State of the lowest atmospheric level above a single column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosColumn {
    /// unit: K
    pub temperature: FloatValue,
    /// unit: kg / kg
    pub humidity: FloatValue,
    /// unit: kg / m^3
    pub density: FloatValue,
    /// unit: m / s
    pub wind_speed: FloatValue,
    /// Height of the level above the surface
    /// unit: m
    pub height: FloatValue,
}

/// Surface state of a single column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceColumn {
    /// unit: K
    pub temperature: FloatValue,
    /// unit: kg / kg
    pub humidity: FloatValue,
    /// unit: kg / m^3
    pub air_density: FloatValue,
    /// unit: m
    pub roughness_momentum: FloatValue,
    /// unit: m
    pub roughness_buoyancy: FloatValue,
    pub beta: FloatValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColumnFluxes {
    /// Sensible plus latent heat flux
    /// unit: W / m^2
    pub energy: FloatValue,
    /// unit: kg / m^2 / s
    pub moisture: FloatValue,
}

/// How surface heterogeneity is treated when computing fluxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FluxStrategy {
    /// Compute a single flux per column from the fraction-weighted surface state
    #[default]
    CombinedState,
    /// Compute fluxes for each surface type separately, then combine them
    PartitionedState,
}

/// A turbulent flux parameterisation
#[typetag::serde(tag = "scheme")]
pub trait TurbulentFluxScheme: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn column_fluxes(
        &self,
        atmos: &AtmosColumn,
        surface: &SurfaceColumn,
    ) -> ESMCResult<ColumnFluxes>;
}

/// Neutral bulk aerodynamic formula
///
/// $$ C_h = \frac{\kappa^2}{\ln(z / z_{0m}) \ln(z / z_{0b})} $$
/// $$ SH = \rho_{sfc} c_p C_h |u| (T_{sfc} - T_{air}) $$
/// $$ E = \rho_{sfc} C_h |u| \beta (q_{sfc} - q_{air}) $$
///
/// The energy flux is $SH + L_v E$.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAerodynamic {
    /// Floor applied to the wind speed so that fluxes never vanish entirely
    /// unit: m / s
    pub min_wind_speed: FloatValue,
}

impl Default for BulkAerodynamic {
    fn default() -> Self {
        Self {
            min_wind_speed: 1.0,
        }
    }
}

impl BulkAerodynamic {
    pub fn exchange_coefficient(
        &self,
        height: FloatValue,
        z0m: FloatValue,
        z0b: FloatValue,
    ) -> ESMCResult<FloatValue> {
        if !(z0m > 0.0 && z0b > 0.0 && height > z0m && height > z0b) {
            return Err(ESMCError::InvalidData(format!(
                "reference height {} m must exceed the roughness lengths ({} m, {} m)",
                height, z0m, z0b
            )));
        }
        Ok(VON_KARMAN.powi(2) / ((height / z0m).ln() * (height / z0b).ln()))
    }
}

#[typetag::serde]
impl TurbulentFluxScheme for BulkAerodynamic {
    fn name(&self) -> &str {
        "bulk_aerodynamic"
    }

    fn column_fluxes(
        &self,
        atmos: &AtmosColumn,
        surface: &SurfaceColumn,
    ) -> ESMCResult<ColumnFluxes> {
        let c_h = self.exchange_coefficient(
            atmos.height,
            surface.roughness_momentum,
            surface.roughness_buoyancy,
        )?;
        let transfer = surface.air_density * c_h * atmos.wind_speed.abs().max(self.min_wind_speed);

        let sensible = transfer * CP_D * (surface.temperature - atmos.temperature);
        let evaporation = transfer * surface.beta * (surface.humidity - atmos.humidity);

        Ok(ColumnFluxes {
            energy: sensible + LH_V0 * evaporation,
            moisture: evaporation,
        })
    }
}

/// Column fields of the lowest atmospheric level
#[derive(Debug, Clone, PartialEq)]
pub struct AtmosState {
    pub temperature: FieldBuffer,
    pub humidity: FieldBuffer,
    pub density: FieldBuffer,
    pub wind_speed: FieldBuffer,
    pub height: FieldBuffer,
}

impl AtmosState {
    pub fn column(&self, i: usize) -> AtmosColumn {
        AtmosColumn {
            temperature: self.temperature[i],
            humidity: self.humidity[i],
            density: self.density[i],
            wind_speed: self.wind_speed[i],
            height: self.height[i],
        }
    }
}

/// Column fields describing a surface as seen by the flux scheme
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceState {
    pub temperature: FieldBuffer,
    pub humidity: FieldBuffer,
    pub air_density: FieldBuffer,
    pub roughness_momentum: FieldBuffer,
    pub roughness_buoyancy: FieldBuffer,
    pub beta: FieldBuffer,
}

impl SurfaceState {
    pub fn column(&self, i: usize) -> SurfaceColumn {
        SurfaceColumn {
            temperature: self.temperature[i],
            humidity: self.humidity[i],
            air_density: self.air_density[i],
            roughness_momentum: self.roughness_momentum[i],
            roughness_buoyancy: self.roughness_buoyancy[i],
            beta: self.beta[i],
        }
    }
}

/// Turbulent fluxes over every column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurbulentFluxes {
    /// unit: W / m^2
    pub energy: FieldBuffer,
    /// unit: kg / m^2 / s
    pub moisture: FieldBuffer,
}

/// Fluxes computed separately over each surface type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedFluxes {
    pub land: TurbulentFluxes,
    pub ocean: TurbulentFluxes,
    pub ice: TurbulentFluxes,
}

impl PartitionedFluxes {
    pub fn get(&self, surface: SurfaceType) -> &TurbulentFluxes {
        match surface {
            SurfaceType::Land => &self.land,
            SurfaceType::Ocean => &self.ocean,
            SurfaceType::Ice => &self.ice,
        }
    }
}

/// Evaluate the scheme for every column
///
/// Columns where `active` is zero are skipped and report zero flux. This lets
/// callers avoid evaluating surfaces in columns they do not cover.
pub fn turbulent_fluxes(
    scheme: &dyn TurbulentFluxScheme,
    atmos: &AtmosState,
    surface: &SurfaceState,
    active: Option<&FieldBuffer>,
) -> ESMCResult<TurbulentFluxes> {
    let n = atmos.temperature.len();
    let mut energy = FieldBuffer::zeros(n);
    let mut moisture = FieldBuffer::zeros(n);

    for i in 0..n {
        if active.is_some_and(|mask| mask[i] <= 0.0) {
            continue;
        }
        let fluxes = scheme.column_fluxes(&atmos.column(i), &surface.column(i))?;
        energy[i] = fluxes.energy;
        moisture[i] = fluxes.moisture;
    }

    Ok(TurbulentFluxes { energy, moisture })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn atmos() -> AtmosColumn {
        AtmosColumn {
            temperature: 285.0,
            humidity: 0.008,
            density: 1.2,
            wind_speed: 5.0,
            height: 10.0,
        }
    }

    fn surface(temperature: FloatValue) -> SurfaceColumn {
        SurfaceColumn {
            temperature,
            humidity: 0.010,
            air_density: 1.2,
            roughness_momentum: 1e-3,
            roughness_buoyancy: 1e-3,
            beta: 1.0,
        }
    }

    #[test]
    fn exchange_coefficient_neutral() {
        let scheme = BulkAerodynamic::default();
        let c_h = scheme.exchange_coefficient(10.0, 1e-3, 1e-3).unwrap();
        let expected = 0.16 / (1e4f64.ln() * 1e4f64.ln());
        assert_relative_eq!(c_h, expected, max_relative = 1e-12);
        assert!(scheme.exchange_coefficient(1e-4, 1e-3, 1e-3).is_err());
    }

    #[test]
    fn warm_moist_surface_loses_energy_upward() {
        let scheme = BulkAerodynamic::default();
        let fluxes = scheme.column_fluxes(&atmos(), &surface(290.0)).unwrap();
        assert!(fluxes.energy > 0.0);
        assert!(fluxes.moisture > 0.0);

        let c_h = scheme.exchange_coefficient(10.0, 1e-3, 1e-3).unwrap();
        let transfer = 1.2 * c_h * 5.0;
        assert_relative_eq!(fluxes.moisture, transfer * 0.002, max_relative = 1e-12);
        assert_relative_eq!(
            fluxes.energy,
            transfer * CP_D * 5.0 + LH_V0 * transfer * 0.002,
            max_relative = 1e-12
        );
    }

    #[test]
    fn dry_surface_does_not_evaporate() {
        let scheme = BulkAerodynamic::default();
        let mut dry = surface(290.0);
        dry.beta = 0.0;
        let fluxes = scheme.column_fluxes(&atmos(), &dry).unwrap();
        assert_eq!(fluxes.moisture, 0.0);
        assert!(fluxes.energy > 0.0);
    }

    #[test]
    fn calm_conditions_use_min_wind() {
        let scheme = BulkAerodynamic {
            min_wind_speed: 2.0,
        };
        let mut calm = atmos();
        calm.wind_speed = 0.0;
        let mut windy = atmos();
        windy.wind_speed = 2.0;
        assert_eq!(
            scheme.column_fluxes(&calm, &surface(290.0)).unwrap(),
            scheme.column_fluxes(&windy, &surface(290.0)).unwrap()
        );
    }

    #[test]
    fn inactive_columns_are_skipped() {
        let scheme = BulkAerodynamic::default();
        let atmos = AtmosState {
            temperature: array![285.0, 285.0],
            humidity: array![0.008, 0.008],
            density: array![1.2, 1.2],
            wind_speed: array![5.0, 5.0],
            height: array![10.0, 10.0],
        };
        let surface = SurfaceState {
            temperature: array![290.0, f64::NAN],
            humidity: array![0.01, f64::NAN],
            air_density: array![1.2, 1.2],
            roughness_momentum: array![1e-3, 1e-3],
            roughness_buoyancy: array![1e-3, 1e-3],
            beta: array![1.0, 1.0],
        };
        let fluxes =
            turbulent_fluxes(&scheme, &atmos, &surface, Some(&array![1.0, 0.0])).unwrap();
        assert!(fluxes.energy[0] > 0.0);
        assert_eq!(fluxes.energy[1], 0.0);
        assert_eq!(fluxes.moisture[1], 0.0);
    }

    #[test]
    fn strategy_names() {
        let strategy: FluxStrategy = serde_json::from_str("\"partitioned_state\"").unwrap();
        assert_eq!(strategy, FluxStrategy::PartitionedState);
        assert_eq!(FluxStrategy::default(), FluxStrategy::CombinedState);
    }
}
