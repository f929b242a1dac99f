//! Slab ocean
//!
//! A single well-mixed layer per column with areal heat capacity
//! $C = \rho c_p h$. The surface loses the upward turbulent and radiative
//! fluxes handed over by the coupler:
//!
//! $$ C \frac{dT}{dt} = -(F_{turb} + F_{rad}) $$
//!
//! The fluxes are held constant over each coupling interval.

use crate::parameters::SlabOceanParameters;
use crate::solver::{advance_column, interval};
use esmc_core::component::{unsupported, ComponentModel, ModelKind};
use esmc_core::conservation::ConservedQuantity;
use esmc_core::errors::ESMCResult;
use esmc_core::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use esmc_core::ivp::IVP;
use esmc_core::thermo::{saturation_specific_humidity_field, Phase};
use ode_solvers::Vector1;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ModelState = Vector1<FloatValue>;

/// Tendency of one ocean column under fixed surface fluxes
struct SlabColumn {
    heat_capacity: FloatValue,
    upward_flux: FloatValue,
}

impl IVP<ModelState> for SlabColumn {
    fn calculate_dy_dt(&self, _t: Time, _y: &ModelState, dy_dt: &mut ModelState) {
        dy_dt[0] = -self.upward_flux / self.heat_capacity;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlabOcean {
    name: String,
    parameters: SlabOceanParameters,
    space: Arc<BoundarySpace>,
    t: Time,
    /// unit: K
    temperature: FieldBuffer,
    area_fraction: FieldBuffer,
    /// unit: kg / m^3
    air_density: FieldBuffer,
    /// unit: W / m^2
    turbulent_energy_flux: FieldBuffer,
    /// unit: W / m^2
    radiative_flux: FieldBuffer,
}

impl SlabOcean {
    pub fn from_parameters(
        name: &str,
        space: Arc<BoundarySpace>,
        parameters: SlabOceanParameters,
    ) -> Self {
        Self {
            name: name.to_string(),
            t: 0.0,
            temperature: space.filled(parameters.initial_temperature),
            area_fraction: space.filled(1.0),
            air_density: space.filled(1.2),
            turbulent_energy_flux: space.zeros(),
            radiative_flux: space.zeros(),
            parameters,
            space,
        }
    }

    /// Start from a spatially varying temperature
    pub fn with_temperature(mut self, temperature: FieldBuffer) -> ESMCResult<Self> {
        self.space.check(FieldTag::SurfaceTemperature, &temperature)?;
        self.temperature = temperature;
        Ok(self)
    }

    pub fn with_start_time(mut self, t: Time) -> Self {
        self.t = t;
        self
    }

    pub fn parameters(&self) -> &SlabOceanParameters {
        &self.parameters
    }

    pub fn temperature(&self) -> &FieldBuffer {
        &self.temperature
    }
}

#[typetag::serde]
impl ComponentModel for SlabOcean {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Ocean
    }

    fn space(&self) -> &BoundarySpace {
        &self.space
    }

    fn current_time(&self) -> Option<Time> {
        Some(self.t)
    }

    fn get_field(&self, field: FieldTag) -> ESMCResult<FieldValue> {
        let values = match field {
            FieldTag::AreaFraction => self.area_fraction.clone(),
            FieldTag::SurfaceTemperature => self.temperature.clone(),
            FieldTag::RoughnessMomentum => self.space.filled(self.parameters.roughness_momentum),
            FieldTag::RoughnessBuoyancy => self.space.filled(self.parameters.roughness_buoyancy),
            FieldTag::SurfaceAlbedo => self.space.filled(self.parameters.albedo),
            FieldTag::SurfaceHumidity => saturation_specific_humidity_field(
                &self.temperature,
                &self.air_density,
                Phase::Liquid,
            ),
            FieldTag::Beta => self.space.filled(1.0),
            FieldTag::SurfaceAirDensity => self.air_density.clone(),
            _ => return Err(unsupported(&self.name, field)),
        };
        Ok(FieldValue::Field(values))
    }

    fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()> {
        let target = match field {
            FieldTag::AreaFraction => &mut self.area_fraction,
            FieldTag::SurfaceAirDensity => &mut self.air_density,
            FieldTag::TurbulentEnergyFlux => &mut self.turbulent_energy_flux,
            FieldTag::RadiativeEnergyFlux => &mut self.radiative_flux,
            _ => return Err(unsupported(&self.name, field)),
        };
        target.assign(value.expect_field(&self.space, field)?);
        Ok(())
    }

    fn step(&mut self, t_target: Time) -> ESMCResult<()> {
        interval(&self.name, self.t, t_target)?;
        let heat_capacity = self.parameters.heat_capacity();

        for i in 0..self.space.size() {
            let column = SlabColumn {
                heat_capacity,
                upward_flux: self.turbulent_energy_flux[i] + self.radiative_flux[i],
            };
            let y = advance_column(
                &self.name,
                column,
                ModelState::new(self.temperature[i]),
                self.t,
                t_target,
                self.parameters.max_substep,
            )?;
            self.temperature[i] = y[0];
        }
        self.t = t_target;
        Ok(())
    }

    fn reinit(&mut self) -> ESMCResult<()> {
        self.space.check(FieldTag::SurfaceTemperature, &self.temperature)
    }

    fn conserved_total(&self, quantity: ConservedQuantity) -> Option<FieldBuffer> {
        match quantity {
            ConservedQuantity::Energy => Some(&self.temperature * self.parameters.heat_capacity()),
            ConservedQuantity::Water => None,
        }
    }
}
