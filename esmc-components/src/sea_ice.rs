//! Sea ice of prescribed thickness and extent
//!
//! The ice extent is supplied from outside (for example monthly observed
//! sea-ice concentration) and the thickness is fixed. Only the temperature of
//! a thin surface layer evolves, heated by conduction from the ice base:
//!
//! $$ C \frac{dT}{dt} = -(F_{turb} + F_{rad}) + \frac{k (T_b - T)}{h} $$
//!
//! The surface temperature cannot exceed the melting point. Energy that
//! would warm the surface past it is counted as melt energy and removed; the
//! ice does not thin.
//!
//! The basal conductive flux and the melt energy are exchanges with the
//! unresolved ocean below the ice. [`PrescribedSeaIce::conserved_total`]
//! removes them from the surface layer energy so that only the fluxes
//! exchanged through the coupler change the reported total.

use crate::parameters::PrescribedSeaIceParameters;
use crate::solver::{advance_column, interval};
use esmc_core::component::{unsupported, ComponentModel, ModelKind};
use esmc_core::conservation::ConservedQuantity;
use esmc_core::constants::T_FREEZE;
use esmc_core::errors::ESMCResult;
use esmc_core::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use esmc_core::ivp::IVP;
use esmc_core::thermo::{saturation_specific_humidity_field, Phase};
use ode_solvers::Vector2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Surface temperature and cumulative basal heat input
type ModelState = Vector2<FloatValue>;

struct IceColumn<'a> {
    parameters: &'a PrescribedSeaIceParameters,
    heat_capacity: FloatValue,
    upward_flux: FloatValue,
}

impl IVP<ModelState> for IceColumn<'_> {
    fn calculate_dy_dt(&self, _t: Time, y: &ModelState, dy_dt: &mut ModelState) {
        let p = self.parameters;
        let conductive = p.conductivity * (p.base_temperature - y[0]) / p.thickness;
        dy_dt[0] = (conductive - self.upward_flux) / self.heat_capacity;
        dy_dt[1] = conductive;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescribedSeaIce {
    name: String,
    parameters: PrescribedSeaIceParameters,
    space: Arc<BoundarySpace>,
    t: Time,
    /// unit: K
    temperature: FieldBuffer,
    /// Cumulative heat conducted from the ice base
    /// unit: J / m^2
    basal_heat: FieldBuffer,
    /// Cumulative energy used to hold the surface at the melting point
    /// unit: J / m^2
    melt_energy: FieldBuffer,
    area_fraction: FieldBuffer,
    air_density: FieldBuffer,
    turbulent_energy_flux: FieldBuffer,
    radiative_flux: FieldBuffer,
}

impl PrescribedSeaIce {
    /// Ice covering no area until an extent is supplied
    pub fn from_parameters(
        name: &str,
        space: Arc<BoundarySpace>,
        parameters: PrescribedSeaIceParameters,
    ) -> Self {
        Self {
            name: name.to_string(),
            t: 0.0,
            temperature: space.filled(parameters.initial_temperature.min(T_FREEZE)),
            basal_heat: space.zeros(),
            melt_energy: space.zeros(),
            area_fraction: space.zeros(),
            air_density: space.filled(1.2),
            turbulent_energy_flux: space.zeros(),
            radiative_flux: space.zeros(),
            parameters,
            space,
        }
    }

    pub fn with_area_fraction(mut self, fraction: FieldBuffer) -> ESMCResult<Self> {
        self.space.check(FieldTag::AreaFraction, &fraction)?;
        self.area_fraction = fraction;
        Ok(self)
    }

    pub fn with_start_time(mut self, t: Time) -> Self {
        self.t = t;
        self
    }

    pub fn temperature(&self) -> &FieldBuffer {
        &self.temperature
    }

    pub fn melt_energy(&self) -> &FieldBuffer {
        &self.melt_energy
    }

    /// Conductive flux from the base towards the surface at the current state
    /// unit: W / m^2
    pub fn conductive_flux(&self) -> FieldBuffer {
        let p = &self.parameters;
        self.temperature
            .mapv(|t| p.conductivity * (p.base_temperature - t) / p.thickness)
    }
}

#[typetag::serde]
impl ComponentModel for PrescribedSeaIce {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        ModelKind::SeaIce
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
            FieldTag::SurfaceHumidity => {
                saturation_specific_humidity_field(&self.temperature, &self.air_density, Phase::Ice)
            }
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
            let column = IceColumn {
                parameters: &self.parameters,
                heat_capacity,
                upward_flux: self.turbulent_energy_flux[i] + self.radiative_flux[i],
            };
            let y = advance_column(
                &self.name,
                column,
                ModelState::new(self.temperature[i], 0.0),
                self.t,
                t_target,
                self.parameters.max_substep,
            )?;

            self.basal_heat[i] += y[1];
            if y[0] > T_FREEZE {
                self.melt_energy[i] += heat_capacity * (y[0] - T_FREEZE);
                self.temperature[i] = T_FREEZE;
            } else {
                self.temperature[i] = y[0];
            }
        }
        self.t = t_target;
        Ok(())
    }

    fn reinit(&mut self) -> ESMCResult<()> {
        self.space.check(FieldTag::SurfaceTemperature, &self.temperature)
    }

    fn conserved_total(&self, quantity: ConservedQuantity) -> Option<FieldBuffer> {
        match quantity {
            ConservedQuantity::Energy => Some(
                &self.temperature * self.parameters.heat_capacity() + &self.melt_energy
                    - &self.basal_heat,
            ),
            ConservedQuantity::Water => None,
        }
    }
}
