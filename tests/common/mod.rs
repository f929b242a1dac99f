#![allow(dead_code)]

use esmc::core::component::{unsupported, ComponentModel, ModelKind};
use esmc::core::conservation::ConservedQuantity;
use esmc::core::errors::ESMCResult;
use esmc::core::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Atmosphere publishing fixed fluxes and keeping a ledger of what it gave away
///
/// Fluxes follow the coupler convention: positive upward, precipitation
/// negative when falling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedFluxAtmosphere {
    name: String,
    space: Arc<BoundarySpace>,
    t: Time,
    pub steps: usize,
    pub turbulent_energy_flux: FloatValue,
    pub liquid_precipitation: FloatValue,
    energy: FieldBuffer,
    water: FieldBuffer,
    pub co2: FloatValue,
    pub surface_temperature: FieldBuffer,
}

impl FixedFluxAtmosphere {
    pub fn new(name: &str, space: Arc<BoundarySpace>) -> Self {
        Self {
            name: name.to_string(),
            t: 0.0,
            steps: 0,
            turbulent_energy_flux: 0.0,
            liquid_precipitation: 0.0,
            energy: space.filled(1.0e9),
            water: space.filled(20.0),
            co2: 280.0,
            surface_temperature: space.zeros(),
            space,
        }
    }

    pub fn with_turbulent_energy_flux(mut self, flux: FloatValue) -> Self {
        self.turbulent_energy_flux = flux;
        self
    }

    pub fn with_precipitation(mut self, liquid: FloatValue) -> Self {
        self.liquid_precipitation = liquid;
        self
    }
}

#[typetag::serde]
impl ComponentModel for FixedFluxAtmosphere {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Atmosphere
    }

    fn space(&self) -> &BoundarySpace {
        &self.space
    }

    fn current_time(&self) -> Option<Time> {
        Some(self.t)
    }

    fn get_field(&self, field: FieldTag) -> ESMCResult<FieldValue> {
        let values = match field {
            FieldTag::AirTemperature => self.space.filled(285.0),
            FieldTag::AirHumidity => self.space.filled(0.008),
            FieldTag::AirDensity => self.space.filled(1.2),
            FieldTag::WindSpeed => self.space.filled(5.0),
            FieldTag::ReferenceHeight => self.space.filled(10.0),
            FieldTag::TurbulentEnergyFlux => self.space.filled(self.turbulent_energy_flux),
            FieldTag::TurbulentMoistureFlux => self.space.zeros(),
            FieldTag::RadiativeEnergyFlux => self.space.zeros(),
            FieldTag::TopOfAtmosphereFlux => self.space.zeros(),
            FieldTag::LiquidPrecipitation => self.space.filled(self.liquid_precipitation),
            FieldTag::SnowPrecipitation => self.space.zeros(),
            FieldTag::Co2 => return Ok(FieldValue::Scalar(self.co2)),
            _ => return Err(unsupported(&self.name, field)),
        };
        Ok(FieldValue::Field(values))
    }

    fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()> {
        match field {
            FieldTag::Co2 => self.co2 = value.expect_scalar(field)?,
            FieldTag::SurfaceTemperature => self
                .surface_temperature
                .assign(value.expect_field(&self.space, field)?),
            FieldTag::SurfaceAlbedo
            | FieldTag::TurbulentEnergyFlux
            | FieldTag::TurbulentMoistureFlux => {
                value.expect_field(&self.space, field)?;
            }
            _ => return Err(unsupported(&self.name, field)),
        }
        Ok(())
    }

    fn step(&mut self, t_target: Time) -> ESMCResult<()> {
        let dt = t_target - self.t;
        // What leaves the surface enters the atmosphere
        self.energy += self.turbulent_energy_flux * dt;
        self.water += self.liquid_precipitation * dt;
        self.t = t_target;
        self.steps += 1;
        Ok(())
    }

    fn reinit(&mut self) -> ESMCResult<()> {
        Ok(())
    }

    fn conserved_total(&self, quantity: ConservedQuantity) -> Option<FieldBuffer> {
        match quantity {
            ConservedQuantity::Energy => Some(self.energy.clone()),
            ConservedQuantity::Water => Some(self.water.clone()),
        }
    }
}

pub fn field(model: &dyn ComponentModel, tag: FieldTag) -> FieldBuffer {
    model
        .get_field(tag)
        .unwrap()
        .as_field()
        .expect("a field value")
        .clone()
}
