#![allow(dead_code)]

//! Minimal component models used by the coupler's own tests.

use crate::component::{unsupported, ComponentModel, ModelKind};
use crate::conservation::ConservedQuantity;
use crate::constants::RHO_LIQ;
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use crate::thermo::{saturation_specific_humidity_field, Phase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An atmosphere that hands a fixed downward energy flux to the surface
///
/// With `sentinel` enabled the radiative flux it publishes equals the number
/// of steps it has taken, so surface models can check which step's fluxes
/// they received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ConstantFluxAtmosphere {
    name: String,
    space: Arc<BoundarySpace>,
    t: Time,
    pub steps: usize,
    /// Downward energy flux delivered to the surface
    /// unit: W / m^2
    energy_flux: FloatValue,
    /// Coupler convention: negative means falling
    liquid_precipitation: FloatValue,
    snow_precipitation: FloatValue,
    sentinel: bool,
    energy: FieldBuffer,
    water: FieldBuffer,
    pub surface_temperature: FieldBuffer,
    pub surface_albedo: FieldBuffer,
    pub pulled_energy_flux: FieldBuffer,
    pub pulled_moisture_flux: FieldBuffer,
    pub co2: FloatValue,
}

impl ConstantFluxAtmosphere {
    pub fn new(name: &str, space: Arc<BoundarySpace>, energy_flux: FloatValue) -> Self {
        Self {
            name: name.to_string(),
            t: 0.0,
            steps: 0,
            energy_flux,
            liquid_precipitation: 0.0,
            snow_precipitation: 0.0,
            sentinel: false,
            energy: space.zeros(),
            water: space.zeros(),
            surface_temperature: space.zeros(),
            surface_albedo: space.zeros(),
            pulled_energy_flux: space.zeros(),
            pulled_moisture_flux: space.zeros(),
            co2: 280.0,
            space,
        }
    }

    pub fn with_energy(mut self, density: FloatValue) -> Self {
        self.energy.fill(density);
        self
    }

    pub fn with_water(mut self, density: FloatValue) -> Self {
        self.water.fill(density);
        self
    }

    pub fn with_precipitation(mut self, liquid: FloatValue, snow: FloatValue) -> Self {
        self.liquid_precipitation = liquid;
        self.snow_precipitation = snow;
        self
    }

    pub fn with_sentinel(mut self) -> Self {
        self.sentinel = true;
        self
    }

    pub fn with_start_time(mut self, t: Time) -> Self {
        self.t = t;
        self
    }

    fn radiative_flux(&self) -> FloatValue {
        if self.sentinel {
            self.steps as FloatValue
        } else {
            0.0
        }
    }
}

#[typetag::serde]
impl ComponentModel for ConstantFluxAtmosphere {
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
        let value = match field {
            FieldTag::AirTemperature => self.space.filled(285.0),
            FieldTag::AirHumidity => self.space.filled(0.008),
            FieldTag::AirDensity => self.space.filled(1.2),
            FieldTag::WindSpeed => self.space.filled(5.0),
            FieldTag::ReferenceHeight => self.space.filled(10.0),
            FieldTag::SurfaceTemperature => self.surface_temperature.clone(),
            FieldTag::TurbulentEnergyFlux => self.space.filled(-self.energy_flux),
            FieldTag::TurbulentMoistureFlux => self.space.zeros(),
            FieldTag::RadiativeEnergyFlux => self.space.filled(self.radiative_flux()),
            FieldTag::TopOfAtmosphereFlux => self.space.zeros(),
            FieldTag::LiquidPrecipitation => self.space.filled(self.liquid_precipitation),
            FieldTag::SnowPrecipitation => self.space.filled(self.snow_precipitation),
            FieldTag::Co2 => return Ok(FieldValue::Scalar(self.co2)),
            _ => return Err(unsupported(&self.name, field)),
        };
        Ok(FieldValue::Field(value))
    }

    fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()> {
        if field == FieldTag::Co2 {
            self.co2 = value.expect_scalar(field)?;
            return Ok(());
        }
        let target = match field {
            FieldTag::SurfaceTemperature => &mut self.surface_temperature,
            FieldTag::SurfaceAlbedo => &mut self.surface_albedo,
            FieldTag::TurbulentEnergyFlux => &mut self.pulled_energy_flux,
            FieldTag::TurbulentMoistureFlux => &mut self.pulled_moisture_flux,
            _ => return Err(unsupported(&self.name, field)),
        };
        target.assign(value.expect_field(&self.space, field)?);
        Ok(())
    }

    fn step(&mut self, t_target: Time) -> ESMCResult<()> {
        let dt = t_target - self.t;
        if dt < 0.0 {
            return Err(ESMCError::Integration {
                component: self.name.clone(),
                details: format!("cannot step backwards to {}", t_target),
            });
        }
        self.energy -= self.energy_flux * dt;
        self.water += (self.liquid_precipitation + self.snow_precipitation) * dt;
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

/// A surface that stores the energy and water it receives
///
/// Temperature is `energy / heat_capacity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreSurface {
    name: String,
    kind: ModelKind,
    space: Arc<BoundarySpace>,
    t: Time,
    /// unit: J / m^2 / K
    heat_capacity: FloatValue,
    energy: FieldBuffer,
    water: FieldBuffer,
    area_fraction: FieldBuffer,
    air_density: FieldBuffer,
    pub turbulent_energy_flux: FieldBuffer,
    pub radiative_flux: FieldBuffer,
    pub evaporation: FieldBuffer,
    pub liquid_precipitation: FieldBuffer,
    pub snow_precipitation: FieldBuffer,
    /// Radiative flux in the first column at each step
    pub seen_radiative: Vec<FloatValue>,
    #[serde(default)]
    fail_reinit: bool,
}

impl StoreSurface {
    pub fn new(
        name: &str,
        kind: ModelKind,
        space: Arc<BoundarySpace>,
        temperature: FloatValue,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            t: 0.0,
            heat_capacity: 1.0,
            energy: space.filled(temperature),
            water: space.zeros(),
            area_fraction: space.zeros(),
            air_density: space.filled(1.2),
            turbulent_energy_flux: space.zeros(),
            radiative_flux: space.zeros(),
            evaporation: space.zeros(),
            liquid_precipitation: space.zeros(),
            snow_precipitation: space.zeros(),
            seen_radiative: Vec::new(),
            fail_reinit: false,
            space,
        }
    }

    /// Make every call to `reinit` fail
    pub fn with_failing_reinit(mut self) -> Self {
        self.fail_reinit = true;
        self
    }

    pub fn with_heat_capacity(mut self, heat_capacity: FloatValue) -> Self {
        let temperature = self.temperature();
        self.heat_capacity = heat_capacity;
        self.energy = temperature * heat_capacity;
        self
    }

    pub fn with_area_fraction(mut self, fraction: FloatValue) -> Self {
        self.area_fraction.fill(fraction);
        self
    }

    pub fn with_start_time(mut self, t: Time) -> Self {
        self.t = t;
        self
    }

    pub fn temperature(&self) -> FieldBuffer {
        &self.energy / self.heat_capacity
    }

    pub fn water(&self) -> &FieldBuffer {
        &self.water
    }
}

#[typetag::serde]
impl ComponentModel for StoreSurface {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn space(&self) -> &BoundarySpace {
        &self.space
    }

    fn current_time(&self) -> Option<Time> {
        Some(self.t)
    }

    fn get_field(&self, field: FieldTag) -> ESMCResult<FieldValue> {
        let value = match field {
            FieldTag::AreaFraction => self.area_fraction.clone(),
            FieldTag::SurfaceTemperature => self.temperature(),
            FieldTag::RoughnessMomentum | FieldTag::RoughnessBuoyancy => self.space.filled(1e-3),
            FieldTag::SurfaceAlbedo => self.space.filled(0.3),
            FieldTag::Beta => self.space.filled(1.0),
            FieldTag::SurfaceAirDensity => self.air_density.clone(),
            FieldTag::SurfaceHumidity => saturation_specific_humidity_field(
                &self.temperature(),
                &self.air_density,
                Phase::Liquid,
            ),
            _ => return Err(unsupported(&self.name, field)),
        };
        Ok(FieldValue::Field(value))
    }

    fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()> {
        let target = match field {
            FieldTag::AreaFraction => &mut self.area_fraction,
            FieldTag::SurfaceAirDensity => &mut self.air_density,
            FieldTag::TurbulentEnergyFlux => &mut self.turbulent_energy_flux,
            FieldTag::RadiativeEnergyFlux => &mut self.radiative_flux,
            FieldTag::Evaporation => &mut self.evaporation,
            FieldTag::LiquidPrecipitation => &mut self.liquid_precipitation,
            FieldTag::SnowPrecipitation => &mut self.snow_precipitation,
            _ => return Err(unsupported(&self.name, field)),
        };
        target.assign(value.expect_field(&self.space, field)?);
        Ok(())
    }

    fn step(&mut self, t_target: Time) -> ESMCResult<()> {
        let dt = t_target - self.t;
        if dt < 0.0 {
            return Err(ESMCError::Integration {
                component: self.name.clone(),
                details: format!("cannot step backwards to {}", t_target),
            });
        }
        self.energy -= &((&self.turbulent_energy_flux + &self.radiative_flux) * dt);
        self.water += &((&self.liquid_precipitation + &self.snow_precipitation - &self.evaporation)
            * (RHO_LIQ * dt));
        self.seen_radiative.push(self.radiative_flux[0]);
        self.t = t_target;
        Ok(())
    }

    fn reinit(&mut self) -> ESMCResult<()> {
        if self.fail_reinit {
            return Err(ESMCError::Integration {
                component: self.name.clone(),
                details: "cannot rebuild state".to_string(),
            });
        }
        Ok(())
    }

    fn conserved_total(&self, quantity: ConservedQuantity) -> Option<FieldBuffer> {
        match quantity {
            ConservedQuantity::Energy => Some(self.energy.clone()),
            ConservedQuantity::Water => Some(self.water.clone()),
        }
    }
}
