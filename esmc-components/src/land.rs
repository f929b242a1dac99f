//! Bucket land model
//!
//! Each column holds a soil temperature $T$, bucket water $W$, snow water
//! equivalent $S$ and the runoff $R$ drained from the bucket since the start
//! of the run. Over a coupling interval the forcing from the coupler is held
//! constant:
//!
//! $$ C \frac{dT}{dt} = -(F_{turb} + F_{rad}) $$
//! $$ \frac{dW}{dt} = P_{liq} - E + M - Q, \quad \frac{dS}{dt} = P_{snow} - M, \quad \frac{dR}{dt} = Q $$
//!
//! where $M$ is degree-day snow melt and $Q$ drains water above the bucket
//! capacity. Water amounts are depths of liquid water (m) and precipitation
//! and evaporation are liquid-water rates (m/s). Melting is treated as
//! energy-neutral.
//!
//! The evaporation efficiency exposed to the flux calculation is
//! $\beta = \min(W / (0.75 W_{cap}), 1)$.

use crate::parameters::BucketLandParameters;
use crate::solver::{advance_column, interval};
use esmc_core::component::{unsupported, ComponentModel, ModelKind};
use esmc_core::conservation::ConservedQuantity;
use esmc_core::constants::{RHO_LIQ, T_FREEZE};
use esmc_core::errors::ESMCResult;
use esmc_core::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use esmc_core::ivp::IVP;
use esmc_core::thermo::{saturation_specific_humidity, Phase};
use ndarray::Zip;
use ode_solvers::Vector4;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ModelState = Vector4<FloatValue>;

/// Snow depth below which melt is throttled so the pack cannot go negative
const MELT_THROTTLE_DEPTH: FloatValue = 1.0e-3;

/// Forcing and parameters of one land column over a coupling interval
struct BucketColumn<'a> {
    parameters: &'a BucketLandParameters,
    upward_energy_flux: FloatValue,
    evaporation: FloatValue,
    liquid_precipitation: FloatValue,
    snow_precipitation: FloatValue,
}

impl IVP<ModelState> for BucketColumn<'_> {
    fn calculate_dy_dt(&self, _t: Time, y: &ModelState, dy_dt: &mut ModelState) {
        let temperature = y[0];
        let water = y[1];
        let snow = y[2];
        let p = self.parameters;

        let melt = p.melt_factor
            * (temperature - T_FREEZE).max(0.0)
            * (snow / MELT_THROTTLE_DEPTH).clamp(0.0, 1.0);
        let runoff = (water - p.bucket_capacity).max(0.0) / p.runoff_timescale;

        dy_dt[0] = -self.upward_energy_flux / p.heat_capacity;
        dy_dt[1] = self.liquid_precipitation - self.evaporation + melt - runoff;
        dy_dt[2] = self.snow_precipitation - melt;
        dy_dt[3] = runoff;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketLand {
    name: String,
    parameters: BucketLandParameters,
    space: Arc<BoundarySpace>,
    t: Time,
    /// unit: K
    temperature: FieldBuffer,
    /// unit: m
    water: FieldBuffer,
    /// unit: m
    snow: FieldBuffer,
    /// Cumulative runoff
    /// unit: m
    runoff: FieldBuffer,
    area_fraction: FieldBuffer,
    air_density: FieldBuffer,
    turbulent_energy_flux: FieldBuffer,
    radiative_flux: FieldBuffer,
    /// unit: m / s, positive upward
    evaporation: FieldBuffer,
    /// unit: m / s, positive downward
    liquid_precipitation: FieldBuffer,
    snow_precipitation: FieldBuffer,
}

impl BucketLand {
    /// A land model covering no area until a land-sea mask is supplied
    pub fn from_parameters(
        name: &str,
        space: Arc<BoundarySpace>,
        parameters: BucketLandParameters,
    ) -> Self {
        Self {
            name: name.to_string(),
            t: 0.0,
            temperature: space.filled(parameters.initial_temperature),
            water: space.filled(parameters.initial_water),
            snow: space.filled(parameters.initial_snow),
            runoff: space.zeros(),
            area_fraction: space.zeros(),
            air_density: space.filled(1.2),
            turbulent_energy_flux: space.zeros(),
            radiative_flux: space.zeros(),
            evaporation: space.zeros(),
            liquid_precipitation: space.zeros(),
            snow_precipitation: space.zeros(),
            parameters,
            space,
        }
    }

    /// Set the fraction of each column covered by land
    pub fn with_area_fraction(mut self, fraction: FieldBuffer) -> ESMCResult<Self> {
        self.space.check(FieldTag::AreaFraction, &fraction)?;
        self.area_fraction = fraction;
        Ok(self)
    }

    pub fn with_temperature(mut self, temperature: FieldBuffer) -> ESMCResult<Self> {
        self.space.check(FieldTag::SurfaceTemperature, &temperature)?;
        self.temperature = temperature;
        Ok(self)
    }

    pub fn with_start_time(mut self, t: Time) -> Self {
        self.t = t;
        self
    }

    pub fn temperature(&self) -> &FieldBuffer {
        &self.temperature
    }

    pub fn water(&self) -> &FieldBuffer {
        &self.water
    }

    pub fn snow(&self) -> &FieldBuffer {
        &self.snow
    }

    pub fn runoff(&self) -> &FieldBuffer {
        &self.runoff
    }

    fn beta(&self) -> FieldBuffer {
        let threshold = 0.75 * self.parameters.bucket_capacity;
        self.water.mapv(|w| (w.max(0.0) / threshold).min(1.0))
    }

    fn albedo(&self) -> FieldBuffer {
        let p = &self.parameters;
        self.snow.mapv(|s| {
            let s = s.max(0.0);
            p.albedo_bare + (p.albedo_snow - p.albedo_bare) * s / (s + p.snow_masking_depth)
        })
    }

    fn surface_humidity(&self) -> FieldBuffer {
        Zip::from(&self.temperature)
            .and(&self.air_density)
            .map_collect(|t, rho| {
                let phase = if *t >= T_FREEZE {
                    Phase::Liquid
                } else {
                    Phase::Ice
                };
                saturation_specific_humidity(*t, *rho, phase)
            })
    }
}

#[typetag::serde]
impl ComponentModel for BucketLand {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Land
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
            FieldTag::SurfaceAlbedo => self.albedo(),
            FieldTag::SurfaceHumidity => self.surface_humidity(),
            FieldTag::Beta => self.beta(),
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
            FieldTag::Evaporation => &mut self.evaporation,
            FieldTag::LiquidPrecipitation => &mut self.liquid_precipitation,
            FieldTag::SnowPrecipitation => &mut self.snow_precipitation,
            _ => return Err(unsupported(&self.name, field)),
        };
        target.assign(value.expect_field(&self.space, field)?);
        Ok(())
    }

    fn step(&mut self, t_target: Time) -> ESMCResult<()> {
        interval(&self.name, self.t, t_target)?;

        for i in 0..self.space.size() {
            let column = BucketColumn {
                parameters: &self.parameters,
                upward_energy_flux: self.turbulent_energy_flux[i] + self.radiative_flux[i],
                evaporation: self.evaporation[i],
                liquid_precipitation: self.liquid_precipitation[i],
                snow_precipitation: self.snow_precipitation[i],
            };
            let y0 = ModelState::new(
                self.temperature[i],
                self.water[i],
                self.snow[i],
                self.runoff[i],
            );
            let y = advance_column(
                &self.name,
                column,
                y0,
                self.t,
                t_target,
                self.parameters.max_substep,
            )?;
            self.temperature[i] = y[0];
            self.water[i] = y[1];
            self.snow[i] = y[2];
            self.runoff[i] = y[3];
        }
        self.t = t_target;
        Ok(())
    }

    fn reinit(&mut self) -> ESMCResult<()> {
        for (tag, values) in [
            (FieldTag::SurfaceTemperature, &self.temperature),
            (FieldTag::AreaFraction, &self.area_fraction),
        ] {
            self.space.check(tag, values)?;
        }
        Ok(())
    }

    fn conserved_total(&self, quantity: ConservedQuantity) -> Option<FieldBuffer> {
        match quantity {
            ConservedQuantity::Energy => Some(&self.temperature * self.parameters.heat_capacity),
            ConservedQuantity::Water => {
                Some((&self.water + &self.snow + &self.runoff) * RHO_LIQ)
            }
        }
    }
}
