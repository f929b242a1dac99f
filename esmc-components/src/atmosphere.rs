//! Single-layer column atmosphere
//!
//! Each column is one well-mixed layer with temperature $T$ and specific
//! humidity $q$ over a column mass $M = p_s / g$. The layer is transparent to
//! sunlight and a gray absorber of emissivity $\epsilon$ in the longwave.
//! With the surface at $T_s$ and albedo $\alpha$, the net upward radiative
//! fluxes at the surface and at the top of the atmosphere are
//!
//! $$ F_{rad} = \sigma T_s^4 - \epsilon \sigma T^4 - (1 - \alpha) S $$
//! $$ F_{toa} = (1 - \epsilon) \sigma T_s^4 + \epsilon \sigma T^4 - (1 - \alpha) S $$
//!
//! Supersaturation relaxes into precipitation at the rate
//! $P = M \max(q - q_{sat}, 0) / \tau$, falling as snow when the near-surface
//! air is below freezing. The layer evolves as
//!
//! $$ M c_p \frac{dT}{dt} = SH + F_{rad} - F_{toa} + L_v P $$
//! $$ M \frac{dq}{dt} = E - P $$
//!
//! where $SH$ and $E$ are the sensible heat and moisture fluxes supplied by
//! the coupler. The column energy $M (c_p T + L_v q)$ therefore changes only
//! through the surface and top-of-atmosphere fluxes. All fluxes the model
//! publishes are means over the last coupling interval.

use crate::parameters::ColumnAtmosphereParameters;
use crate::solver::{advance_column, interval};
use esmc_core::component::{unsupported, ComponentModel, ModelKind};
use esmc_core::conservation::ConservedQuantity;
use esmc_core::constants::{CP_D, GRAV, LH_V0, R_D, STEFAN_BOLTZMANN, T_FREEZE};
use esmc_core::errors::{ESMCError, ESMCResult};
use esmc_core::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use esmc_core::ivp::IVP;
use esmc_core::thermo::{saturation_specific_humidity, Phase};
use ode_solvers::Vector6;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Layer temperature and humidity followed by the time integrals of the
/// surface radiative flux, the TOA flux, rain and snow
type ModelState = Vector6<FloatValue>;

/// Forcing of one atmospheric column over a coupling interval
struct AtmosColumn<'a> {
    parameters: &'a ColumnAtmosphereParameters,
    column_mass: FloatValue,
    emissivity: FloatValue,
    surface_emission: FloatValue,
    absorbed_shortwave: FloatValue,
    sensible_heat: FloatValue,
    evaporation: FloatValue,
}

impl AtmosColumn<'_> {
    fn layer_density(&self, temperature: FloatValue) -> FloatValue {
        0.5 * self.parameters.surface_pressure / (R_D * temperature)
    }
}

impl IVP<ModelState> for AtmosColumn<'_> {
    fn calculate_dy_dt(&self, _t: Time, y: &ModelState, dy_dt: &mut ModelState) {
        let temperature = y[0];
        let humidity = y[1];
        let p = self.parameters;

        let layer_emission = self.emissivity * STEFAN_BOLTZMANN * temperature.powi(4);
        let surface_radiative = self.surface_emission - layer_emission - self.absorbed_shortwave;
        let toa = (1.0 - self.emissivity) * self.surface_emission + layer_emission
            - self.absorbed_shortwave;

        let q_sat = saturation_specific_humidity(
            temperature,
            self.layer_density(temperature),
            Phase::Liquid,
        );
        let precipitation =
            self.column_mass * (humidity - q_sat).max(0.0) / p.condensation_timescale;

        dy_dt[0] = (self.sensible_heat + surface_radiative - toa + LH_V0 * precipitation)
            / (self.column_mass * CP_D);
        dy_dt[1] = (self.evaporation - precipitation) / self.column_mass;
        dy_dt[2] = surface_radiative;
        dy_dt[3] = toa;
        if temperature + p.near_surface_offset >= T_FREEZE {
            dy_dt[4] = precipitation;
            dy_dt[5] = 0.0;
        } else {
            dy_dt[4] = 0.0;
            dy_dt[5] = precipitation;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnAtmosphere {
    name: String,
    parameters: ColumnAtmosphereParameters,
    space: Arc<BoundarySpace>,
    t: Time,
    /// Layer temperature
    /// unit: K
    temperature: FieldBuffer,
    /// unit: kg / kg
    humidity: FieldBuffer,
    /// Annual-mean top-of-atmosphere insolation
    /// unit: W / m^2
    insolation: FieldBuffer,
    /// unit: ppm
    co2: FloatValue,
    surface_temperature: FieldBuffer,
    surface_albedo: FieldBuffer,
    turbulent_energy_flux: FieldBuffer,
    turbulent_moisture_flux: FieldBuffer,
    radiative_flux: FieldBuffer,
    toa_flux: FieldBuffer,
    /// Coupler convention: negative when falling
    /// unit: kg / m^2 / s
    liquid_precipitation: FieldBuffer,
    snow_precipitation: FieldBuffer,
}

impl ColumnAtmosphere {
    pub fn from_parameters(
        name: &str,
        space: Arc<BoundarySpace>,
        parameters: ColumnAtmosphereParameters,
    ) -> Self {
        let insolation = match space.latitudes() {
            Some(latitudes) => latitudes.mapv(|lat| {
                let x = lat.to_radians().sin();
                let p2 = 0.5 * (3.0 * x * x - 1.0);
                0.25 * parameters.solar_constant * (1.0 - parameters.insolation_contrast * p2)
            }),
            None => space.filled(0.25 * parameters.solar_constant),
        };

        let t0 = parameters.initial_temperature;
        let rho = 0.5 * parameters.surface_pressure / (R_D * t0);
        let q0 = parameters.initial_relative_humidity
            * saturation_specific_humidity(t0, rho, Phase::Liquid);

        Self {
            name: name.to_string(),
            t: 0.0,
            temperature: space.filled(t0),
            humidity: space.filled(q0),
            insolation,
            co2: parameters.co2,
            surface_temperature: space.filled(t0 + parameters.near_surface_offset),
            surface_albedo: space.filled(0.3),
            turbulent_energy_flux: space.zeros(),
            turbulent_moisture_flux: space.zeros(),
            radiative_flux: space.zeros(),
            toa_flux: space.zeros(),
            liquid_precipitation: space.zeros(),
            snow_precipitation: space.zeros(),
            parameters,
            space,
        }
    }

    pub fn with_start_time(mut self, t: Time) -> Self {
        self.t = t;
        self
    }

    pub fn temperature(&self) -> &FieldBuffer {
        &self.temperature
    }

    pub fn humidity(&self) -> &FieldBuffer {
        &self.humidity
    }

    pub fn insolation(&self) -> &FieldBuffer {
        &self.insolation
    }

    /// Column mass per unit area
    /// unit: kg / m^2
    pub fn column_mass(&self) -> FloatValue {
        self.parameters.surface_pressure / GRAV
    }

    /// Longwave emissivity at the current CO2 concentration
    pub fn emissivity(&self) -> FloatValue {
        let p = &self.parameters;
        (p.emissivity + p.emissivity_co2_sensitivity * (self.co2 / p.reference_co2).ln())
            .clamp(0.0, 1.0)
    }

    fn near_surface_temperature(&self) -> FieldBuffer {
        &self.temperature + self.parameters.near_surface_offset
    }
}

#[typetag::serde]
impl ComponentModel for ColumnAtmosphere {
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
            FieldTag::AirTemperature => self.near_surface_temperature(),
            FieldTag::AirHumidity => self.humidity.clone(),
            FieldTag::AirDensity => self
                .near_surface_temperature()
                .mapv(|t| self.parameters.surface_pressure / (R_D * t)),
            FieldTag::WindSpeed => self.space.filled(self.parameters.wind_speed),
            FieldTag::ReferenceHeight => self.space.filled(self.parameters.reference_height),
            FieldTag::SurfaceTemperature => self.surface_temperature.clone(),
            FieldTag::SurfaceAlbedo => self.surface_albedo.clone(),
            FieldTag::TurbulentEnergyFlux => self.turbulent_energy_flux.clone(),
            FieldTag::TurbulentMoistureFlux => self.turbulent_moisture_flux.clone(),
            FieldTag::RadiativeEnergyFlux => self.radiative_flux.clone(),
            FieldTag::TopOfAtmosphereFlux => self.toa_flux.clone(),
            FieldTag::LiquidPrecipitation => self.liquid_precipitation.clone(),
            FieldTag::SnowPrecipitation => self.snow_precipitation.clone(),
            FieldTag::Co2 => return Ok(FieldValue::Scalar(self.co2)),
            _ => return Err(unsupported(&self.name, field)),
        };
        Ok(FieldValue::Field(values))
    }

    fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()> {
        if field == FieldTag::Co2 {
            let co2 = value.expect_scalar(field)?;
            if !(co2 > 0.0 && co2.is_finite()) {
                return Err(ESMCError::InvalidData(format!(
                    "CO2 concentration must be positive, got {}",
                    co2
                )));
            }
            self.co2 = co2;
            return Ok(());
        }
        let target = match field {
            FieldTag::SurfaceTemperature => &mut self.surface_temperature,
            FieldTag::SurfaceAlbedo => &mut self.surface_albedo,
            FieldTag::TurbulentEnergyFlux => &mut self.turbulent_energy_flux,
            FieldTag::TurbulentMoistureFlux => &mut self.turbulent_moisture_flux,
            _ => return Err(unsupported(&self.name, field)),
        };
        target.assign(value.expect_field(&self.space, field)?);
        Ok(())
    }

    fn step(&mut self, t_target: Time) -> ESMCResult<()> {
        let dt = interval(&self.name, self.t, t_target)?;
        if dt == 0.0 {
            return Ok(());
        }
        let column_mass = self.column_mass();
        let emissivity = self.emissivity();

        for i in 0..self.space.size() {
            let column = AtmosColumn {
                parameters: &self.parameters,
                column_mass,
                emissivity,
                surface_emission: STEFAN_BOLTZMANN * self.surface_temperature[i].powi(4),
                absorbed_shortwave: (1.0 - self.surface_albedo[i]) * self.insolation[i],
                sensible_heat: self.turbulent_energy_flux[i]
                    - LH_V0 * self.turbulent_moisture_flux[i],
                evaporation: self.turbulent_moisture_flux[i],
            };
            let y0 = ModelState::new(self.temperature[i], self.humidity[i], 0.0, 0.0, 0.0, 0.0);
            let y = advance_column(
                &self.name,
                column,
                y0,
                self.t,
                t_target,
                self.parameters.max_substep,
            )?;

            self.temperature[i] = y[0];
            self.humidity[i] = y[1];
            self.radiative_flux[i] = y[2] / dt;
            self.toa_flux[i] = y[3] / dt;
            self.liquid_precipitation[i] = -y[4] / dt;
            self.snow_precipitation[i] = -y[5] / dt;
        }

        log::debug!(
            "{}: mean T = {:.3} K, mean F_toa = {:.3} W/m^2",
            self.name,
            self.space.global_mean(&self.temperature),
            self.space.global_mean(&self.toa_flux)
        );
        self.t = t_target;
        Ok(())
    }

    fn reinit(&mut self) -> ESMCResult<()> {
        for (tag, values) in [
            (FieldTag::AirTemperature, &self.temperature),
            (FieldTag::AirHumidity, &self.humidity),
        ] {
            self.space.check(tag, values)?;
        }
        Ok(())
    }

    fn conserved_total(&self, quantity: ConservedQuantity) -> Option<FieldBuffer> {
        let column_mass = self.column_mass();
        match quantity {
            ConservedQuantity::Energy => Some(
                (&self.temperature * CP_D + &self.humidity * LH_V0) * column_mass,
            ),
            ConservedQuantity::Water => Some(&self.humidity * column_mass),
        }
    }
}
