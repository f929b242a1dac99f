//! The pull/push flux exchange between the atmosphere and the surface models.
//!
//! Within one coupling step the exchange runs in a fixed order:
//!
//! 1. [`atmos_pull`]: combine the surface state, compute turbulent fluxes and
//!    hand both to the atmosphere
//! 2. the atmosphere steps
//! 3. [`atmos_push`]: copy the atmosphere's fluxes into the coupler fields
//! 4. [`land_pull`], [`ocean_pull`], [`ice_pull`]: distribute those fluxes to
//!    the surface models
//! 5. the surface models step
//!
//! Surface feedback on the atmosphere therefore lags by one coupling interval.
//!
//! # Sign conventions
//!
//! Coupler fluxes are positive upward. Precipitation is stored with the
//! atmosphere's convention, so falling rain is negative. The land model
//! expects precipitation and evaporation as positive-downward and
//! positive-upward liquid-water volume rates (m/s); [`land_pull`] performs
//! that conversion, including the change of sign of the precipitation.

use crate::constants::RHO_LIQ;
use crate::errors::ESMCResult;
use crate::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue};
use crate::component::{ComponentModel, ModelSims};
use crate::registry::FieldRegistry;
use crate::surface::{SurfaceMasks, SurfaceType};
use crate::surface_fluxes::{
    turbulent_fluxes, AtmosState, FluxStrategy, PartitionedFluxes, SurfaceState, TurbulentFluxes,
};
use crate::thermo::surface_air_density_field;
use crate::CoupledSimulation;

/// Coupler fields every simulation must register
pub const EXCHANGED_FIELDS: [FieldTag; 12] = [
    FieldTag::SurfaceTemperature,
    FieldTag::RoughnessMomentum,
    FieldTag::RoughnessBuoyancy,
    FieldTag::SurfaceHumidity,
    FieldTag::SurfaceAlbedo,
    FieldTag::Beta,
    FieldTag::SurfaceAirDensity,
    FieldTag::TurbulentEnergyFlux,
    FieldTag::TurbulentMoistureFlux,
    FieldTag::RadiativeEnergyFlux,
    FieldTag::LiquidPrecipitation,
    FieldTag::SnowPrecipitation,
];

/// Surface properties blended into a single field per column
pub const COMBINED_SURFACE_FIELDS: [FieldTag; 6] = [
    FieldTag::SurfaceTemperature,
    FieldTag::RoughnessMomentum,
    FieldTag::RoughnessBuoyancy,
    FieldTag::SurfaceAlbedo,
    FieldTag::SurfaceHumidity,
    FieldTag::Beta,
];

/// Fluxes published by the atmosphere in [`atmos_push`]
pub const ATMOS_FLUXES: [FieldTag; 5] = [
    FieldTag::TurbulentEnergyFlux,
    FieldTag::TurbulentMoistureFlux,
    FieldTag::RadiativeEnergyFlux,
    FieldTag::LiquidPrecipitation,
    FieldTag::SnowPrecipitation,
];

fn read_field(
    model: &dyn ComponentModel,
    space: &BoundarySpace,
    field: FieldTag,
) -> ESMCResult<FieldBuffer> {
    model.get_field(field)?.into_field(space, field)
}

/// Blend the surface models' properties into the coupler fields
pub fn import_combined_surface_fields(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    let masks = cs.masks.fresh()?;
    combine_surface_fields(&mut cs.fields, &cs.model_sims, &cs.space, masks)
}

pub(crate) fn combine_surface_fields(
    fields: &mut FieldRegistry,
    sims: &ModelSims,
    space: &BoundarySpace,
    masks: &SurfaceMasks,
) -> ESMCResult<()> {
    for field in COMBINED_SURFACE_FIELDS {
        let land = read_field(sims.land.as_ref(), space, field)?;
        let ocean = read_field(sims.ocean.as_ref(), space, field)?;
        let ice = read_field(sims.ice.as_ref(), space, field)?;
        let combined = masks.combine(field, &land, &ocean, &ice)?;
        fields.set(field, &combined)?;
    }
    Ok(())
}

fn atmos_state(cs: &CoupledSimulation) -> ESMCResult<AtmosState> {
    let atmos = cs.model_sims.atmos.as_ref();
    Ok(AtmosState {
        temperature: read_field(atmos, &cs.space, FieldTag::AirTemperature)?,
        humidity: read_field(atmos, &cs.space, FieldTag::AirHumidity)?,
        density: read_field(atmos, &cs.space, FieldTag::AirDensity)?,
        wind_speed: read_field(atmos, &cs.space, FieldTag::WindSpeed)?,
        height: read_field(atmos, &cs.space, FieldTag::ReferenceHeight)?,
    })
}

fn combined_surface_state(cs: &CoupledSimulation) -> ESMCResult<SurfaceState> {
    let fields = &cs.fields;
    Ok(SurfaceState {
        temperature: fields.get(FieldTag::SurfaceTemperature)?.clone(),
        humidity: fields.get(FieldTag::SurfaceHumidity)?.clone(),
        air_density: fields.get(FieldTag::SurfaceAirDensity)?.clone(),
        roughness_momentum: fields.get(FieldTag::RoughnessMomentum)?.clone(),
        roughness_buoyancy: fields.get(FieldTag::RoughnessBuoyancy)?.clone(),
        beta: fields.get(FieldTag::Beta)?.clone(),
    })
}

fn model_surface_state(
    model: &dyn ComponentModel,
    space: &BoundarySpace,
    air_density: FieldBuffer,
) -> ESMCResult<SurfaceState> {
    Ok(SurfaceState {
        temperature: read_field(model, space, FieldTag::SurfaceTemperature)?,
        humidity: read_field(model, space, FieldTag::SurfaceHumidity)?,
        air_density,
        roughness_momentum: read_field(model, space, FieldTag::RoughnessMomentum)?,
        roughness_buoyancy: read_field(model, space, FieldTag::RoughnessBuoyancy)?,
        beta: read_field(model, space, FieldTag::Beta)?,
    })
}

/// Prepare the atmosphere for its next step
///
/// Extrapolates the air density to the surface, blends the surface state,
/// evaluates the turbulent fluxes with the run's [`FluxStrategy`] and writes
/// the combined surface temperature, albedo and fluxes into the atmosphere.
pub fn atmos_pull(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    let space = cs.space.clone();
    let atmos = atmos_state(cs)?;

    // Surface air density depends on the current atmospheric state and is
    // recomputed on every pull. Each surface gets the density over its own
    // temperature so that its saturation humidity is consistent.
    let t_sfc = cs.fields.get(FieldTag::SurfaceTemperature)?.clone();
    let rho_sfc = surface_air_density_field(&atmos.density, &atmos.temperature, &t_sfc);
    cs.fields.set(FieldTag::SurfaceAirDensity, &rho_sfc)?;

    let mut surface_density = |surface: SurfaceType| -> ESMCResult<FieldBuffer> {
        let model = cs.model_sims.surface_mut(surface);
        let t_surface = read_field(model.as_ref(), &space, FieldTag::SurfaceTemperature)?;
        let rho = surface_air_density_field(&atmos.density, &atmos.temperature, &t_surface);
        model.update_field(FieldTag::SurfaceAirDensity, &FieldValue::Field(rho.clone()))?;
        Ok(rho)
    };
    let surface_densities = [
        surface_density(SurfaceType::Land)?,
        surface_density(SurfaceType::Ocean)?,
        surface_density(SurfaceType::Ice)?,
    ];

    // Saturation humidity depends on the new densities
    import_combined_surface_fields(cs)?;

    let fluxes = match cs.flux_strategy {
        FluxStrategy::CombinedState => {
            let surface = combined_surface_state(cs)?;
            cs.partitioned_fluxes = None;
            turbulent_fluxes(cs.flux_scheme.as_ref(), &atmos, &surface, None)?
        }
        FluxStrategy::PartitionedState => {
            let masks = cs.masks.fresh()?;
            let [rho_land, rho_ocean, rho_ice] = surface_densities;
            let surface_fluxes =
                |surface: SurfaceType, rho: FieldBuffer| -> ESMCResult<TurbulentFluxes> {
                    let state = model_surface_state(cs.model_sims.surface(surface), &space, rho)?;
                    turbulent_fluxes(
                        cs.flux_scheme.as_ref(),
                        &atmos,
                        &state,
                        Some(masks.fraction(surface)),
                    )
                };
            let partitioned = PartitionedFluxes {
                land: surface_fluxes(SurfaceType::Land, rho_land)?,
                ocean: surface_fluxes(SurfaceType::Ocean, rho_ocean)?,
                ice: surface_fluxes(SurfaceType::Ice, rho_ice)?,
            };
            let combined = TurbulentFluxes {
                energy: masks.combine(
                    FieldTag::TurbulentEnergyFlux,
                    &partitioned.land.energy,
                    &partitioned.ocean.energy,
                    &partitioned.ice.energy,
                )?,
                moisture: masks.combine(
                    FieldTag::TurbulentMoistureFlux,
                    &partitioned.land.moisture,
                    &partitioned.ocean.moisture,
                    &partitioned.ice.moisture,
                )?,
            };
            cs.partitioned_fluxes = Some(partitioned);
            combined
        }
    };
    cs.fields.set(FieldTag::TurbulentEnergyFlux, &fluxes.energy)?;
    cs.fields.set(FieldTag::TurbulentMoistureFlux, &fluxes.moisture)?;

    let atmos_model = &mut cs.model_sims.atmos;
    for field in [
        FieldTag::SurfaceTemperature,
        FieldTag::SurfaceAlbedo,
        FieldTag::TurbulentEnergyFlux,
        FieldTag::TurbulentMoistureFlux,
    ] {
        let values = cs.fields.get(field)?.clone();
        atmos_model.update_field(field, &FieldValue::Field(values))?;
    }

    log::debug!(
        "atmos_pull: mean T_sfc {:.3} K, mean F_turb_energy {:.3} W/m^2",
        space.global_mean(cs.fields.get(FieldTag::SurfaceTemperature)?),
        space.global_mean(&fluxes.energy)
    );
    Ok(())
}

/// Copy the fluxes computed by the atmosphere into the coupler fields
pub fn atmos_push(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    for field in ATMOS_FLUXES {
        let values = read_field(cs.model_sims.atmos.as_ref(), &cs.space, field)?;
        cs.fields.set(field, &values)?;
    }
    Ok(())
}

/// Turbulent fluxes a surface should receive under the run's flux strategy
fn surface_turbulent_fluxes(
    cs: &CoupledSimulation,
    surface: SurfaceType,
) -> ESMCResult<(FieldBuffer, FieldBuffer)> {
    match (cs.flux_strategy, &cs.partitioned_fluxes) {
        (FluxStrategy::PartitionedState, Some(partitioned)) => {
            let fluxes = partitioned.get(surface);
            Ok((fluxes.energy.clone(), fluxes.moisture.clone()))
        }
        _ => Ok((
            cs.fields.get(FieldTag::TurbulentEnergyFlux)?.clone(),
            cs.fields.get(FieldTag::TurbulentMoistureFlux)?.clone(),
        )),
    }
}

fn skip_prescribed(cs: &CoupledSimulation, surface: SurfaceType) -> bool {
    let model = cs.model_sims.surface(surface);
    if model.is_prescribed() {
        log::debug!("Skipping flux pull for prescribed {} model '{}'", surface, model.name());
        true
    } else {
        false
    }
}

/// Distribute the coupler fluxes to the land model
///
/// Evaporation is converted to a liquid-water rate (m/s, positive upward) and
/// precipitation to a positive-downward liquid-water rate.
pub fn land_pull(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    if skip_prescribed(cs, SurfaceType::Land) {
        return Ok(());
    }
    let (energy, moisture) = surface_turbulent_fluxes(cs, SurfaceType::Land)?;
    let radiative = cs.fields.get(FieldTag::RadiativeEnergyFlux)?.clone();
    let evaporation = moisture / RHO_LIQ;
    let liquid = cs.fields.get(FieldTag::LiquidPrecipitation)?.mapv(|p| -p / RHO_LIQ);
    let snow = cs.fields.get(FieldTag::SnowPrecipitation)?.mapv(|p| -p / RHO_LIQ);

    let land = &mut cs.model_sims.land;
    land.update_field(FieldTag::TurbulentEnergyFlux, &FieldValue::Field(energy))?;
    land.update_field(FieldTag::RadiativeEnergyFlux, &FieldValue::Field(radiative))?;
    land.update_field(FieldTag::Evaporation, &FieldValue::Field(evaporation))?;
    land.update_field(FieldTag::LiquidPrecipitation, &FieldValue::Field(liquid))?;
    land.update_field(FieldTag::SnowPrecipitation, &FieldValue::Field(snow))?;
    Ok(())
}

/// Ocean and sea ice only need the turbulent energy and radiative fluxes
fn energy_pull(cs: &mut CoupledSimulation, surface: SurfaceType) -> ESMCResult<()> {
    if skip_prescribed(cs, surface) {
        return Ok(());
    }
    let (energy, _) = surface_turbulent_fluxes(cs, surface)?;
    let radiative = cs.fields.get(FieldTag::RadiativeEnergyFlux)?.clone();

    let model = cs.model_sims.surface_mut(surface);
    model.update_field(FieldTag::TurbulentEnergyFlux, &FieldValue::Field(energy))?;
    model.update_field(FieldTag::RadiativeEnergyFlux, &FieldValue::Field(radiative))?;
    Ok(())
}

/// Distribute the turbulent energy and radiative fluxes to the ocean model
///
/// Prescribed oceans are left untouched.
pub fn ocean_pull(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    energy_pull(cs, SurfaceType::Ocean)
}

/// Distribute the turbulent energy and radiative fluxes to the sea-ice model
///
/// Prescribed sea ice is left untouched.
pub fn ice_pull(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    energy_pull(cs, SurfaceType::Ice)
}

/// Distribute the currently cached coupler state to the components
pub fn update_model_sims(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    atmos_pull(cs)
}
