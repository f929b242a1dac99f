//! Ready-made coupled experiments
//!
//! An [`ExperimentConfig`] is read from a TOML file holding the coupler
//! settings, the grid and one parameter table per component model:
//!
//! ```toml
//! [coupler]
//! start_date = "1979-01-01"
//! t_end = 864000.0
//! dt_cpl = 3600.0
//!
//! [coupler.conservation]
//! energy = true
//!
//! [grid]
//! n_bands = 12
//! land_band = [-30.0, 30.0]
//!
//! [ocean]
//! depth = 20.0
//! ```
//!
//! Missing parameter tables and keys take their default values.
//!
//! Two experiments are provided:
//!
//! - [`build_slab_planet`]: column atmosphere over bucket land and a slab
//!   ocean. Sea ice is present but covers no area.
//! - [`build_amip`]: column atmosphere over bucket land, with sea-surface
//!   temperature, sea-ice extent and CO2 prescribed from data.

use esmc_components::parameters::{
    BucketLandParameters, ColumnAtmosphereParameters, PrescribedSeaIceParameters,
    SlabOceanParameters,
};
use esmc_components::{BucketLand, ColumnAtmosphere, PrescribedSeaIce, SlabOcean};
use esmc_core::boundary_data::PrescribedBoundaries;
use esmc_core::calendar::CouplerDates;
use esmc_core::component::{ComponentModel, ModelKind, SurfaceStub};
use esmc_core::config::{ConservationConfig, CouplerConfig};
use esmc_core::conservation::ConservationReport;
use esmc_core::constants::EARTH_RADIUS;
use esmc_core::errors::{ESMCError, ESMCResult};
use esmc_core::field::{BoundarySpace, FieldBuffer, FieldTag, FloatValue};
use esmc_core::surface::binary_mask;
use esmc_core::{solve_coupler, CoupledSimulation, CoupledSimulationBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Horizontal layout of an experiment
///
/// The sphere is split into equal-angle latitude bands. Land covers every band
/// whose overlap with `land_band` exceeds half of its width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// Number of latitude bands
    /// Default: 18
    pub n_bands: usize,

    /// Planetary radius (m)
    /// Default: 6.371e6
    pub radius: FloatValue,

    /// Southern and northern edges of the land in degrees latitude
    /// Default: no land
    pub land_band: Option<[FloatValue; 2]>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_bands: 18,
            radius: EARTH_RADIUS,
            land_band: None,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> ESMCResult<()> {
        if self.n_bands == 0 {
            return Err(ESMCError::Config(
                "the grid needs at least one latitude band".to_string(),
            ));
        }
        if !(self.radius > 0.0) {
            return Err(ESMCError::Config(format!(
                "planetary radius must be positive, got {}",
                self.radius
            )));
        }
        if let Some([south, north]) = self.land_band {
            if !(south < north && south >= -90.0 && north <= 90.0) {
                return Err(ESMCError::Config(format!(
                    "invalid land band [{}, {}]",
                    south, north
                )));
            }
        }
        Ok(())
    }

    pub fn space(&self) -> BoundarySpace {
        BoundarySpace::latitude_bands(self.n_bands, self.radius)
    }

    /// Land fraction (0 or 1) of each latitude band
    pub fn land_mask(&self) -> FieldBuffer {
        let n = self.n_bands.max(1);
        let [south, north] = match self.land_band {
            Some(band) => band,
            None => return FieldBuffer::zeros(n),
        };
        let width = 180.0 / n as FloatValue;
        let cover = FieldBuffer::from_shape_fn(n, |j| {
            let lower = -90.0 + j as FloatValue * width;
            let upper = lower + width;
            (upper.min(north) - lower.max(south)).max(0.0) / width
        });
        binary_mask(&cover, 0.5)
    }
}

/// Configuration of a complete coupled experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub coupler: CouplerConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub atmosphere: ColumnAtmosphereParameters,
    #[serde(default)]
    pub land: BucketLandParameters,
    #[serde(default)]
    pub ocean: SlabOceanParameters,
    #[serde(default)]
    pub sea_ice: PrescribedSeaIceParameters,
}

impl ExperimentConfig {
    /// Default components on the default grid
    pub fn new(coupler: CouplerConfig) -> Self {
        Self {
            coupler,
            grid: GridConfig::default(),
            atmosphere: ColumnAtmosphereParameters::default(),
            land: BucketLandParameters::default(),
            ocean: SlabOceanParameters::default(),
            sea_ice: PrescribedSeaIceParameters::default(),
        }
    }

    pub fn from_toml_str(contents: &str) -> ESMCResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ESMCResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> ESMCResult<()> {
        self.coupler.validate()?;
        self.grid.validate()
    }
}

struct Components {
    space: Arc<BoundarySpace>,
    atmos: ColumnAtmosphere,
    land: BucketLand,
    ice: PrescribedSeaIce,
}

/// The components shared by every experiment, with their clocks at the start
fn common_components(config: &ExperimentConfig) -> ESMCResult<Components> {
    config.validate()?;
    let space = Arc::new(config.grid.space());
    let t_start = config.coupler.t_start;

    let atmos =
        ColumnAtmosphere::from_parameters("atmos", space.clone(), config.atmosphere.clone())
            .with_start_time(t_start);
    let land = BucketLand::from_parameters("land", space.clone(), config.land.clone())
        .with_area_fraction(config.grid.land_mask())?
        .with_start_time(t_start);
    let ice = PrescribedSeaIce::from_parameters("ice", space.clone(), config.sea_ice.clone())
        .with_start_time(t_start);

    log::info!(
        "Grid of {} latitude bands, land fraction {:.3}",
        space.size(),
        space.global_mean(&config.grid.land_mask())
    );
    Ok(Components {
        space,
        atmos,
        land,
        ice,
    })
}

/// Atmosphere over bucket land and a slab ocean
pub fn build_slab_planet(config: &ExperimentConfig) -> ESMCResult<CoupledSimulation> {
    let Components {
        space,
        atmos,
        land,
        ice,
    } = common_components(config)?;
    let ocean = SlabOcean::from_parameters("ocean", space.clone(), config.ocean.clone())
        .with_start_time(config.coupler.t_start);

    let mut builder = CoupledSimulationBuilder::from_config(space, &config.coupler)?;
    builder
        .with_atmos(Box::new(atmos))
        .with_land(Box::new(land))
        .with_ocean(Box::new(ocean))
        .with_ice(Box::new(ice));
    builder.build()
}

/// Atmosphere and land over prescribed sea-surface temperature and sea ice
///
/// The ocean is a [`SurfaceStub`] whose temperature is set from
/// `boundaries.sst`. The datasets are evaluated at the start date before the
/// simulation is built so that the initial surface state is consistent with
/// them, and then at every coupling step.
pub fn build_amip(
    config: &ExperimentConfig,
    boundaries: PrescribedBoundaries,
) -> ESMCResult<CoupledSimulation> {
    let Components {
        space,
        mut atmos,
        land,
        mut ice,
    } = common_components(config)?;
    let mut ocean = SurfaceStub::new("ocean", ModelKind::Ocean, space.clone())
        .with_temperature(config.ocean.initial_temperature)
        .with_albedo(config.ocean.albedo)
        .with_roughness(config.ocean.roughness_momentum, config.ocean.roughness_buoyancy);

    let date = CouplerDates::new(
        CouplerDates::parse_date(&config.coupler.start_date)?,
        config.coupler.t_start,
    )?
    .date;
    if let Some(sst) = &boundaries.sst {
        ocean.update_field(FieldTag::SurfaceTemperature, &sst.evaluate(date)?)?;
    }
    if let Some(sic) = &boundaries.sea_ice_fraction {
        ice.update_field(FieldTag::AreaFraction, &sic.evaluate(date)?)?;
    }
    if let Some(co2) = &boundaries.co2 {
        atmos.update_field(FieldTag::Co2, &co2.evaluate(date)?)?;
    }

    let mut builder = CoupledSimulationBuilder::from_config(space, &config.coupler)?;
    builder
        .with_atmos(Box::new(atmos))
        .with_land(Box::new(land))
        .with_ocean(Box::new(ocean))
        .with_ice(Box::new(ice))
        .with_prescribed_boundaries(boundaries);
    builder.build()
}

/// Run a simulation to completion and check conservation
///
/// Reports are written to `conservation.output` when set. With soft-fail
/// disabled, exceeding the tolerance is an error.
pub fn run(
    cs: &mut CoupledSimulation,
    conservation: &ConservationConfig,
) -> ESMCResult<Vec<ConservationReport>> {
    solve_coupler(cs)?;
    let reports = cs.conservation_checks().check_all(
        conservation.tolerance,
        conservation.soft_fail,
        conservation.output.as_deref(),
    )?;
    for report in &reports {
        log::info!(
            "{} conservation: max relative drift {:e} over {} samples",
            report.quantity,
            report.max_relative_drift,
            report.n_samples
        );
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn missing_tables_take_defaults() {
        let config = ExperimentConfig::from_toml_str(
            r#"
[coupler]
t_end = 7200.0
dt_cpl = 3600.0

[ocean]
depth = 20.0
"#,
        )
        .unwrap();

        assert_eq!(config.grid, GridConfig::default());
        assert_eq!(config.ocean.depth, 20.0);
        assert_eq!(config.ocean.albedo, SlabOceanParameters::default().albedo);
        assert_eq!(config.atmosphere, ColumnAtmosphereParameters::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ExperimentConfig::from_toml_str(
            "[coupler]\nt_end = 1.0\ndt_cpl = 1.0\n[grid]\nn_lat = 4"
        )
        .is_err());
        assert!(ExperimentConfig::from_toml_str("[grid]\nn_bands = 4").is_err());
    }

    #[test]
    fn land_band_selects_whole_bands() {
        let grid = GridConfig {
            n_bands: 6,
            land_band: Some([-40.0, 35.0]),
            ..GridConfig::default()
        };
        // Bands are 30 degrees wide; [-60, -30] is only a third covered
        assert_eq!(grid.land_mask(), array![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(GridConfig::default().land_mask().sum(), 0.0);
    }

    #[test]
    fn invalid_grids_are_rejected() {
        let grid = GridConfig {
            land_band: Some([30.0, -30.0]),
            ..GridConfig::default()
        };
        assert!(matches!(grid.validate(), Err(ESMCError::Config(_))));
        let grid = GridConfig {
            n_bands: 0,
            ..GridConfig::default()
        };
        assert!(grid.validate().is_err());
    }

    #[test]
    fn slab_planet_surfaces_partition_the_sphere() {
        let mut config = ExperimentConfig::new(CouplerConfig::new(0.0, 3600.0, 3600.0));
        config.grid = GridConfig {
            n_bands: 4,
            land_band: Some([-45.0, 0.0]),
            ..GridConfig::default()
        };
        let cs = build_slab_planet(&config).unwrap();
        let masks = cs.masks().fresh().unwrap();
        assert_eq!(masks.fraction(esmc_core::surface::SurfaceType::Land), &array![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(masks.fraction(esmc_core::surface::SurfaceType::Ocean), &array![1.0, 0.0, 1.0, 1.0]);
        assert_eq!(cs.model_sims().ocean.name(), "ocean");
    }
}
