//! The coupled simulation: shared coupler state plus the component models.

use crate::boundary_data::PrescribedBoundaries;
use crate::calendar::CouplerDates;
use crate::callbacks::{CheckpointCallback, CouplerCallback};
use crate::comms::{CommsContext, SingletonComms};
use crate::component::{ComponentModel, ModelSims};
use crate::config::{validate_tspan, CouplerConfig};
use crate::conservation::ConservationChecks;
use crate::diagnostics::DiagnosticsCallback;
use crate::errors::{ESMCError, ESMCResult};
use crate::exchange::{import_combined_surface_fields, EXCHANGED_FIELDS};
use crate::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use crate::registry::{FieldRegistry, FieldSchema};
use crate::surface::{
    update_surface_fractions, MaskCache, SurfaceType, DEFAULT_MASK_TOLERANCE,
};
use crate::surface_fluxes::{
    BulkAerodynamic, FluxStrategy, PartitionedFluxes, TurbulentFluxScheme,
};
use is_close::is_close;
use std::sync::Arc;

/// All state owned by a coupled run
///
/// The coupler's interface fields are exclusively owned by this container.
/// Each phase of a coupling step writes a given field from exactly one place,
/// so no locking is involved.
#[derive(Debug)]
pub struct CoupledSimulation {
    pub(crate) space: Arc<BoundarySpace>,
    pub(crate) fields: FieldRegistry,
    pub(crate) model_sims: ModelSims,
    pub(crate) dates: CouplerDates,
    pub(crate) tspan: (Time, Time),
    pub(crate) dt_cpl: Time,
    pub(crate) t: Time,
    /// Number of completed coupling steps
    pub(crate) step_index: usize,
    pub(crate) conservation_checks: ConservationChecks,
    pub(crate) masks: MaskCache,
    pub(crate) mask_tolerance: FloatValue,
    pub(crate) flux_strategy: FluxStrategy,
    pub(crate) flux_scheme: Box<dyn TurbulentFluxScheme>,
    pub(crate) partitioned_fluxes: Option<PartitionedFluxes>,
    pub(crate) prescribed: PrescribedBoundaries,
    pub(crate) callbacks: Vec<Box<dyn CouplerCallback>>,
    pub(crate) comms: Arc<dyn CommsContext>,
}

impl CoupledSimulation {
    pub fn space(&self) -> &BoundarySpace {
        &self.space
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    pub fn model_sims(&self) -> &ModelSims {
        &self.model_sims
    }

    /// Mutable access to the component models
    ///
    /// Changing an area fraction through this handle requires a call to
    /// [`invalidate_masks`](Self::invalidate_masks).
    pub fn model_sims_mut(&mut self) -> &mut ModelSims {
        &mut self.model_sims
    }

    pub fn dates(&self) -> &CouplerDates {
        &self.dates
    }

    /// Time of the last completed coupling step
    pub fn current_time(&self) -> Time {
        self.t
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn dt_cpl(&self) -> Time {
        self.dt_cpl
    }

    pub fn tspan(&self) -> (Time, Time) {
        self.tspan
    }

    /// Total number of coupling steps in the run
    pub fn n_steps(&self) -> usize {
        ((self.tspan.1 - self.tspan.0) / self.dt_cpl).round() as usize
    }

    /// Target time of the next coupling step
    ///
    /// Computed from the step count rather than by accumulation so that the
    /// final step lands exactly on the end of the run.
    pub fn next_time(&self) -> Time {
        self.time_of_step(self.step_index + 1)
    }

    /// Time reached after `step` coupling steps
    pub(crate) fn time_of_step(&self, step: usize) -> Time {
        if step >= self.n_steps() {
            self.tspan.1
        } else {
            self.tspan.0 + step as Time * self.dt_cpl
        }
    }

    pub fn finished(&self) -> bool {
        self.step_index >= self.n_steps()
    }

    pub fn conservation_checks(&self) -> &ConservationChecks {
        &self.conservation_checks
    }

    pub fn masks(&self) -> &MaskCache {
        &self.masks
    }

    pub fn invalidate_masks(&mut self) {
        self.masks.invalidate();
    }

    pub fn flux_strategy(&self) -> FluxStrategy {
        self.flux_strategy
    }

    pub fn flux_scheme(&self) -> &dyn TurbulentFluxScheme {
        self.flux_scheme.as_ref()
    }

    /// Per-surface fluxes of the last exchange when running with
    /// [`FluxStrategy::PartitionedState`]
    pub fn partitioned_fluxes(&self) -> Option<&PartitionedFluxes> {
        self.partitioned_fluxes.as_ref()
    }

    pub fn comms(&self) -> &dyn CommsContext {
        self.comms.as_ref()
    }

    pub fn add_callback(&mut self, callback: Box<dyn CouplerCallback>) {
        self.callbacks.push(callback);
    }

    pub fn callbacks(&self) -> &[Box<dyn CouplerCallback>] {
        &self.callbacks
    }

    /// Overwrite the area fraction of a surface model and mark the masks stale
    pub fn set_area_fraction(&mut self, surface: SurfaceType, fraction: FieldBuffer) -> ESMCResult<()> {
        self.model_sims
            .surface_mut(surface)
            .update_field(FieldTag::AreaFraction, &FieldValue::Field(fraction))?;
        self.masks.invalidate();
        Ok(())
    }
}

/// Assembles a [`CoupledSimulation`] from independently initialised components
///
/// ```ignore
/// let mut builder = CoupledSimulationBuilder::new(space);
/// builder
///     .with_atmos(Box::new(atmos))
///     .with_land(Box::new(land))
///     .with_ocean(Box::new(ocean))
///     .with_ice(Box::new(ice))
///     .with_tspan(0.0, 86400.0, 3600.0);
/// let cs = builder.build()?;
/// ```
pub struct CoupledSimulationBuilder {
    space: Arc<BoundarySpace>,
    atmos: Option<Box<dyn ComponentModel>>,
    land: Option<Box<dyn ComponentModel>>,
    ocean: Option<Box<dyn ComponentModel>>,
    ice: Option<Box<dyn ComponentModel>>,
    schema: FieldSchema,
    start_date: String,
    tspan: Option<(Time, Time, Time)>,
    flux_strategy: FluxStrategy,
    flux_scheme: Box<dyn TurbulentFluxScheme>,
    mask_tolerance: FloatValue,
    energy_check: bool,
    water_check: bool,
    prescribed: PrescribedBoundaries,
    callbacks: Vec<Box<dyn CouplerCallback>>,
    comms: Arc<dyn CommsContext>,
}

impl CoupledSimulationBuilder {
    pub fn new(space: Arc<BoundarySpace>) -> Self {
        Self {
            space,
            atmos: None,
            land: None,
            ocean: None,
            ice: None,
            schema: FieldSchema::coupler_default(),
            start_date: "1979-01-01".to_string(),
            tspan: None,
            flux_strategy: FluxStrategy::default(),
            flux_scheme: Box::new(BulkAerodynamic::default()),
            mask_tolerance: DEFAULT_MASK_TOLERANCE,
            energy_check: false,
            water_check: false,
            prescribed: PrescribedBoundaries::default(),
            callbacks: Vec::new(),
            comms: Arc::new(SingletonComms),
        }
    }

    /// Apply run settings from a configuration file
    ///
    /// Checkpoint and diagnostics sections register the corresponding callbacks.
    pub fn from_config(space: Arc<BoundarySpace>, config: &CouplerConfig) -> ESMCResult<Self> {
        config.validate()?;
        let mut builder = Self::new(space);
        builder
            .with_start_date(&config.start_date)
            .with_tspan(config.t_start, config.t_end, config.dt_cpl)
            .with_flux_strategy(config.flux_strategy)
            .with_mask_tolerance(config.mask_tolerance)
            .with_conservation(config.conservation.energy, config.conservation.water);

        if let Some(checkpoint) = &config.checkpoint {
            builder.with_callback(Box::new(CheckpointCallback::new(
                checkpoint.dir.clone(),
                checkpoint.schedule,
            )));
        }
        if let Some(diagnostics) = &config.diagnostics {
            let mut callback = DiagnosticsCallback::new(diagnostics.tags()?, diagnostics.schedule);
            if let Some(dir) = &diagnostics.dir {
                callback = callback.with_output_dir(dir.clone());
            }
            builder.with_callback(Box::new(callback));
        }
        Ok(builder)
    }

    pub fn with_atmos(&mut self, model: Box<dyn ComponentModel>) -> &mut Self {
        self.atmos = Some(model);
        self
    }

    pub fn with_land(&mut self, model: Box<dyn ComponentModel>) -> &mut Self {
        self.land = Some(model);
        self
    }

    pub fn with_ocean(&mut self, model: Box<dyn ComponentModel>) -> &mut Self {
        self.ocean = Some(model);
        self
    }

    pub fn with_ice(&mut self, model: Box<dyn ComponentModel>) -> &mut Self {
        self.ice = Some(model);
        self
    }

    /// Register additional coupler fields on top of the exchanged ones
    pub fn with_schema(&mut self, schema: FieldSchema) -> &mut Self {
        self.schema = schema;
        self
    }

    pub fn with_start_date(&mut self, date: &str) -> &mut Self {
        self.start_date = date.to_string();
        self
    }

    pub fn with_tspan(&mut self, t_start: Time, t_end: Time, dt_cpl: Time) -> &mut Self {
        self.tspan = Some((t_start, t_end, dt_cpl));
        self
    }

    pub fn with_flux_strategy(&mut self, strategy: FluxStrategy) -> &mut Self {
        self.flux_strategy = strategy;
        self
    }

    pub fn with_flux_scheme(&mut self, scheme: Box<dyn TurbulentFluxScheme>) -> &mut Self {
        self.flux_scheme = scheme;
        self
    }

    pub fn with_mask_tolerance(&mut self, tolerance: FloatValue) -> &mut Self {
        self.mask_tolerance = tolerance;
        self
    }

    pub fn with_conservation(&mut self, energy: bool, water: bool) -> &mut Self {
        self.energy_check = energy;
        self.water_check = water;
        self
    }

    pub fn with_prescribed_boundaries(&mut self, boundaries: PrescribedBoundaries) -> &mut Self {
        self.prescribed = boundaries;
        self
    }

    pub fn with_callback(&mut self, callback: Box<dyn CouplerCallback>) -> &mut Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_comms(&mut self, comms: Arc<dyn CommsContext>) -> &mut Self {
        self.comms = comms;
        self
    }

    /// Validate the components and settings and assemble the simulation
    ///
    /// Checks that all four components are present, of the right kind, uniquely
    /// named, defined on the coupler's boundary space and that their clocks sit
    /// at the start of the run. The initial surface fractions and combined
    /// surface state are computed before returning.
    pub fn build(self) -> ESMCResult<CoupledSimulation> {
        let missing = |slot: &str| ESMCError::Config(format!("no {} model was supplied", slot));
        let model_sims = ModelSims::new(
            self.atmos.ok_or_else(|| missing("atmosphere"))?,
            self.land.ok_or_else(|| missing("land"))?,
            self.ocean.ok_or_else(|| missing("ocean"))?,
            self.ice.ok_or_else(|| missing("sea-ice"))?,
        )?;

        let (t_start, t_end, dt_cpl) = self
            .tspan
            .ok_or_else(|| ESMCError::Config("no time span was supplied".to_string()))?;
        validate_tspan(t_start, t_end, dt_cpl)?;
        if !(self.mask_tolerance >= 0.0) {
            return Err(ESMCError::Config(format!(
                "mask tolerance must be non-negative, got {}",
                self.mask_tolerance
            )));
        }

        for model in model_sims.iter() {
            if model.space() != self.space.as_ref() {
                return Err(ESMCError::SpaceMismatch {
                    model: model.name().to_string(),
                });
            }
            if let Some(t) = model.current_time() {
                if !is_close!(t, t_start) {
                    return Err(ESMCError::ClockMismatch {
                        component: model.name().to_string(),
                        expected: t_start,
                        actual: t,
                    });
                }
            }
        }

        let fields = FieldRegistry::new(self.space.clone(), &self.schema);
        fields.require(&EXCHANGED_FIELDS)?;

        let date0 = CouplerDates::parse_date(&self.start_date)?;
        let dates = CouplerDates::new(date0, t_start)?;
        let conservation_checks =
            ConservationChecks::new(&model_sims, self.energy_check, self.water_check);

        let mut cs = CoupledSimulation {
            space: self.space,
            fields,
            model_sims,
            dates,
            tspan: (t_start, t_end),
            dt_cpl,
            t: t_start,
            step_index: 0,
            conservation_checks,
            masks: MaskCache::new(),
            mask_tolerance: self.mask_tolerance,
            flux_strategy: self.flux_strategy,
            flux_scheme: self.flux_scheme,
            partitioned_fluxes: None,
            prescribed: self.prescribed,
            callbacks: self.callbacks,
            comms: self.comms,
        };

        if !cs.prescribed.is_empty() {
            cs.prescribed.apply(&mut cs.model_sims, cs.dates.date)?;
        }
        update_surface_fractions(&mut cs)?;
        import_combined_surface_fields(&mut cs)?;

        log::info!(
            "Built coupled simulation over {} columns: atmos '{}', land '{}', ocean '{}', ice '{}'; {} steps of {} s",
            cs.space.size(),
            cs.model_sims.atmos.name(),
            cs.model_sims.land.name(),
            cs.model_sims.ocean.name(),
            cs.model_sims.ice.name(),
            cs.n_steps(),
            cs.dt_cpl
        );
        Ok(cs)
    }
}
