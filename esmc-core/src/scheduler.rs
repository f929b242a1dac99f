//! The coupling loop.
//!
//! Each coupling step advances every component from `t - dt_cpl` to `t`:
//!
//! 1. advance the calendar
//! 2. inject prescribed boundary data
//! 3. record the conservation totals of the pre-step state
//! 4. recompute the surface masks if an area fraction changed
//! 5. hand the cached coupler state to the components ([`update_model_sims`])
//! 6. step the atmosphere, exchange fluxes, step the surfaces
//! 7. re-import the combined surface state
//! 8. run the callbacks and acknowledge month boundaries
//!
//! Any component failure aborts the run.

use crate::component::ComponentModel;
use crate::errors::{ESMCError, ESMCResult};
use crate::exchange::{
    atmos_push, ice_pull, import_combined_surface_fields, land_pull, ocean_pull,
    update_model_sims,
};
use crate::field::{FieldTag, Time};
use crate::surface::{update_surface_fractions, SurfaceType};
use crate::CoupledSimulation;
use is_close::is_close;

/// Advance a component to `t`, attributing any failure to it
fn step_component(model: &mut dyn ComponentModel, t: Time, step: usize) -> ESMCResult<()> {
    let name = model.name().to_string();
    let result = model.step(t).and_then(|_| match model.current_time() {
        Some(actual) if !is_close!(actual, t) => Err(ESMCError::ClockMismatch {
            component: name.clone(),
            expected: t,
            actual,
        }),
        _ => Ok(()),
    });

    result.map_err(|source| {
        log::error!(
            "Component '{}' failed at coupling step {} (t = {} s): {}",
            name,
            step,
            t,
            source
        );
        ESMCError::ComponentFailure {
            component: name,
            step,
            time: t,
            source: Box::new(source),
        }
    })
}

/// Whether a surface model changed its own extent since the masks were computed
fn fractions_changed(cs: &CoupledSimulation) -> ESMCResult<bool> {
    let masks = match cs.masks.current() {
        Some(masks) if !cs.masks.is_stale() => masks,
        _ => return Ok(true),
    };
    for surface in [SurfaceType::Land, SurfaceType::Ice] {
        let model = cs.model_sims.surface(surface);
        let fraction = model
            .get_field(FieldTag::AreaFraction)?
            .into_field(&cs.space, FieldTag::AreaFraction)?;
        let changed = fraction
            .iter()
            .zip(masks.fraction(surface).iter())
            .any(|(new, old)| (new.clamp(0.0, 1.0) - old).abs() > cs.mask_tolerance);
        if changed {
            log::debug!("Area fraction of '{}' changed during the step", model.name());
            return Ok(true);
        }
    }
    Ok(false)
}

fn record_conservation(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    if !cs.conservation_checks.is_enabled() {
        return Ok(());
    }
    let masks = cs.masks.current().ok_or_else(|| {
        ESMCError::Error("no surface masks available for conservation checks".to_string())
    })?;
    cs.comms.barrier();
    cs.conservation_checks.record(
        cs.t,
        &cs.model_sims,
        masks,
        &cs.space,
        cs.comms.as_ref(),
        cs.dt_cpl,
    )
}

/// Run one coupling step ending at `t`
pub fn step_coupler(cs: &mut CoupledSimulation, t: Time) -> ESMCResult<()> {
    let step = cs.step_index + 1;
    log::debug!("Coupling step {} to t = {} s", step, t);

    cs.dates.advance_to(t)?;

    if !cs.prescribed.is_empty() && cs.prescribed.apply(&mut cs.model_sims, cs.dates.date)? {
        cs.masks.invalidate();
    }

    record_conservation(cs)?;

    if cs.masks.is_stale() {
        cs.comms.barrier();
        update_surface_fractions(cs)?;
    }

    update_model_sims(cs)?;

    step_component(cs.model_sims.atmos.as_mut(), t, step)?;
    atmos_push(cs)?;
    land_pull(cs)?;
    ocean_pull(cs)?;
    ice_pull(cs)?;
    step_component(cs.model_sims.land.as_mut(), t, step)?;
    step_component(cs.model_sims.ocean.as_mut(), t, step)?;
    step_component(cs.model_sims.ice.as_mut(), t, step)?;

    if fractions_changed(cs)? {
        cs.masks.invalidate();
    }
    if !cs.masks.is_stale() {
        import_combined_surface_fields(cs)?;
    }

    cs.t = t;
    cs.step_index = step;

    let new_month = cs.dates.is_new_month();
    let mut callbacks = std::mem::take(&mut cs.callbacks);
    let result = callbacks.iter_mut().try_for_each(|callback| {
        callback.observe(cs)?;
        if callback.schedule().is_due(step, new_month) {
            log::debug!("Running callback '{}' at step {}", callback.name(), step);
            callback.call(cs)?;
        }
        Ok::<(), ESMCError>(())
    });
    cs.callbacks = callbacks;
    result?;

    if new_month {
        log::info!("Entered {}", cs.dates.date.format("%Y-%m"));
        cs.dates.roll_month()?;
    }
    Ok(())
}

/// Run the coupled simulation to the end of its time span
///
/// A final conservation sample is recorded after the last step, so a run of
/// `n` steps yields `n + 1` samples per component.
pub fn solve_coupler(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    log::info!(
        "Starting coupled run from t = {} s to t = {} s ({} steps)",
        cs.tspan.0,
        cs.tspan.1,
        cs.n_steps()
    );

    while !cs.finished() {
        let t = cs.next_time();
        step_coupler(cs, t)?;
    }

    if cs.conservation_checks.is_enabled() && cs.masks.is_stale() {
        update_surface_fractions(cs)?;
    }
    record_conservation(cs)?;

    log::info!("Coupled run finished at {}", cs.dates.date);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{CallbackSchedule, CouplerCallback};
    use crate::component::{ModelKind, SurfaceStub};
    use crate::example_components::{ConstantFluxAtmosphere, StoreSurface};
    use crate::field::{BoundarySpace, FieldValue};
    use crate::CoupledSimulationBuilder;
    use approx::assert_relative_eq;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Sea ice that either fails outright or forgets to advance its clock
    #[derive(Debug, Serialize, Deserialize)]
    struct FaultyIce {
        stub: SurfaceStub,
        t: Time,
        fail: bool,
    }

    #[typetag::serde]
    impl ComponentModel for FaultyIce {
        fn name(&self) -> &str {
            self.stub.name()
        }
        fn kind(&self) -> ModelKind {
            ModelKind::SeaIce
        }
        fn space(&self) -> &BoundarySpace {
            self.stub.space()
        }
        fn current_time(&self) -> Option<Time> {
            Some(self.t)
        }
        fn get_field(&self, field: FieldTag) -> ESMCResult<FieldValue> {
            self.stub.get_field(field)
        }
        fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()> {
            self.stub.update_field(field, value)
        }
        fn step(&mut self, _t: Time) -> ESMCResult<()> {
            if self.fail {
                return Err(ESMCError::Integration {
                    component: "ice".to_string(),
                    details: "solver diverged".to_string(),
                });
            }
            Ok(())
        }
        fn reinit(&mut self) -> ESMCResult<()> {
            Ok(())
        }
    }

    #[derive(Debug)]
    struct Counter {
        schedule: CallbackSchedule,
        observed: Arc<AtomicUsize>,
        called: Arc<AtomicUsize>,
    }

    impl CouplerCallback for Counter {
        fn name(&self) -> &str {
            "counter"
        }
        fn schedule(&self) -> CallbackSchedule {
            self.schedule
        }
        fn observe(&mut self, _cs: &CoupledSimulation) -> ESMCResult<()> {
            self.observed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn call(&mut self, _cs: &CoupledSimulation) -> ESMCResult<()> {
            self.called.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn builder(space: Arc<BoundarySpace>, dt: Time, n_steps: usize) -> CoupledSimulationBuilder {
        let mut builder = CoupledSimulationBuilder::new(space.clone());
        builder
            .with_atmos(Box::new(
                ConstantFluxAtmosphere::new("atmos", space.clone(), 10.0).with_sentinel(),
            ))
            .with_land(Box::new(SurfaceStub::new("land", ModelKind::Land, space.clone())))
            .with_ocean(Box::new(StoreSurface::new(
                "ocean",
                ModelKind::Ocean,
                space.clone(),
                285.0,
            )))
            .with_ice(Box::new(SurfaceStub::new("ice", ModelKind::SeaIce, space)))
            .with_tspan(0.0, dt * n_steps as Time, dt);
        builder
    }

    fn space() -> Arc<BoundarySpace> {
        Arc::new(BoundarySpace::uniform_sphere(2, 1.0))
    }

    fn ocean_temperature(cs: &CoupledSimulation) -> FloatValue {
        cs.model_sims()
            .ocean
            .get_field(FieldTag::SurfaceTemperature)
            .unwrap()
            .as_field()
            .unwrap()[0]
    }

    use crate::field::FloatValue;

    #[test]
    fn surfaces_see_fluxes_from_the_same_step() {
        let mut cs = builder(space(), 1.0, 3).build().unwrap();
        solve_coupler(&mut cs).unwrap();

        // The sentinel radiative flux equals the atmosphere's step count. Had
        // the surfaces received the previous step's fluxes they would have seen
        // 0, 1, 2 instead of 1, 2, 3.
        assert_relative_eq!(ocean_temperature(&cs), 285.0 + 30.0 - 6.0, max_relative = 1e-12);
        assert_eq!(cs.step_index(), 3);
        assert_eq!(cs.current_time(), 3.0);
        assert!(cs.finished());
    }

    #[test]
    fn combined_state_follows_the_surfaces() {
        let mut cs = builder(space(), 1.0, 2).build().unwrap();
        solve_coupler(&mut cs).unwrap();
        let t_sfc = cs.fields().get(FieldTag::SurfaceTemperature).unwrap();
        assert_relative_eq!(t_sfc[0], ocean_temperature(&cs), max_relative = 1e-12);
    }

    #[test]
    fn energy_is_conserved_between_atmosphere_and_ocean() {
        let mut builder = builder(space(), 3600.0, 4);
        builder.with_atmos(Box::new(
            ConstantFluxAtmosphere::new("atmos", space(), 10.0).with_energy(1e6),
        ));
        builder.with_conservation(true, false);
        let mut cs = builder.build().unwrap();
        solve_coupler(&mut cs).unwrap();

        let checker = cs.conservation_checks().iter().next().unwrap();
        assert_eq!(checker.len(), 5);
        let atmos = checker.component_series("atmos").unwrap();
        let ocean = checker.component_series("ocean").unwrap();
        assert_relative_eq!(
            atmos[0] - atmos[4],
            ocean[4] - ocean[0],
            max_relative = 1e-12
        );
        assert!(checker.relative_drift(4).unwrap().abs() < 1e-12);
    }

    #[test]
    fn component_failure_aborts_the_run() {
        let space = space();
        let mut builder = builder(space.clone(), 3600.0, 2);
        builder.with_ice(Box::new(FaultyIce {
            stub: SurfaceStub::new("ice", ModelKind::SeaIce, space),
            t: 0.0,
            fail: true,
        }));
        let mut cs = builder.build().unwrap();

        match solve_coupler(&mut cs) {
            Err(ESMCError::ComponentFailure {
                component,
                step,
                time,
                source,
            }) => {
                assert_eq!(component, "ice");
                assert_eq!(step, 1);
                assert_eq!(time, 3600.0);
                assert!(matches!(*source, ESMCError::Integration { .. }));
            }
            other => panic!("Expected a component failure, got {:?}", other),
        }
        // The failed step is not committed
        assert_eq!(cs.step_index(), 0);
    }

    #[test]
    fn clocks_must_reach_the_target_time() {
        let space = space();
        let mut builder = builder(space.clone(), 3600.0, 2);
        builder.with_ice(Box::new(FaultyIce {
            stub: SurfaceStub::new("ice", ModelKind::SeaIce, space),
            t: 0.0,
            fail: false,
        }));
        let mut cs = builder.build().unwrap();

        match step_coupler(&mut cs, 3600.0) {
            Err(ESMCError::ComponentFailure { source, .. }) => assert!(matches!(
                *source,
                ESMCError::ClockMismatch { expected, actual, .. } if expected == 3600.0 && actual == 0.0
            )),
            other => panic!("Expected a clock mismatch, got {:?}", other),
        }
    }

    #[test]
    fn callbacks_follow_their_schedule() {
        let observed = Arc::new(AtomicUsize::new(0));
        let called = Arc::new(AtomicUsize::new(0));
        let mut builder = builder(space(), 3600.0, 4);
        builder.with_callback(Box::new(Counter {
            schedule: CallbackSchedule::EveryNSteps(2),
            observed: observed.clone(),
            called: called.clone(),
        }));
        let mut cs = builder.build().unwrap();
        solve_coupler(&mut cs).unwrap();

        assert_eq!(observed.load(Ordering::SeqCst), 4);
        assert_eq!(called.load(Ordering::SeqCst), 2);
        assert_eq!(cs.callbacks().len(), 1);
    }

    #[test]
    fn monthly_callbacks_fire_once_per_month() {
        let called = Arc::new(AtomicUsize::new(0));
        let mut builder = builder(space(), 86400.0, 3);
        builder
            .with_start_date("2000-01-30")
            .with_callback(Box::new(Counter {
                schedule: CallbackSchedule::Monthly,
                observed: Arc::new(AtomicUsize::new(0)),
                called: called.clone(),
            }));
        let mut cs = builder.build().unwrap();
        solve_coupler(&mut cs).unwrap();

        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert_eq!(
            cs.dates().next_month,
            CouplerDates::parse_date("2000-03-01").unwrap()
        );
    }

    use crate::calendar::CouplerDates;
}
