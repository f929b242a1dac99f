//! Checkpointing of the coupled state.
//!
//! A checkpoint holds the coupler's interface fields, its calendar and the
//! full prognostic state of every component model. Component models are
//! serialised as trait objects so a checkpoint can be read back without
//! knowing the concrete model types up front.
//!
//! Restoring continues the physical state. The internal state of each
//! component's integrator is rebuilt by
//! [`ComponentModel::reinit`](crate::component::ComponentModel::reinit), so a
//! restarted run is not guaranteed to be bit-for-bit identical.

use crate::calendar::CouplerDates;
use crate::component::ModelSims;
use crate::conservation::ConservationChecks;
use crate::errors::{ESMCError, ESMCResult};
use crate::exchange::{combine_surface_fields, EXCHANGED_FIELDS};
use crate::field::Time;
use crate::registry::FieldRegistry;
use crate::surface::surface_fractions;
use crate::CoupledSimulation;
use is_close::is_close;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct CheckpointRef<'a> {
    time: Time,
    step: usize,
    dates: &'a CouplerDates,
    fields: &'a FieldRegistry,
    model_sims: &'a ModelSims,
}

/// The coupled state at a single point in time
#[derive(Debug, Deserialize)]
pub struct Checkpoint {
    /// Absolute simulation time of the checkpoint
    /// unit: s
    pub time: Time,
    /// Number of coupling steps completed when the checkpoint was written
    pub step: usize,
    pub dates: CouplerDates,
    pub fields: FieldRegistry,
    pub model_sims: ModelSims,
}

/// File name used for a checkpoint written at time `t`
pub fn checkpoint_file_name(t: Time) -> String {
    format!("checkpoint_t{:012}.json", t.round() as i64)
}

/// Write the current state of `cs` into `dir`
///
/// Only the root rank writes. Returns the path of the checkpoint file.
pub fn write_checkpoint<P: AsRef<Path>>(cs: &CoupledSimulation, dir: P) -> ESMCResult<PathBuf> {
    let path = dir.as_ref().join(checkpoint_file_name(cs.t));

    if cs.comms.is_root() {
        std::fs::create_dir_all(dir.as_ref())?;
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);

        let checkpoint = CheckpointRef {
            time: cs.t,
            step: cs.step_index,
            dates: &cs.dates,
            fields: &cs.fields,
            model_sims: &cs.model_sims,
        };
        serde_json::to_writer(&mut writer, &checkpoint)?;
        writer.flush()?;
        log::debug!("Checkpoint at t = {} s written to {}", cs.t, path.display());
    }
    cs.comms.barrier();
    Ok(path)
}

pub fn read_checkpoint<P: AsRef<Path>>(path: P) -> ESMCResult<Checkpoint> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let checkpoint: Checkpoint = serde_json::from_reader(reader)?;
    checkpoint.model_sims.validate()?;
    Ok(checkpoint)
}

impl CoupledSimulation {
    /// Replace the coupled state with a checkpoint
    ///
    /// The checkpoint must be defined over the same boundary space and sit on
    /// the run's coupling grid: its time must be the time reached after its
    /// step count, and every component clock must agree with it. Every
    /// component is reinitialised from its restored state and the surface
    /// masks are recomputed. Conservation series restart from the restored
    /// state.
    ///
    /// On error the simulation is left unchanged.
    pub fn restore(&mut self, checkpoint: Checkpoint) -> ESMCResult<()> {
        self.check_checkpoint(&checkpoint)?;

        let Checkpoint {
            time,
            step,
            dates,
            mut fields,
            mut model_sims,
        } = checkpoint;

        for model in model_sims.iter_mut() {
            model.reinit()?;
        }
        let masks = surface_fractions(&mut model_sims, &self.space, self.mask_tolerance)?;
        combine_surface_fields(&mut fields, &model_sims, &self.space, &masks)?;

        self.conservation_checks = ConservationChecks::new(
            &model_sims,
            self.conservation_checks.energy.is_some(),
            self.conservation_checks.water.is_some(),
        );
        self.fields = fields;
        self.dates = dates;
        self.model_sims = model_sims;
        self.t = time;
        self.step_index = step;
        self.partitioned_fluxes = None;
        self.masks.store(masks);

        log::info!(
            "Restored coupled state at t = {} s ({})",
            self.t,
            self.dates.date
        );
        Ok(())
    }

    fn check_checkpoint(&self, checkpoint: &Checkpoint) -> ESMCResult<()> {
        if checkpoint.fields.space() != self.space.as_ref() {
            return Err(ESMCError::SpaceMismatch {
                model: "checkpoint".to_string(),
            });
        }
        checkpoint.fields.validate()?;
        checkpoint.fields.require(&EXCHANGED_FIELDS)?;
        if let Some(model) = checkpoint
            .model_sims
            .iter()
            .find(|m| m.space() != self.space.as_ref())
        {
            return Err(ESMCError::SpaceMismatch {
                model: model.name().to_string(),
            });
        }

        let (t_start, t_end) = self.tspan;
        if !checkpoint.time.is_finite() || checkpoint.time < t_start || checkpoint.time > t_end {
            return Err(ESMCError::InvalidData(format!(
                "checkpoint at t = {} s is outside the run [{}, {}]",
                checkpoint.time, t_start, t_end
            )));
        }
        if checkpoint.step > self.n_steps()
            || !is_close!(checkpoint.time, self.time_of_step(checkpoint.step))
        {
            return Err(ESMCError::InvalidData(format!(
                "checkpoint at t = {} s after {} steps is not on the coupling grid \
                 (t_start = {} s, dt_cpl = {} s)",
                checkpoint.time, checkpoint.step, t_start, self.dt_cpl
            )));
        }

        for model in checkpoint.model_sims.iter() {
            if let Some(actual) = model.current_time() {
                if !is_close!(actual, checkpoint.time) {
                    return Err(ESMCError::ClockMismatch {
                        component: model.name().to_string(),
                        expected: checkpoint.time,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }
}
