//! Periodic actions triggered by the coupling loop.
//!
//! Callbacks run at the end of a coupling step, after every component has
//! been advanced. Each callback is observed on every step and fires when its
//! [`CallbackSchedule`] is due.

use crate::checkpoint::write_checkpoint;
use crate::errors::ESMCResult;
use crate::CoupledSimulation;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::PathBuf;

/// When a callback fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackSchedule {
    /// After every `n` completed coupling steps
    EveryNSteps(usize),
    /// On the first coupling step of each new month
    Monthly,
    Never,
}

impl CallbackSchedule {
    /// `step` is the number of completed coupling steps
    pub fn is_due(&self, step: usize, new_month: bool) -> bool {
        match self {
            CallbackSchedule::EveryNSteps(n) => *n > 0 && step % n == 0,
            CallbackSchedule::Monthly => new_month,
            CallbackSchedule::Never => false,
        }
    }
}

pub trait CouplerCallback: Debug + Send {
    fn name(&self) -> &str;

    fn schedule(&self) -> CallbackSchedule;

    /// Called at the end of every coupling step
    fn observe(&mut self, _cs: &CoupledSimulation) -> ESMCResult<()> {
        Ok(())
    }

    /// Called when the schedule is due
    fn call(&mut self, cs: &CoupledSimulation) -> ESMCResult<()>;
}

/// Writes a checkpoint of the full coupled state
#[derive(Debug, Clone)]
pub struct CheckpointCallback {
    dir: PathBuf,
    schedule: CallbackSchedule,
    written: Vec<PathBuf>,
}

impl CheckpointCallback {
    pub fn new<P: Into<PathBuf>>(dir: P, schedule: CallbackSchedule) -> Self {
        Self {
            dir: dir.into(),
            schedule,
            written: Vec::new(),
        }
    }

    /// Paths of the checkpoints written so far
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl CouplerCallback for CheckpointCallback {
    fn name(&self) -> &str {
        "checkpoint"
    }

    fn schedule(&self) -> CallbackSchedule {
        self.schedule
    }

    fn call(&mut self, cs: &CoupledSimulation) -> ESMCResult<()> {
        let path = write_checkpoint(cs, &self.dir)?;
        log::info!("Wrote checkpoint {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedules() {
        let every = CallbackSchedule::EveryNSteps(3);
        assert!(!every.is_due(1, true));
        assert!(every.is_due(3, false));
        assert!(every.is_due(6, false));

        assert!(CallbackSchedule::Monthly.is_due(5, true));
        assert!(!CallbackSchedule::Monthly.is_due(5, false));
        assert!(!CallbackSchedule::Never.is_due(0, true));
        assert!(!CallbackSchedule::EveryNSteps(0).is_due(0, false));
    }

    #[test]
    fn schedule_serialisation() {
        let schedule: CallbackSchedule = serde_json::from_str(r#"{"every_n_steps": 4}"#).unwrap();
        assert_eq!(schedule, CallbackSchedule::EveryNSteps(4));
        let schedule: CallbackSchedule = serde_json::from_str(r#""monthly""#).unwrap();
        assert_eq!(schedule, CallbackSchedule::Monthly);
    }
}
