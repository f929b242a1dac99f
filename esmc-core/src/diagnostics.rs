//! Time-mean diagnostics of the coupler fields.
//!
//! A [`DiagnosticsCallback`] accumulates the selected coupler fields after
//! every coupling step. When its schedule is due it emits one
//! [`DiagnosticRecord`] per field holding the mean over the steps observed
//! since the previous output, then starts a new averaging window.

use crate::callbacks::{CallbackSchedule, CouplerCallback};
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{FieldBuffer, FieldTag, FloatValue, Time};
use crate::CoupledSimulation;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Time-mean of one coupler field over an output window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Date at the end of the window
    pub date: NaiveDateTime,
    pub time: Time,
    pub field: FieldTag,
    pub unit: String,
    /// Area-weighted global mean of `mean`
    pub global_mean: FloatValue,
    pub mean: FieldBuffer,
    /// Number of coupling steps in the window
    pub n_samples: usize,
}

/// Shared handle to the records emitted by a [`DiagnosticsCallback`]
pub type DiagnosticSink = Arc<Mutex<Vec<DiagnosticRecord>>>;

#[derive(Debug)]
pub struct DiagnosticsCallback {
    fields: Vec<FieldTag>,
    schedule: CallbackSchedule,
    output_dir: Option<PathBuf>,
    sums: BTreeMap<FieldTag, FieldBuffer>,
    n_samples: usize,
    sink: DiagnosticSink,
}

impl DiagnosticsCallback {
    pub fn new(fields: Vec<FieldTag>, schedule: CallbackSchedule) -> Self {
        Self {
            fields,
            schedule,
            output_dir: None,
            sums: BTreeMap::new(),
            n_samples: 0,
            sink: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Also write each batch of records to a JSON file in `dir`
    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    /// A handle that stays valid after the callback is moved into a simulation
    pub fn sink(&self) -> DiagnosticSink {
        self.sink.clone()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        match self.sink.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn write_json(&self, dir: &Path, step: usize, records: &[DiagnosticRecord]) -> ESMCResult<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("diagnostics_step{:08}.json", step));
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.flush()?;
        log::debug!("Wrote diagnostics to {}", path.display());
        Ok(())
    }
}

impl CouplerCallback for DiagnosticsCallback {
    fn name(&self) -> &str {
        "diagnostics"
    }

    fn schedule(&self) -> CallbackSchedule {
        self.schedule
    }

    fn observe(&mut self, cs: &CoupledSimulation) -> ESMCResult<()> {
        for tag in &self.fields {
            let values = cs.fields().get(*tag)?;
            match self.sums.get_mut(tag) {
                Some(sum) => *sum += values,
                None => {
                    self.sums.insert(*tag, values.clone());
                }
            }
        }
        self.n_samples += 1;
        Ok(())
    }

    fn call(&mut self, cs: &CoupledSimulation) -> ESMCResult<()> {
        if self.n_samples == 0 {
            return Ok(());
        }
        let n = self.n_samples as FloatValue;
        let records = self
            .fields
            .iter()
            .filter_map(|tag| self.sums.get(tag).map(|sum| (*tag, sum / n)))
            .map(|(field, mean)| DiagnosticRecord {
                date: cs.dates().date,
                time: cs.current_time(),
                field,
                unit: field.unit().to_string(),
                global_mean: cs.space().global_mean(&mean),
                mean,
                n_samples: self.n_samples,
            })
            .collect::<Vec<_>>();

        for record in &records {
            log::info!(
                "{}: mean {} = {:.6} {}",
                record.date,
                record.field,
                record.global_mean,
                record.unit
            );
        }

        if let Some(dir) = &self.output_dir {
            if cs.comms().is_root() {
                self.write_json(dir, cs.step_index(), &records)?;
            }
        }

        self.sink
            .lock()
            .map_err(|_| ESMCError::Error("diagnostics sink is poisoned".to_string()))?
            .extend(records);
        self.sums.clear();
        self.n_samples = 0;
        Ok(())
    }
}
