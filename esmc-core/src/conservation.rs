//! Global energy and water bookkeeping.
//!
//! A [`ConservationChecker`] observes the coupled system once per coupling
//! step. For every component it integrates the column density of the checked
//! quantity over the sphere, weighting surface models by their area fraction,
//! and appends the result to a series keyed by component name. Energy leaving
//! through the top of the atmosphere is accumulated separately and added to
//! the atmosphere's total.
//!
//! The checker only measures. Whether a drift is acceptable is decided by
//! the caller through [`ConservationChecker::check`].

use crate::comms::CommsContext;
use crate::component::{ComponentModel, ModelSims};
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{BoundarySpace, FieldTag, FloatValue, Time};
use crate::surface::{SurfaceMasks, SurfaceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConservedQuantity {
    /// unit: J
    Energy,
    /// unit: kg
    Water,
}

impl fmt::Display for ConservedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConservedQuantity::Energy => f.write_str("energy"),
            ConservedQuantity::Water => f.write_str("water"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConservationChecker {
    quantity: ConservedQuantity,
    /// Component names in recording order
    components: Vec<String>,
    series: BTreeMap<String, Vec<FloatValue>>,
    /// Cumulative energy lost through the top of the atmosphere at each sample
    toa_net_source: Vec<FloatValue>,
    times: Vec<Time>,
}

impl ConservationChecker {
    pub fn new(quantity: ConservedQuantity, sims: &ModelSims) -> Self {
        let components: Vec<String> = sims.iter().map(|m| m.name().to_string()).collect();
        let series = components
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        Self {
            quantity,
            components,
            series,
            toa_net_source: Vec::new(),
            times: Vec::new(),
        }
    }

    pub fn quantity(&self) -> ConservedQuantity {
        self.quantity
    }

    /// Number of samples recorded so far
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[Time] {
        &self.times
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Record one sample of every component's global total
    ///
    /// `dt_cpl` is the length of the interval since the previous sample. The
    /// atmosphere's mean top-of-atmosphere flux over that interval is
    /// accumulated into the TOA source before the atmosphere total is stored.
    pub fn record(
        &mut self,
        t: Time,
        sims: &ModelSims,
        masks: &SurfaceMasks,
        space: &BoundarySpace,
        comms: &dyn CommsContext,
        dt_cpl: Time,
    ) -> ESMCResult<()> {
        let mut totals = Vec::with_capacity(self.components.len());

        let toa = self.accumulate_toa(sims.atmos.as_ref(), space, comms, dt_cpl)?;
        let atmos_total = match sims.atmos.conserved_total(self.quantity) {
            Some(density) => {
                self.check_density(sims.atmos.name(), space, density.len())?;
                comms.global_sum(space.integrate(&density))
            }
            None => 0.0,
        };
        totals.push(atmos_total + toa);

        for (model, surface) in [
            (sims.land.as_ref(), SurfaceType::Land),
            (sims.ocean.as_ref(), SurfaceType::Ocean),
            (sims.ice.as_ref(), SurfaceType::Ice),
        ] {
            let total = match model.conserved_total(self.quantity) {
                Some(density) => {
                    self.check_density(model.name(), space, density.len())?;
                    let weighted = density * masks.fraction(surface);
                    comms.global_sum(space.integrate(&weighted))
                }
                None => 0.0,
            };
            totals.push(total);
        }

        for (name, total) in self.components.iter().zip(totals) {
            if let Some(series) = self.series.get_mut(name) {
                series.push(total);
            }
        }
        self.toa_net_source.push(toa);
        self.times.push(t);
        Ok(())
    }

    fn check_density(&self, model: &str, space: &BoundarySpace, len: usize) -> ESMCResult<()> {
        if len != space.size() {
            return Err(ESMCError::InvalidData(format!(
                "{} density of '{}' has {} columns, expected {}",
                self.quantity,
                model,
                len,
                space.size()
            )));
        }
        Ok(())
    }

    fn accumulate_toa(
        &self,
        atmos: &dyn ComponentModel,
        space: &BoundarySpace,
        comms: &dyn CommsContext,
        dt_cpl: Time,
    ) -> ESMCResult<FloatValue> {
        let previous = self.toa_net_source.last().copied().unwrap_or(0.0);
        if self.quantity != ConservedQuantity::Energy || self.is_empty() {
            return Ok(previous);
        }
        let flux = match atmos.get_field(FieldTag::TopOfAtmosphereFlux) {
            Ok(value) => value.into_field(space, FieldTag::TopOfAtmosphereFlux)?,
            Err(ESMCError::UnsupportedField { .. }) => return Ok(previous),
            Err(e) => return Err(e),
        };
        Ok(previous + comms.global_sum(space.integrate(&flux)) * dt_cpl)
    }

    /// Sum over all components at sample `k`
    pub fn total(&self, k: usize) -> Option<FloatValue> {
        self.components
            .iter()
            .map(|name| self.series.get(name).and_then(|series| series.get(k).copied()))
            .sum()
    }

    pub fn totals(&self) -> Vec<FloatValue> {
        (0..self.len()).filter_map(|k| self.total(k)).collect()
    }

    pub fn component_series(&self, name: &str) -> Option<&[FloatValue]> {
        self.series.get(name).map(|s| s.as_slice())
    }

    pub fn toa_net_source(&self) -> &[FloatValue] {
        &self.toa_net_source
    }

    /// `|total[k] - total[0]| / |total[0]|`
    ///
    /// Falls back to the absolute drift if the initial total is zero.
    pub fn relative_drift(&self, k: usize) -> Option<FloatValue> {
        let initial = self.total(0)?;
        let current = self.total(k)?;
        let drift = (current - initial).abs();
        if initial == 0.0 {
            Some(drift)
        } else {
            Some(drift / initial.abs())
        }
    }

    /// Summarise the recorded series against a drift tolerance
    pub fn report(&self, tolerance: FloatValue) -> ConservationReport {
        let max_relative_drift = (0..self.len())
            .filter_map(|k| self.relative_drift(k))
            .fold(0.0, FloatValue::max);
        let final_relative_drift = self
            .len()
            .checked_sub(1)
            .and_then(|k| self.relative_drift(k))
            .unwrap_or(0.0);

        ConservationReport {
            quantity: self.quantity,
            tolerance,
            n_samples: self.len(),
            final_relative_drift,
            max_relative_drift,
            passed: max_relative_drift <= tolerance,
            times: self.times.clone(),
            totals: self.totals(),
            components: self.series.clone(),
            toa_net_source: self.toa_net_source.clone(),
        }
    }

    /// Compare the drift with `tolerance`
    ///
    /// With `soft_fail` an exceedance is logged and the report returned,
    /// otherwise it is an [`ESMCError::ConservationViolation`].
    pub fn check(&self, tolerance: FloatValue, soft_fail: bool) -> ESMCResult<ConservationReport> {
        let report = self.report(tolerance);
        if report.passed {
            log::info!(
                "{} conserved to {:e} over {} samples",
                self.quantity,
                report.max_relative_drift,
                report.n_samples
            );
            return Ok(report);
        }
        if soft_fail {
            log::warn!(
                "{} drift {:e} exceeds tolerance {:e}",
                self.quantity,
                report.max_relative_drift,
                tolerance
            );
            Ok(report)
        } else {
            Err(ESMCError::ConservationViolation {
                quantity: self.quantity,
                drift: report.max_relative_drift,
                tolerance,
            })
        }
    }
}

/// Post-hoc summary of a conservation check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConservationReport {
    pub quantity: ConservedQuantity,
    pub tolerance: FloatValue,
    pub n_samples: usize,
    pub final_relative_drift: FloatValue,
    pub max_relative_drift: FloatValue,
    pub passed: bool,
    pub times: Vec<Time>,
    pub totals: Vec<FloatValue>,
    pub components: BTreeMap<String, Vec<FloatValue>>,
    pub toa_net_source: Vec<FloatValue>,
}

impl ConservationReport {
    /// Write the report as pretty-printed JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> ESMCResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// The checkers enabled for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConservationChecks {
    pub energy: Option<ConservationChecker>,
    pub water: Option<ConservationChecker>,
}

impl ConservationChecks {
    pub fn new(sims: &ModelSims, energy: bool, water: bool) -> Self {
        Self {
            energy: energy.then(|| ConservationChecker::new(ConservedQuantity::Energy, sims)),
            water: water.then(|| ConservationChecker::new(ConservedQuantity::Water, sims)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.energy.is_some() || self.water.is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConservationChecker> {
        self.energy.iter().chain(self.water.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConservationChecker> {
        self.energy.iter_mut().chain(self.water.iter_mut())
    }

    /// Record a sample with every enabled checker
    pub fn record(
        &mut self,
        t: Time,
        sims: &ModelSims,
        masks: &SurfaceMasks,
        space: &BoundarySpace,
        comms: &dyn CommsContext,
        dt_cpl: Time,
    ) -> ESMCResult<()> {
        for checker in self.iter_mut() {
            checker.record(t, sims, masks, space, comms, dt_cpl)?;
        }
        Ok(())
    }

    /// Check every enabled checker and write its report to `output` if given
    pub fn check_all(
        &self,
        tolerance: FloatValue,
        soft_fail: bool,
        output: Option<&Path>,
    ) -> ESMCResult<Vec<ConservationReport>> {
        let mut reports = Vec::new();
        for checker in self.iter() {
            let report = checker.report(tolerance);
            if let Some(dir) = output {
                std::fs::create_dir_all(dir)?;
                report.write_json(dir.join(format!("conservation_{}.json", checker.quantity())))?;
            }
            reports.push(checker.check(tolerance, soft_fail)?);
        }
        Ok(reports)
    }
}
