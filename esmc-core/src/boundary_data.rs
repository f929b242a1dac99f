//! Time-varying boundary data prescribed from external datasets.
//!
//! Monthly samples of sea-surface temperature, sea-ice concentration and CO2
//! are interpolated linearly in time and injected into the component models
//! at every coupling step.

use crate::component::ModelSims;
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{FieldTag, FieldValue, FloatValue};
use chrono::NaiveDateTime;
use std::fmt::Debug;

/// A source of values that can be evaluated at a calendar date
pub trait BoundaryData: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, date: NaiveDateTime) -> ESMCResult<FieldValue>;
}

/// Samples at (typically monthly) dates, linearly interpolated in between
///
/// All samples must be of the same kind: either all scalars or all fields of
/// the same length. Evaluating outside the sampled range is an error rather
/// than a silent extrapolation. A dataset with a single sample is constant.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyBoundaryData {
    name: String,
    dates: Vec<NaiveDateTime>,
    values: Vec<FieldValue>,
}

impl MonthlyBoundaryData {
    pub fn new(name: &str, samples: Vec<(NaiveDateTime, FieldValue)>) -> ESMCResult<Self> {
        if samples.is_empty() {
            return Err(ESMCError::InvalidData(format!(
                "boundary data '{}' has no samples",
                name
            )));
        }
        if samples.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(ESMCError::InvalidData(format!(
                "boundary data '{}' dates must be strictly increasing",
                name
            )));
        }

        let first = &samples[0].1;
        let consistent = samples.iter().all(|(_, v)| match (first, v) {
            (FieldValue::Scalar(_), FieldValue::Scalar(_)) => true,
            (FieldValue::Field(a), FieldValue::Field(b)) => a.len() == b.len(),
            _ => false,
        });
        if !consistent {
            return Err(ESMCError::InvalidData(format!(
                "boundary data '{}' mixes samples of different kinds or sizes",
                name
            )));
        }

        let (dates, values) = samples.into_iter().unzip();
        Ok(Self {
            name: name.to_string(),
            dates,
            values,
        })
    }

    /// A dataset holding the same value at all times
    pub fn constant(name: &str, date: NaiveDateTime, value: FieldValue) -> ESMCResult<Self> {
        Self::new(name, vec![(date, value)])
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

impl BoundaryData for MonthlyBoundaryData {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, date: NaiveDateTime) -> ESMCResult<FieldValue> {
        if self.dates.len() == 1 {
            return Ok(self.values[0].clone());
        }

        let start = self.dates[0];
        let end = self.dates[self.dates.len() - 1];
        if date < start || date > end {
            return Err(ESMCError::ExtrapolationNotAllowed {
                name: self.name.clone(),
                target: date.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        // Index of the first sample strictly after `date`, clamped so that
        // `date == end` uses the final interval
        let upper = self
            .dates
            .partition_point(|d| *d <= date)
            .min(self.dates.len() - 1);
        let lower = upper - 1;

        let span = (self.dates[upper] - self.dates[lower]).num_milliseconds() as FloatValue;
        let elapsed = (date - self.dates[lower]).num_milliseconds() as FloatValue;
        let weight = elapsed / span;

        Ok(match (&self.values[lower], &self.values[upper]) {
            (FieldValue::Scalar(a), FieldValue::Scalar(b)) => {
                FieldValue::Scalar(a + weight * (b - a))
            }
            (FieldValue::Field(a), FieldValue::Field(b)) => {
                FieldValue::Field(a + &((b - a) * weight))
            }
            _ => {
                return Err(ESMCError::InvalidData(format!(
                    "{} mixes scalar and field samples",
                    self.name
                )))
            }
        })
    }
}

/// Boundary data injected into the components in prescribed (AMIP-like) runs
#[derive(Debug, Default)]
pub struct PrescribedBoundaries {
    /// Sea-surface temperature (K) written to a prescribed ocean
    pub sst: Option<Box<dyn BoundaryData>>,
    /// Sea-ice concentration written to the sea-ice area fraction
    pub sea_ice_fraction: Option<Box<dyn BoundaryData>>,
    /// Atmospheric CO2 concentration (ppm)
    pub co2: Option<Box<dyn BoundaryData>>,
}

impl PrescribedBoundaries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sst(mut self, data: impl BoundaryData + 'static) -> Self {
        self.sst = Some(Box::new(data));
        self
    }

    pub fn with_sea_ice_fraction(mut self, data: impl BoundaryData + 'static) -> Self {
        self.sea_ice_fraction = Some(Box::new(data));
        self
    }

    pub fn with_co2(mut self, data: impl BoundaryData + 'static) -> Self {
        self.co2 = Some(Box::new(data));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sst.is_none() && self.sea_ice_fraction.is_none() && self.co2.is_none()
    }

    /// Evaluate every dataset at `date` and write the values into the components
    ///
    /// Returns `true` if the sea-ice area fraction changed, in which case the
    /// surface masks must be recomputed.
    pub fn apply(&self, sims: &mut ModelSims, date: NaiveDateTime) -> ESMCResult<bool> {
        if let Some(sst) = &self.sst {
            if sims.ocean.is_prescribed() {
                let values = sst.evaluate(date)?;
                sims.ocean.update_field(FieldTag::SurfaceTemperature, &values)?;
            } else {
                log::warn!(
                    "Skipping prescribed SST: ocean model '{}' is not prescribed",
                    sims.ocean.name()
                );
            }
        }

        let mut fractions_changed = false;
        if let Some(sic) = &self.sea_ice_fraction {
            let values = sic.evaluate(date)?;
            let previous = sims.ice.get_field(FieldTag::AreaFraction)?;
            if previous != values {
                sims.ice.update_field(FieldTag::AreaFraction, &values)?;
                fractions_changed = true;
            }
        }

        if let Some(co2) = &self.co2 {
            let value = co2.evaluate(date)?;
            let value = FieldValue::Scalar(value.expect_scalar(FieldTag::Co2)?);
            sims.atmos.update_field(FieldTag::Co2, &value)?;
        }

        Ok(fractions_changed)
    }
}
