//! Surface area fractions and the masks used to blend surface properties.
//!
//! Every column of the boundary space is partitioned between land, ocean and
//! sea ice. Properties the atmosphere sees as a single value per column (e.g.
//! surface temperature) are the fraction-weighted combination of the three
//! surface models' values.

use crate::component::ModelSims;
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue};
use crate::CoupledSimulation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default tolerance for the partition-of-unity check
pub const DEFAULT_MASK_TOLERANCE: FloatValue = 1e-10;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SurfaceType {
    Land,
    Ocean,
    Ice,
}

impl SurfaceType {
    pub const ALL: [SurfaceType; 3] = [SurfaceType::Land, SurfaceType::Ocean, SurfaceType::Ice];
}

impl fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfaceType::Land => "land",
            SurfaceType::Ocean => "ocean",
            SurfaceType::Ice => "ice",
        };
        f.write_str(name)
    }
}

/// Validated area fractions of the three surface types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMasks {
    land: FieldBuffer,
    ocean: FieldBuffer,
    ice: FieldBuffer,
}

impl SurfaceMasks {
    /// Build masks, checking that each fraction lies in [0, 1] and that the
    /// fractions sum to one in every column to within `tolerance`
    pub fn new(
        space: &BoundarySpace,
        land: FieldBuffer,
        ocean: FieldBuffer,
        ice: FieldBuffer,
        tolerance: FloatValue,
    ) -> ESMCResult<Self> {
        for values in [&land, &ocean, &ice] {
            space.check(FieldTag::AreaFraction, values)?;
        }

        for column in 0..space.size() {
            let (l, o, i) = (land[column], ocean[column], ice[column]);
            let sum = l + o + i;
            let in_range = [l, o, i]
                .iter()
                .all(|f| f.is_finite() && *f >= -tolerance && *f <= 1.0 + tolerance);
            if !in_range || (sum - 1.0).abs() > tolerance {
                return Err(ESMCError::InvalidAreaFraction { column, sum });
            }
        }

        Ok(Self { land, ocean, ice })
    }

    pub fn fraction(&self, surface: SurfaceType) -> &FieldBuffer {
        match surface {
            SurfaceType::Land => &self.land,
            SurfaceType::Ocean => &self.ocean,
            SurfaceType::Ice => &self.ice,
        }
    }

    /// Fraction-weighted combination of per-surface values
    ///
    /// $$ x = \frac{\sum_s f_s x_s}{\sum_s f_s} $$
    ///
    /// Terms whose weight is zero are skipped, so a surface that does not
    /// cover a column may report any value there (including NaN).
    pub fn combine(
        &self,
        field: FieldTag,
        land: &FieldBuffer,
        ocean: &FieldBuffer,
        ice: &FieldBuffer,
    ) -> ESMCResult<FieldBuffer> {
        let n = self.land.len();
        let mut combined = FieldBuffer::zeros(n);

        for column in 0..n {
            let mut weight = 0.0;
            let mut total = 0.0;
            for (fraction, values) in [(&self.land, land), (&self.ocean, ocean), (&self.ice, ice)] {
                let f = fraction[column];
                if f > 0.0 {
                    weight += f;
                    total += f * values[column];
                }
            }
            if weight <= 0.0 {
                return Err(ESMCError::ZeroMask { field, column });
            }
            let value = total / weight;
            if !value.is_finite() {
                return Err(ESMCError::NonFiniteValue { field, column });
            }
            combined[column] = value;
        }
        Ok(combined)
    }
}

/// The most recently computed masks and whether they still reflect the
/// surface models' area fractions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaskCache {
    masks: Option<SurfaceMasks>,
    stale: bool,
}

impl MaskCache {
    pub fn new() -> Self {
        Self {
            masks: None,
            stale: true,
        }
    }

    /// Mark the masks as out of date after an area fraction has changed
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale || self.masks.is_none()
    }

    pub fn store(&mut self, masks: SurfaceMasks) {
        self.masks = Some(masks);
        self.stale = false;
    }

    /// The last computed masks, even if they are out of date
    pub fn current(&self) -> Option<&SurfaceMasks> {
        self.masks.as_ref()
    }

    /// The masks, requiring them to be up to date
    pub fn fresh(&self) -> ESMCResult<&SurfaceMasks> {
        match (&self.masks, self.stale) {
            (Some(masks), false) => Ok(masks),
            _ => Err(ESMCError::Error(
                "surface masks are out of date; update the surface fractions first".to_string(),
            )),
        }
    }
}

/// Threshold a fractional field into a 0/1 mask
pub fn binary_mask(values: &FieldBuffer, threshold: FloatValue) -> FieldBuffer {
    values.mapv(|v| if v > threshold { 1.0 } else { 0.0 })
}

/// Re-derive consistent area fractions from the surface models and push them back.
///
/// Land is taken as given. The ice fraction is clipped to the area not
/// covered by land and the ocean takes the remainder:
///
/// - `ice = clamp(ice, 0, 1 - land)`
/// - `ocean = max(1 - land - ice, 0)`
pub fn update_surface_fractions(cs: &mut CoupledSimulation) -> ESMCResult<()> {
    let masks = surface_fractions(&mut cs.model_sims, &cs.space, cs.mask_tolerance)?;
    cs.masks.store(masks);
    Ok(())
}

/// Derive the surface masks from `sims`, writing the consistent fractions back
pub(crate) fn surface_fractions(
    sims: &mut ModelSims,
    space: &BoundarySpace,
    tolerance: FloatValue,
) -> ESMCResult<SurfaceMasks> {
    let land = sims
        .land
        .get_field(FieldTag::AreaFraction)?
        .into_field(space, FieldTag::AreaFraction)?;
    let ice = sims
        .ice
        .get_field(FieldTag::AreaFraction)?
        .into_field(space, FieldTag::AreaFraction)?;

    let land = land.mapv(|f| f.clamp(0.0, 1.0));
    let ice = ndarray::Zip::from(&ice)
        .and(&land)
        .map_collect(|i, l| i.clamp(0.0, 1.0 - l));
    let ocean = ndarray::Zip::from(&land)
        .and(&ice)
        .map_collect(|l, i| (1.0 - l - i).max(0.0));

    sims.land
        .update_field(FieldTag::AreaFraction, &FieldValue::Field(land.clone()))?;
    sims.ocean
        .update_field(FieldTag::AreaFraction, &FieldValue::Field(ocean.clone()))?;
    sims.ice
        .update_field(FieldTag::AreaFraction, &FieldValue::Field(ice.clone()))?;

    let masks = SurfaceMasks::new(space, land, ocean, ice, tolerance)?;
    log::debug!(
        "Updated surface fractions: land {:.4}, ocean {:.4}, ice {:.4}",
        space.global_mean(masks.fraction(SurfaceType::Land)),
        space.global_mean(masks.fraction(SurfaceType::Ocean)),
        space.global_mean(masks.fraction(SurfaceType::Ice)),
    );
    Ok(masks)
}
