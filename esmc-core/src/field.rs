//! Field types shared by the coupler and its component models.
//!
//! Every exchanged quantity lives on a single [`BoundarySpace`]: the 2D
//! horizontal discretisation shared by the atmosphere and all surface models.
//! Because the space is identical across components, field values map
//! column-for-column without any regridding.
//!
//! # Examples
//!
//! ```rust
//! use esmc_core::field::{BoundarySpace, FieldTag, FieldValue};
//!
//! let space = BoundarySpace::uniform_sphere(4, 1.0);
//! let temperature = FieldValue::Field(space.filled(288.0));
//! let values = temperature
//!     .expect_field(&space, FieldTag::SurfaceTemperature)
//!     .unwrap();
//! assert_eq!(space.global_mean(values), 288.0);
//! ```

use crate::errors::{ESMCError, ESMCResult};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

pub type FloatValue = f64;

/// Simulation time in seconds since the reference date of the run
pub type Time = f64;

/// Values of a single quantity for every column of a [`BoundarySpace`]
pub type FieldBuffer = Array1<FloatValue>;

/// The horizontal discretisation shared by all components.
///
/// Only the area of each column is needed by the coupler: it is used for
/// area-weighted global integrals. Two spaces are compatible if they are
/// structurally identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySpace {
    name: String,
    /// Surface area of each column
    /// unit: m^2
    areas: FieldBuffer,
    /// Latitude of each column centre, if the space is latitude-resolved
    /// unit: degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latitudes: Option<FieldBuffer>,
}

impl BoundarySpace {
    /// Create a space from explicit column areas.
    ///
    /// Returns an error if no columns are given or if any area is not strictly positive.
    pub fn new(name: &str, areas: Vec<FloatValue>) -> ESMCResult<Self> {
        if areas.is_empty() {
            return Err(ESMCError::InvalidData(format!(
                "boundary space '{}' has no columns",
                name
            )));
        }
        if let Some(column) = areas.iter().position(|a| !(a.is_finite() && *a > 0.0)) {
            return Err(ESMCError::InvalidData(format!(
                "boundary space '{}' has a non-positive area in column {}",
                name, column
            )));
        }
        Ok(Self {
            name: name.to_string(),
            areas: Array1::from(areas),
            latitudes: None,
        })
    }

    /// A sphere of the given radius split into `n_columns` columns of equal area
    pub fn uniform_sphere(n_columns: usize, radius: FloatValue) -> Self {
        let n = n_columns.max(1);
        let area = 4.0 * PI * radius * radius / n as FloatValue;
        Self {
            name: format!("uniform_sphere_{}", n),
            areas: Array1::from_elem(n, area),
            latitudes: None,
        }
    }

    /// A sphere split into `n_bands` latitude bands of equal angular width.
    ///
    /// Band areas are exact: $A_j = 2 \pi R^2 (\sin\phi_{j+1} - \sin\phi_j)$.
    pub fn latitude_bands(n_bands: usize, radius: FloatValue) -> Self {
        let n = n_bands.max(1);
        let width = PI / n as FloatValue;
        let edge = |j: usize| -PI / 2.0 + j as FloatValue * width;

        let areas = (0..n)
            .map(|j| 2.0 * PI * radius * radius * (edge(j + 1).sin() - edge(j).sin()))
            .collect::<Vec<_>>();
        let latitudes = (0..n)
            .map(|j| (edge(j) + 0.5 * width).to_degrees())
            .collect::<Vec<_>>();

        Self {
            name: format!("latitude_bands_{}", n),
            areas: Array1::from(areas),
            latitudes: Some(Array1::from(latitudes)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of columns
    pub fn size(&self) -> usize {
        self.areas.len()
    }

    pub fn areas(&self) -> &FieldBuffer {
        &self.areas
    }

    pub fn latitudes(&self) -> Option<&FieldBuffer> {
        self.latitudes.as_ref()
    }

    pub fn total_area(&self) -> FloatValue {
        self.areas.sum()
    }

    pub fn zeros(&self) -> FieldBuffer {
        Array1::zeros(self.size())
    }

    pub fn filled(&self, value: FloatValue) -> FieldBuffer {
        Array1::from_elem(self.size(), value)
    }

    /// Check that a buffer is defined over exactly this space
    pub fn check(&self, field: FieldTag, values: &FieldBuffer) -> ESMCResult<()> {
        if values.len() != self.size() {
            return Err(ESMCError::ShapeMismatch {
                field,
                expected: self.size(),
                got: values.len(),
            });
        }
        Ok(())
    }

    /// Area-weighted sum of a field over the whole space
    ///
    /// # Panics
    /// Panics if `values` is not defined over this space
    pub fn integrate(&self, values: &FieldBuffer) -> FloatValue {
        assert_eq!(
            values.len(),
            self.size(),
            "Values length must match the number of columns"
        );
        self.areas.dot(values)
    }

    /// Area-weighted mean of a field
    pub fn global_mean(&self, values: &FieldBuffer) -> FloatValue {
        self.integrate(values) / self.total_area()
    }
}

/// The closed set of quantities exchanged between the coupler and component models.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldTag {
    /// Fraction of each column covered by the surface type
    AreaFraction,
    SurfaceTemperature,
    /// Roughness length for momentum
    RoughnessMomentum,
    /// Roughness length for heat and moisture
    RoughnessBuoyancy,
    SurfaceAlbedo,
    /// Saturation specific humidity at the surface
    SurfaceHumidity,
    /// Evaporation efficiency of the surface, in [0, 1]
    Beta,
    /// Air density extrapolated to the surface
    SurfaceAirDensity,
    /// Temperature of the lowest atmospheric level
    AirTemperature,
    AirHumidity,
    AirDensity,
    WindSpeed,
    /// Height of the lowest atmospheric level above the surface
    ReferenceHeight,
    /// Sensible plus latent heat flux, positive upward
    TurbulentEnergyFlux,
    /// Water vapour flux, positive upward
    TurbulentMoistureFlux,
    /// Evaporation expressed as a liquid-water volume rate
    Evaporation,
    /// Net radiative flux at the surface, positive upward
    RadiativeEnergyFlux,
    /// Net radiative flux at the top of the atmosphere, positive upward
    TopOfAtmosphereFlux,
    LiquidPrecipitation,
    SnowPrecipitation,
    /// Atmospheric CO2 concentration
    Co2,
}

impl FieldTag {
    /// Short symbol used in logs and output files
    pub fn symbol(&self) -> &'static str {
        match self {
            FieldTag::AreaFraction => "area_fraction",
            FieldTag::SurfaceTemperature => "T_sfc",
            FieldTag::RoughnessMomentum => "z0m",
            FieldTag::RoughnessBuoyancy => "z0b",
            FieldTag::SurfaceAlbedo => "albedo",
            FieldTag::SurfaceHumidity => "q_sfc",
            FieldTag::Beta => "beta",
            FieldTag::SurfaceAirDensity => "rho_sfc",
            FieldTag::AirTemperature => "T_air",
            FieldTag::AirHumidity => "q_air",
            FieldTag::AirDensity => "rho_air",
            FieldTag::WindSpeed => "u_air",
            FieldTag::ReferenceHeight => "z_air",
            FieldTag::TurbulentEnergyFlux => "F_turb_energy",
            FieldTag::TurbulentMoistureFlux => "F_turb_moisture",
            FieldTag::Evaporation => "evaporation",
            FieldTag::RadiativeEnergyFlux => "F_radiative",
            FieldTag::TopOfAtmosphereFlux => "F_toa",
            FieldTag::LiquidPrecipitation => "P_liq",
            FieldTag::SnowPrecipitation => "P_snow",
            FieldTag::Co2 => "co2",
        }
    }

    pub const ALL: [FieldTag; 21] = [
        FieldTag::AreaFraction,
        FieldTag::SurfaceTemperature,
        FieldTag::RoughnessMomentum,
        FieldTag::RoughnessBuoyancy,
        FieldTag::SurfaceAlbedo,
        FieldTag::SurfaceHumidity,
        FieldTag::Beta,
        FieldTag::SurfaceAirDensity,
        FieldTag::AirTemperature,
        FieldTag::AirHumidity,
        FieldTag::AirDensity,
        FieldTag::WindSpeed,
        FieldTag::ReferenceHeight,
        FieldTag::TurbulentEnergyFlux,
        FieldTag::TurbulentMoistureFlux,
        FieldTag::Evaporation,
        FieldTag::RadiativeEnergyFlux,
        FieldTag::TopOfAtmosphereFlux,
        FieldTag::LiquidPrecipitation,
        FieldTag::SnowPrecipitation,
        FieldTag::Co2,
    ];

    /// Look up a tag by its [`symbol`](FieldTag::symbol)
    pub fn from_symbol(symbol: &str) -> Option<FieldTag> {
        Self::ALL.into_iter().find(|tag| tag.symbol() == symbol)
    }

    /// Unit of the quantity as stored by the coupler
    pub fn unit(&self) -> &'static str {
        match self {
            FieldTag::AreaFraction | FieldTag::SurfaceAlbedo | FieldTag::Beta => "1",
            FieldTag::SurfaceTemperature | FieldTag::AirTemperature => "K",
            FieldTag::RoughnessMomentum
            | FieldTag::RoughnessBuoyancy
            | FieldTag::ReferenceHeight => "m",
            FieldTag::SurfaceHumidity | FieldTag::AirHumidity => "kg / kg",
            FieldTag::SurfaceAirDensity | FieldTag::AirDensity => "kg / m^3",
            FieldTag::WindSpeed | FieldTag::Evaporation => "m / s",
            FieldTag::TurbulentEnergyFlux
            | FieldTag::RadiativeEnergyFlux
            | FieldTag::TopOfAtmosphereFlux => "W / m^2",
            FieldTag::TurbulentMoistureFlux
            | FieldTag::LiquidPrecipitation
            | FieldTag::SnowPrecipitation => "kg / m^2 / s",
            FieldTag::Co2 => "ppm",
        }
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A value passed across the adapter boundary: either a global scalar or a
/// field over the boundary space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Scalar(FloatValue),
    Field(FieldBuffer),
}

impl FieldValue {
    pub fn is_scalar(&self) -> bool {
        matches!(self, FieldValue::Scalar(_))
    }

    pub fn is_field(&self) -> bool {
        matches!(self, FieldValue::Field(_))
    }

    pub fn as_scalar(&self) -> Option<FloatValue> {
        match self {
            FieldValue::Scalar(v) => Some(*v),
            FieldValue::Field(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&FieldBuffer> {
        match self {
            FieldValue::Scalar(_) => None,
            FieldValue::Field(values) => Some(values),
        }
    }

    /// Borrow the field values, requiring them to be defined over `space`.
    ///
    /// Scalars are rejected rather than broadcast, and buffers of the wrong
    /// length are rejected rather than truncated.
    pub fn expect_field<'a>(
        &'a self,
        space: &BoundarySpace,
        field: FieldTag,
    ) -> ESMCResult<&'a FieldBuffer> {
        match self {
            FieldValue::Field(values) => {
                space.check(field, values)?;
                Ok(values)
            }
            FieldValue::Scalar(_) => Err(ESMCError::FieldKindMismatch {
                field,
                expected: "field",
            }),
        }
    }

    /// Consume the value, requiring a field defined over `space`
    pub fn into_field(self, space: &BoundarySpace, field: FieldTag) -> ESMCResult<FieldBuffer> {
        match self {
            FieldValue::Field(values) => {
                space.check(field, &values)?;
                Ok(values)
            }
            FieldValue::Scalar(_) => Err(ESMCError::FieldKindMismatch {
                field,
                expected: "field",
            }),
        }
    }

    pub fn expect_scalar(&self, field: FieldTag) -> ESMCResult<FloatValue> {
        self.as_scalar().ok_or(ESMCError::FieldKindMismatch {
            field,
            expected: "scalar",
        })
    }
}

impl From<FloatValue> for FieldValue {
    fn from(value: FloatValue) -> Self {
        FieldValue::Scalar(value)
    }
}

impl From<FieldBuffer> for FieldValue {
    fn from(values: FieldBuffer) -> Self {
        FieldValue::Field(values)
    }
}
