//! The adapter contract between the coupler and the component models.
//!
//! Every model (atmosphere, land, ocean, sea ice) is wrapped behind
//! [`ComponentModel`]. The coupler never inspects model internals: it reads
//! and writes boundary quantities through `get_field`/`update_field` and
//! advances models with `step`.
//!
//! Components are stored as trait objects and serialised with `typetag` so a
//! coupled simulation can be written to and read back from a checkpoint.

use crate::conservation::ConservedQuantity;
use crate::errors::{ESMCError, ESMCResult};
use crate::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, Time};
use crate::surface::SurfaceType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;

pub mod stub;

pub use stub::SurfaceStub;

/// The role a component plays in the coupled system
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    Atmosphere,
    Land,
    Ocean,
    SeaIce,
}

impl ModelKind {
    /// The surface type a surface model covers, `None` for the atmosphere
    pub fn surface_type(&self) -> Option<SurfaceType> {
        match self {
            ModelKind::Atmosphere => None,
            ModelKind::Land => Some(SurfaceType::Land),
            ModelKind::Ocean => Some(SurfaceType::Ocean),
            ModelKind::SeaIce => Some(SurfaceType::Ice),
        }
    }
}

impl From<SurfaceType> for ModelKind {
    fn from(surface: SurfaceType) -> Self {
        match surface {
            SurfaceType::Land => ModelKind::Land,
            SurfaceType::Ocean => ModelKind::Ocean,
            SurfaceType::Ice => ModelKind::SeaIce,
        }
    }
}

/// A component model as seen by the coupler
///
/// Each component must also be serialisable so that a coupled run can be
/// checkpointed. Implementations must be tagged with `#[typetag::serde]`.
///
/// # Examples
///
/// ```ignore
/// #[typetag::serde]
/// impl ComponentModel for MyOcean {
///     fn name(&self) -> &str {
///         &self.name
///     }
///     // ...
/// }
/// ```
#[typetag::serde(tag = "model")]
pub trait ComponentModel: Debug + Send + Sync {
    /// Unique identifier of this component within a coupled simulation
    fn name(&self) -> &str;

    fn kind(&self) -> ModelKind;

    /// The horizontal space the component's boundary fields are defined on
    fn space(&self) -> &BoundarySpace;

    /// Internal model time, `None` if the component has no clock
    fn current_time(&self) -> Option<Time>;

    /// Read a boundary quantity
    ///
    /// Returns [`ESMCError::UnsupportedField`] for quantities the component
    /// does not provide.
    fn get_field(&self, field: FieldTag) -> ESMCResult<FieldValue>;

    /// Overwrite a boundary quantity
    ///
    /// Only the targeted quantity may change. Returns
    /// [`ESMCError::UnsupportedField`] for quantities the component does not
    /// accept.
    fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()>;

    /// Advance the internal state to exactly `t_target`
    fn step(&mut self, t_target: Time) -> ESMCResult<()>;

    /// Recompute any cached quantities derived from the prognostic state
    ///
    /// Called after the state has been replaced externally, for example when
    /// restarting from a checkpoint.
    fn reinit(&mut self) -> ESMCResult<()>;

    /// Whether the surface state is prescribed rather than evolved
    ///
    /// Prescribed surfaces do not receive fluxes from the coupler.
    fn is_prescribed(&self) -> bool {
        false
    }

    /// Column-wise density of a conserved quantity held by the component
    ///
    /// Returns the amount per unit area (J/m^2 for energy, kg/m^2 for water)
    /// or `None` if the component does not track the quantity.
    fn conserved_total(&self, _quantity: ConservedQuantity) -> Option<FieldBuffer> {
        None
    }
}

/// Build the error returned for quantities a component does not handle
pub fn unsupported(model: &str, field: FieldTag) -> ESMCError {
    ESMCError::UnsupportedField {
        model: model.to_string(),
        field,
    }
}

/// The four component models of a coupled simulation
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelSims {
    pub atmos: Box<dyn ComponentModel>,
    pub land: Box<dyn ComponentModel>,
    pub ocean: Box<dyn ComponentModel>,
    pub ice: Box<dyn ComponentModel>,
}

impl ModelSims {
    /// Group the four components, checking that each slot holds the right kind
    /// of model and that names are unique
    pub fn new(
        atmos: Box<dyn ComponentModel>,
        land: Box<dyn ComponentModel>,
        ocean: Box<dyn ComponentModel>,
        ice: Box<dyn ComponentModel>,
    ) -> ESMCResult<Self> {
        let sims = Self {
            atmos,
            land,
            ocean,
            ice,
        };
        sims.validate()?;
        Ok(sims)
    }

    pub(crate) fn validate(&self) -> ESMCResult<()> {
        let expected = [
            ModelKind::Atmosphere,
            ModelKind::Land,
            ModelKind::Ocean,
            ModelKind::SeaIce,
        ];
        for (model, kind) in self.iter().zip(expected) {
            if model.kind() != kind {
                return Err(ESMCError::Config(format!(
                    "component '{}' is a {:?} model but was supplied as the {:?} model",
                    model.name(),
                    model.kind(),
                    kind
                )));
            }
        }

        let mut names = HashSet::new();
        for model in self.iter() {
            if !names.insert(model.name()) {
                return Err(ESMCError::Config(format!(
                    "duplicate component name '{}'",
                    model.name()
                )));
            }
        }
        Ok(())
    }

    /// Components in coupling order: atmosphere, land, ocean, sea ice
    pub fn iter(&self) -> impl Iterator<Item = &dyn ComponentModel> {
        [&self.atmos, &self.land, &self.ocean, &self.ice]
            .into_iter()
            .map(|m| &**m)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn ComponentModel>> {
        [
            &mut self.atmos,
            &mut self.land,
            &mut self.ocean,
            &mut self.ice,
        ]
        .into_iter()
    }

    pub fn surface(&self, surface: SurfaceType) -> &dyn ComponentModel {
        match surface {
            SurfaceType::Land => self.land.as_ref(),
            SurfaceType::Ocean => self.ocean.as_ref(),
            SurfaceType::Ice => self.ice.as_ref(),
        }
    }

    pub fn surface_mut(&mut self, surface: SurfaceType) -> &mut Box<dyn ComponentModel> {
        match surface {
            SurfaceType::Land => &mut self.land,
            SurfaceType::Ocean => &mut self.ocean,
            SurfaceType::Ice => &mut self.ice,
        }
    }

    /// Look up a component by name
    pub fn get(&self, name: &str) -> Option<&dyn ComponentModel> {
        self.iter().find(|m| m.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn stubs() -> [Box<dyn ComponentModel>; 4] {
        let space = Arc::new(BoundarySpace::uniform_sphere(2, 1.0));
        [
            Box::new(SurfaceStub::new("atmos", ModelKind::Atmosphere, space.clone())),
            Box::new(SurfaceStub::new("land", ModelKind::Land, space.clone())),
            Box::new(SurfaceStub::new("ocean", ModelKind::Ocean, space.clone())),
            Box::new(SurfaceStub::new("ice", ModelKind::SeaIce, space)),
        ]
    }

    #[test]
    fn model_sims_checks_kinds() {
        let [atmos, land, ocean, ice] = stubs();
        let result = ModelSims::new(atmos, ocean, land, ice);
        assert!(matches!(result, Err(ESMCError::Config(_))));
    }

    #[test]
    fn model_sims_iterates_in_coupling_order() {
        let [atmos, land, ocean, ice] = stubs();
        let sims = ModelSims::new(atmos, land, ocean, ice).unwrap();
        let names: Vec<_> = sims.iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["atmos", "land", "ocean", "ice"]);
        assert_eq!(sims.surface(SurfaceType::Ice).name(), "ice");
        assert!(sims.get("ocean").is_some());
        assert!(sims.get("missing").is_none());
    }

    #[test]
    fn model_sims_rejects_duplicate_names() {
        let space = Arc::new(BoundarySpace::uniform_sphere(2, 1.0));
        let result = ModelSims::new(
            Box::new(SurfaceStub::new("a", ModelKind::Atmosphere, space.clone())),
            Box::new(SurfaceStub::new("a", ModelKind::Land, space.clone())),
            Box::new(SurfaceStub::new("b", ModelKind::Ocean, space.clone())),
            Box::new(SurfaceStub::new("c", ModelKind::SeaIce, space)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn model_sims_serialise_round_trip() {
        let [atmos, land, ocean, ice] = stubs();
        let sims = ModelSims::new(atmos, land, ocean, ice).unwrap();
        let serialised = serde_json::to_string(&sims).unwrap();
        let restored: ModelSims = serde_json::from_str(&serialised).unwrap();
        assert_eq!(restored.land.name(), "land");
        assert_eq!(restored.ice.kind(), ModelKind::SeaIce);
    }
}
