//! The coupler's shared interface fields.
//!
//! Fields are declared up front through a [`FieldSchema`] and allocated once
//! when the [`FieldRegistry`] is built. Afterwards fields can be read and
//! overwritten but never added: a tag outside the schema is a wiring bug and
//! is reported as [`ESMCError::UnknownField`].
//!
//! # Example
//!
//! ```
//! use esmc_core::field::{BoundarySpace, FieldTag};
//! use esmc_core::registry::{FieldRegistry, FieldSchema};
//! use std::sync::Arc;
//!
//! let schema = FieldSchema::new()
//!     .field(FieldTag::SurfaceTemperature)
//!     .field(FieldTag::TurbulentEnergyFlux);
//! let space = Arc::new(BoundarySpace::uniform_sphere(4, 1.0));
//! let mut registry = FieldRegistry::new(space, &schema);
//!
//! registry.fill(FieldTag::SurfaceTemperature, 288.0).unwrap();
//! assert!(registry.get(FieldTag::SurfaceAlbedo).is_err());
//! ```

use crate::errors::{ESMCError, ESMCResult};
use crate::exchange::EXCHANGED_FIELDS;
use crate::field::{BoundarySpace, FieldBuffer, FieldTag, FloatValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The closed set of fields held by a [`FieldRegistry`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<FieldTag>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to the schema
    ///
    /// Adding the same tag twice has no effect.
    pub fn field(mut self, tag: FieldTag) -> Self {
        if !self.fields.contains(&tag) {
            self.fields.push(tag);
        }
        self
    }

    /// The interface fields exchanged between the atmosphere and the surface models
    pub fn coupler_default() -> Self {
        EXCHANGED_FIELDS
            .into_iter()
            .fold(Self::new(), |schema, tag| schema.field(tag))
    }

    pub fn contains(&self, tag: FieldTag) -> bool {
        self.fields.contains(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldTag> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Typed mapping from a field tag to a buffer over the boundary space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRegistry {
    space: Arc<BoundarySpace>,
    fields: BTreeMap<FieldTag, FieldBuffer>,
}

impl FieldRegistry {
    /// Allocate a zero-initialised buffer for every field in the schema
    pub fn new(space: Arc<BoundarySpace>, schema: &FieldSchema) -> Self {
        let fields = schema
            .iter()
            .map(|tag| (*tag, space.zeros()))
            .collect::<BTreeMap<_, _>>();
        Self { space, fields }
    }

    pub fn space(&self) -> &BoundarySpace {
        &self.space
    }

    pub fn contains(&self, tag: FieldTag) -> bool {
        self.fields.contains_key(&tag)
    }

    pub fn get(&self, tag: FieldTag) -> ESMCResult<&FieldBuffer> {
        self.fields
            .get(&tag)
            .ok_or(ESMCError::UnknownField { field: tag })
    }

    pub fn get_mut(&mut self, tag: FieldTag) -> ESMCResult<&mut FieldBuffer> {
        self.fields
            .get_mut(&tag)
            .ok_or(ESMCError::UnknownField { field: tag })
    }

    /// Overwrite a field in place
    ///
    /// The new values must be defined over the registry's boundary space.
    pub fn set(&mut self, tag: FieldTag, values: &FieldBuffer) -> ESMCResult<()> {
        self.space.check(tag, values)?;
        let target = self
            .fields
            .get_mut(&tag)
            .ok_or(ESMCError::UnknownField { field: tag })?;
        target.assign(values);
        Ok(())
    }

    pub fn fill(&mut self, tag: FieldTag, value: FloatValue) -> ESMCResult<()> {
        self.get_mut(tag)?.fill(value);
        Ok(())
    }

    /// Check that every buffer is defined over the registry's boundary space
    pub fn validate(&self) -> ESMCResult<()> {
        self.fields
            .iter()
            .try_for_each(|(tag, values)| self.space.check(*tag, values))
    }

    /// Check that every tag in `tags` is registered
    pub fn require(&self, tags: &[FieldTag]) -> ESMCResult<()> {
        match tags.iter().find(|tag| !self.contains(**tag)) {
            Some(tag) => Err(ESMCError::UnknownField { field: *tag }),
            None => Ok(()),
        }
    }

    pub fn tags(&self) -> impl Iterator<Item = &FieldTag> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldTag, &FieldBuffer)> {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn registry() -> FieldRegistry {
        let space = Arc::new(BoundarySpace::uniform_sphere(3, 1.0));
        FieldRegistry::new(space, &FieldSchema::coupler_default())
    }

    #[test]
    fn schema_ignores_duplicates() {
        let schema = FieldSchema::new()
            .field(FieldTag::SurfaceTemperature)
            .field(FieldTag::SurfaceTemperature);
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn default_schema_covers_exchanged_fields() {
        let schema = FieldSchema::coupler_default();
        assert_eq!(schema.len(), EXCHANGED_FIELDS.len());
        assert!(EXCHANGED_FIELDS.iter().all(|tag| schema.contains(*tag)));
        assert!(registry().require(&EXCHANGED_FIELDS).is_ok());
    }

    #[test]
    fn fields_start_at_zero() {
        let registry = registry();
        assert_eq!(registry.tags().count(), FieldSchema::coupler_default().len());
        assert!(registry
            .get(FieldTag::TurbulentEnergyFlux)
            .unwrap()
            .iter()
            .all(|v| *v == 0.0));
    }

    #[test]
    fn set_replaces_values() {
        let mut registry = registry();
        registry
            .set(FieldTag::SurfaceTemperature, &array![280.0, 290.0, 300.0])
            .unwrap();
        assert_eq!(
            registry.get(FieldTag::SurfaceTemperature).unwrap(),
            array![280.0, 290.0, 300.0]
        );
    }

    #[test]
    fn set_rejects_wrong_shape() {
        let mut registry = registry();
        let result = registry.set(FieldTag::SurfaceTemperature, &array![280.0, 290.0]);
        assert!(matches!(result, Err(ESMCError::ShapeMismatch { .. })));
        // The field is left untouched
        assert_eq!(
            registry.get(FieldTag::SurfaceTemperature).unwrap(),
            array![0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut registry = registry();
        assert!(matches!(
            registry.get(FieldTag::Co2),
            Err(ESMCError::UnknownField { field: FieldTag::Co2 })
        ));
        assert!(registry.fill(FieldTag::WindSpeed, 1.0).is_err());
        assert!(registry
            .require(&[FieldTag::SurfaceTemperature, FieldTag::AirDensity])
            .is_err());
        assert!(registry
            .require(&[FieldTag::SurfaceTemperature, FieldTag::SurfaceAirDensity])
            .is_ok());
    }

    #[test]
    fn validate_rejects_malformed_buffers() {
        let registry = registry();
        assert!(registry.validate().is_ok());

        let mut value = serde_json::to_value(&registry).unwrap();
        let fields = value["fields"].as_object_mut().unwrap();
        let (_, buffer) = fields.iter_mut().next().unwrap();
        buffer["dim"] = serde_json::json!([1]);
        buffer["data"] = serde_json::json!([0.0]);
        let malformed: FieldRegistry = serde_json::from_value(value).unwrap();

        assert!(matches!(
            malformed.validate(),
            Err(ESMCError::ShapeMismatch { expected: 3, got: 1, .. })
        ));
    }

    #[test]
    fn serialise_round_trip() {
        let mut registry = registry();
        registry.fill(FieldTag::SurfaceAlbedo, 0.3).unwrap();
        let serialised = serde_json::to_string(&registry).unwrap();
        let restored: FieldRegistry = serde_json::from_str(&serialised).unwrap();
        assert_eq!(restored, registry);
    }
}
