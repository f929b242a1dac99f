//! A surface model with fixed, prescribed properties.

use crate::component::{unsupported, ComponentModel, ModelKind};
use crate::errors::ESMCResult;
use crate::field::{BoundarySpace, FieldBuffer, FieldTag, FieldValue, FloatValue, Time};
use crate::thermo::{saturation_specific_humidity_field, Phase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cached surface properties of a [`SurfaceStub`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubCache {
    pub area_fraction: FieldBuffer,
    /// unit: K
    pub temperature: FieldBuffer,
    /// unit: m
    pub roughness_momentum: FieldBuffer,
    /// unit: m
    pub roughness_buoyancy: FieldBuffer,
    pub albedo: FieldBuffer,
    pub beta: FieldBuffer,
    /// unit: kg / m^3
    pub air_density: FieldBuffer,
}

/// Stand-in surface whose state only changes when the coupler writes to it
///
/// Used for surfaces whose temperature or extent is prescribed from data
/// (e.g. observed sea-surface temperatures) and for disabled surface types,
/// which are represented by a stub with zero area fraction. Stepping a stub
/// does nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceStub {
    name: String,
    kind: ModelKind,
    space: Arc<BoundarySpace>,
    cache: StubCache,
}

impl SurfaceStub {
    /// A stub covering no area at 288 K
    pub fn new(name: &str, kind: ModelKind, space: Arc<BoundarySpace>) -> Self {
        let cache = StubCache {
            area_fraction: space.zeros(),
            temperature: space.filled(288.0),
            roughness_momentum: space.filled(1e-3),
            roughness_buoyancy: space.filled(1e-3),
            albedo: space.filled(0.3),
            beta: space.filled(1.0),
            air_density: space.filled(1.2),
        };
        Self {
            name: name.to_string(),
            kind,
            space,
            cache,
        }
    }

    pub fn with_area_fraction(mut self, fraction: FieldBuffer) -> Self {
        self.cache.area_fraction = fraction;
        self
    }

    pub fn with_temperature(mut self, temperature: FloatValue) -> Self {
        self.cache.temperature.fill(temperature);
        self
    }

    pub fn with_albedo(mut self, albedo: FloatValue) -> Self {
        self.cache.albedo.fill(albedo);
        self
    }

    pub fn with_roughness(mut self, momentum: FloatValue, buoyancy: FloatValue) -> Self {
        self.cache.roughness_momentum.fill(momentum);
        self.cache.roughness_buoyancy.fill(buoyancy);
        self
    }

    pub fn with_beta(mut self, beta: FloatValue) -> Self {
        self.cache.beta.fill(beta);
        self
    }

    pub fn cache(&self) -> &StubCache {
        &self.cache
    }

    fn phase(&self) -> Phase {
        match self.kind {
            ModelKind::SeaIce => Phase::Ice,
            _ => Phase::Liquid,
        }
    }
}

#[typetag::serde]
impl ComponentModel for SurfaceStub {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn space(&self) -> &BoundarySpace {
        &self.space
    }

    fn current_time(&self) -> Option<Time> {
        None
    }

    fn get_field(&self, field: FieldTag) -> ESMCResult<FieldValue> {
        let values = match field {
            FieldTag::AreaFraction => self.cache.area_fraction.clone(),
            FieldTag::SurfaceTemperature => self.cache.temperature.clone(),
            FieldTag::RoughnessMomentum => self.cache.roughness_momentum.clone(),
            FieldTag::RoughnessBuoyancy => self.cache.roughness_buoyancy.clone(),
            FieldTag::SurfaceAlbedo => self.cache.albedo.clone(),
            FieldTag::Beta => self.cache.beta.clone(),
            FieldTag::SurfaceAirDensity => self.cache.air_density.clone(),
            FieldTag::SurfaceHumidity => saturation_specific_humidity_field(
                &self.cache.temperature,
                &self.cache.air_density,
                self.phase(),
            ),
            _ => return Err(unsupported(&self.name, field)),
        };
        Ok(FieldValue::Field(values))
    }

    fn update_field(&mut self, field: FieldTag, value: &FieldValue) -> ESMCResult<()> {
        let target = match field {
            FieldTag::AreaFraction => &mut self.cache.area_fraction,
            FieldTag::SurfaceTemperature => &mut self.cache.temperature,
            FieldTag::SurfaceAlbedo => &mut self.cache.albedo,
            FieldTag::SurfaceAirDensity => &mut self.cache.air_density,
            _ => return Err(unsupported(&self.name, field)),
        };
        let values = value.expect_field(&self.space, field)?;
        target.assign(values);
        Ok(())
    }

    fn step(&mut self, _t_target: Time) -> ESMCResult<()> {
        Ok(())
    }

    fn reinit(&mut self) -> ESMCResult<()> {
        Ok(())
    }

    fn is_prescribed(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ESMCError;
    use ndarray::array;

    fn stub() -> SurfaceStub {
        let space = Arc::new(BoundarySpace::uniform_sphere(2, 1.0));
        SurfaceStub::new("ocean", ModelKind::Ocean, space).with_temperature(290.0)
    }

    #[test]
    fn update_then_get_returns_value() {
        let mut stub = stub();
        let sst = FieldValue::Field(array![271.0, 301.0]);
        stub.update_field(FieldTag::SurfaceTemperature, &sst).unwrap();
        assert_eq!(stub.get_field(FieldTag::SurfaceTemperature).unwrap(), sst);
    }

    #[test]
    fn update_touches_only_target() {
        let mut stub = stub();
        let before = stub.clone();
        stub.update_field(FieldTag::SurfaceAlbedo, &FieldValue::Field(array![0.6, 0.6]))
            .unwrap();
        assert_eq!(stub.cache().temperature, before.cache().temperature);
        assert_eq!(stub.cache().area_fraction, before.cache().area_fraction);
        assert_eq!(stub.cache().albedo, array![0.6, 0.6]);
    }

    #[test]
    fn step_is_idempotent() {
        let mut stub = stub();
        let before = stub.clone();
        stub.step(3600.0).unwrap();
        stub.step(7200.0).unwrap();
        assert_eq!(stub, before);
        assert_eq!(stub.current_time(), None);
    }

    #[test]
    fn reinit_is_idempotent() {
        let mut fresh = stub();
        let before = fresh.clone();
        fresh.reinit().unwrap();
        fresh.reinit().unwrap();
        assert_eq!(fresh, before);

        let mut updated = stub();
        updated
            .update_field(FieldTag::SurfaceTemperature, &FieldValue::Field(array![271.0, 301.0]))
            .unwrap();
        updated
            .update_field(FieldTag::AreaFraction, &FieldValue::Field(array![0.3, 0.7]))
            .unwrap();
        let before = updated.clone();
        for _ in 0..3 {
            updated.reinit().unwrap();
        }
        assert_eq!(updated, before);
        for tag in [
            FieldTag::AreaFraction,
            FieldTag::SurfaceTemperature,
            FieldTag::RoughnessMomentum,
            FieldTag::RoughnessBuoyancy,
            FieldTag::SurfaceAlbedo,
            FieldTag::SurfaceHumidity,
        ] {
            assert_eq!(updated.get_field(tag).unwrap(), before.get_field(tag).unwrap());
        }
        assert_eq!(updated.current_time(), None);
    }

    #[test]
    fn unsupported_fields() {
        let mut stub = stub();
        assert!(matches!(
            stub.get_field(FieldTag::TurbulentEnergyFlux),
            Err(ESMCError::UnsupportedField { .. })
        ));
        assert!(matches!(
            stub.update_field(FieldTag::Beta, &FieldValue::Field(array![1.0, 1.0])),
            Err(ESMCError::UnsupportedField { .. })
        ));
    }

    #[test]
    fn update_rejects_wrong_shape() {
        let mut stub = stub();
        let result = stub.update_field(FieldTag::SurfaceTemperature, &FieldValue::Field(array![1.0]));
        assert!(matches!(result, Err(ESMCError::ShapeMismatch { .. })));
    }

    #[test]
    fn humidity_is_saturated_at_surface_temperature() {
        let stub = stub();
        let q = stub.get_field(FieldTag::SurfaceHumidity).unwrap();
        let q = q.as_field().unwrap();
        assert!(q.iter().all(|v| *v > 0.0 && *v < 0.05));
    }

    #[test]
    fn serialise_round_trip() {
        let stub = stub();
        let boxed: Box<dyn ComponentModel> = Box::new(stub.clone());
        let serialised = serde_json::to_string(&boxed).unwrap();
        assert!(serialised.contains("\"model\":\"SurfaceStub\""));
        let restored: Box<dyn ComponentModel> = serde_json::from_str(&serialised).unwrap();
        assert_eq!(
            restored.get_field(FieldTag::SurfaceTemperature).unwrap(),
            stub.get_field(FieldTag::SurfaceTemperature).unwrap()
        );
    }
}
