//! Component models for the esmc coupler.
//!
//! Every model implements [`esmc_core::component::ComponentModel`] and can be
//! serialised as a trait object, so a coupled simulation holding any mix of
//! them can be checkpointed.
//!
//! - [`atmosphere::ColumnAtmosphere`]: single-layer gray-radiation atmosphere
//! - [`land::BucketLand`]: bucket hydrology land surface with a snow store
//! - [`ocean::SlabOcean`]: mixed-layer slab ocean
//! - [`sea_ice::PrescribedSeaIce`]: sea ice of prescribed thickness and extent
//!
//! All fluxes exchanged with the coupler are positive upward.

pub mod atmosphere;
pub mod land;
pub mod ocean;
pub mod parameters;
pub mod sea_ice;
mod solver;

pub use atmosphere::ColumnAtmosphere;
pub use land::BucketLand;
pub use ocean::SlabOcean;
pub use sea_ice::PrescribedSeaIce;
