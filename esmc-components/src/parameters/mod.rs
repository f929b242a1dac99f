//! Component model parameters
//!
//! Each parameter struct carries defaults suitable for an idealised
//! present-day climate. Every field can be overridden from a configuration
//! table; missing fields fall back to the defaults.

mod atmosphere;
mod land;
mod ocean;
mod sea_ice;

pub use atmosphere::ColumnAtmosphereParameters;
pub use land::BucketLandParameters;
pub use ocean::SlabOceanParameters;
pub use sea_ice::PrescribedSeaIceParameters;
