//! Core coupler for multi-component Earth-system models.
//!
//! An atmosphere and three surface models (land, ocean, sea ice) are advanced
//! independently and exchange boundary fluxes once per coupling interval.
//! This crate provides the pieces that sit between those models:
//!
//! - [`registry`]: the coupler's own shared interface fields
//! - [`component`]: the adapter contract every component model satisfies
//! - [`surface`]: area-fraction masks used to blend surface properties
//! - [`exchange`]: the pull/push flux exchange protocol
//! - [`scheduler`]: the coupling loop
//! - [`conservation`]: global energy and water bookkeeping

pub mod boundary_data;
pub mod calendar;
pub mod callbacks;
pub mod checkpoint;
pub mod comms;
pub mod component;
pub mod config;
pub mod constants;
pub mod conservation;
pub mod coupled;
pub mod diagnostics;
pub mod errors;
pub mod exchange;
pub mod field;
pub mod ivp;
pub mod registry;
pub mod scheduler;
pub mod surface;
pub mod surface_fluxes;
pub mod thermo;

#[cfg(test)]
mod example_components;

pub use coupled::{CoupledSimulation, CoupledSimulationBuilder};
pub use scheduler::solve_coupler;
