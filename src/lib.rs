//! Coupled Earth-system model driver.
//!
//! Re-exports the coupler ([`core`]) and the component models
//! ([`components`]) and assembles them into ready-to-run experiments
//! ([`experiment`]).
//!
//! ```no_run
//! use esmc::experiment::{build_slab_planet, run, ExperimentConfig};
//!
//! let config = ExperimentConfig::from_file("config/slab_planet.toml")?;
//! let mut cs = build_slab_planet(&config)?;
//! let reports = run(&mut cs, &config.coupler.conservation)?;
//! for report in reports {
//!     println!("{}: drift {:e}", report.quantity, report.max_relative_drift);
//! }
//! # Ok::<(), esmc::core::errors::ESMCError>(())
//! ```

pub mod experiment;

pub use esmc_components as components;
pub use esmc_core as core;
