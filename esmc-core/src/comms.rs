//! Communication context for distributed runs.
//!
//! The coupler itself is single-threaded. When the boundary space is
//! decomposed across ranks, global reductions and layout changes must go
//! through a [`CommsContext`] so every rank sees the same values.

use crate::field::FloatValue;
use std::fmt::Debug;

pub trait CommsContext: Debug + Send + Sync {
    /// Block until every rank has reached this point
    fn barrier(&self);

    /// Sum a locally computed value over all ranks
    fn global_sum(&self, local: FloatValue) -> FloatValue;

    /// Whether this rank is responsible for writing shared output
    fn is_root(&self) -> bool;

    fn n_ranks(&self) -> usize;
}

/// Context for a single-process run
#[derive(Debug, Clone, Copy, Default)]
pub struct SingletonComms;

impl CommsContext for SingletonComms {
    fn barrier(&self) {}

    fn global_sum(&self, local: FloatValue) -> FloatValue {
        local
    }

    fn is_root(&self) -> bool {
        true
    }

    fn n_ranks(&self) -> usize {
        1
    }
}
