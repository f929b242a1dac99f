//! Thin layer over `ode_solvers` used by component models to advance their
//! prognostic state across a coupling interval.
//!
//! A model describes its tendencies by implementing [`IVP`] and then hands a
//! copy of itself to an [`IVPBuilder`] together with the initial state:
//!
//! ```
//! use esmc_core::ivp::{get_last_step, IVPBuilder, IVP};
//! use ode_solvers::Vector1;
//! use std::sync::Arc;
//!
//! struct Decay {
//!     rate: f64,
//! }
//!
//! impl IVP<Vector1<f64>> for Decay {
//!     fn calculate_dy_dt(&self, _t: f64, y: &Vector1<f64>, dy_dt: &mut Vector1<f64>) {
//!         dy_dt[0] = -self.rate * y[0];
//!     }
//! }
//!
//! let builder = IVPBuilder::new(Arc::new(Decay { rate: 1.0 }), Vector1::new(1.0));
//! let mut solver = builder.to_rk4(0.0, 1.0, 0.01);
//! solver.integrate().unwrap();
//! let y = get_last_step(solver.results(), 1.0).unwrap();
//! assert!((y[0] - (-1.0f64).exp()).abs() < 1e-8);
//! ```

use crate::errors::{ESMCError, ESMCResult};
use crate::field::Time;
use is_close::is_close;
use nalgebra::SVector;
use ode_solvers::dop_shared::SolverResult;
use ode_solvers::{Rk4, System};
use std::sync::Arc;

/// An initial value problem `dy/dt = f(t, y)`
pub trait IVP<S> {
    fn calculate_dy_dt(&self, t: Time, y: &S, dy_dt: &mut S);
}

/// Couples a problem definition with its initial state
pub struct IVPBuilder<C, S> {
    component: Arc<C>,
    y0: S,
}

impl<C, S> System<Time, S> for IVPBuilder<C, S>
where
    C: IVP<S>,
{
    fn system(&self, t: Time, y: &S, dy: &mut S) {
        self.component.calculate_dy_dt(t, y, dy)
    }
}

impl<C, S> IVPBuilder<C, S> {
    pub fn new(component: Arc<C>, y0: S) -> Self {
        Self { component, y0 }
    }
}

impl<C, const D: usize> IVPBuilder<C, SVector<Time, D>>
where
    C: IVP<SVector<Time, D>>,
{
    /// Build a fixed-step fourth-order Runge-Kutta solver spanning `[t0, t1]`
    pub fn to_rk4(self, t0: Time, t1: Time, step: Time) -> Rk4<Time, SVector<Time, D>, Self> {
        let y0 = self.y0;
        Rk4::new(self, t0, y0, t1, step)
    }
}

/// Largest step no longer than `max_step` that divides `span` into whole steps
///
/// Fixed-step solvers only land exactly on the end of the interval when the
/// step size divides it.
pub fn substep_size(span: Time, max_step: Time) -> Time {
    if span <= 0.0 || max_step <= 0.0 {
        return span;
    }
    let n_steps = (span / max_step).ceil().max(1.0);
    span / n_steps
}

/// Extract the solution at `t_expected` from the solver output
///
/// Searches backwards so that a solver which stepped past the end of the
/// interval still yields the sample taken at `t_expected`.
pub fn get_last_step<S: Clone>(results: &SolverResult<Time, S>, t_expected: Time) -> ESMCResult<S> {
    let (t, y) = results.get();

    t.iter()
        .zip(y.iter())
        .rev()
        .find(|(t, _)| is_close!(**t, t_expected))
        .map(|(_, y)| y.clone())
        .ok_or_else(|| ESMCError::Integration {
            component: "ivp".to_string(),
            details: format!(
                "no solution sample at t = {} (last sample at t = {:?})",
                t_expected,
                t.last()
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ode_solvers::Vector2;

    /// Constant heating of a slab plus a passive accumulator of the heating
    struct Slab {
        heat_capacity: f64,
        forcing: f64,
    }

    impl IVP<Vector2<f64>> for Slab {
        fn calculate_dy_dt(&self, _t: Time, _y: &Vector2<f64>, dy_dt: &mut Vector2<f64>) {
            dy_dt[0] = self.forcing / self.heat_capacity;
            dy_dt[1] = self.forcing;
        }
    }

    #[test]
    fn constant_forcing_is_exact() {
        let slab = Slab {
            heat_capacity: 100.0,
            forcing: 10.0,
        };
        let builder = IVPBuilder::new(Arc::new(slab), Vector2::new(280.0, 0.0));
        let mut solver = builder.to_rk4(0.0, 3600.0, substep_size(3600.0, 600.0));
        solver.integrate().unwrap();

        let y = get_last_step(solver.results(), 3600.0).unwrap();
        assert_relative_eq!(y[0], 280.0 + 10.0 * 3600.0 / 100.0, max_relative = 1e-12);
        assert_relative_eq!(y[1], 36000.0, max_relative = 1e-12);
    }

    #[test]
    fn substeps_divide_interval() {
        assert_eq!(substep_size(3600.0, 600.0), 600.0);
        assert_eq!(substep_size(3600.0, 700.0), 600.0);
        assert_eq!(substep_size(100.0, 1000.0), 100.0);
        assert_eq!(substep_size(0.0, 10.0), 0.0);
    }

    #[test]
    fn missing_sample_is_an_error() {
        let slab = Slab {
            heat_capacity: 1.0,
            forcing: 1.0,
        };
        let builder = IVPBuilder::new(Arc::new(slab), Vector2::new(0.0, 0.0));
        let mut solver = builder.to_rk4(0.0, 1.0, 0.5);
        solver.integrate().unwrap();

        assert!(matches!(
            get_last_step(solver.results(), 5.0),
            Err(ESMCError::Integration { .. })
        ));
    }
}
