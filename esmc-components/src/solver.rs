//! Per-column integration shared by the component models.

use esmc_core::errors::{ESMCError, ESMCResult};
use esmc_core::field::Time;
use esmc_core::ivp::{get_last_step, substep_size, IVPBuilder, IVP};
use nalgebra::SVector;
use std::sync::Arc;

/// Integrate the tendencies of a single column from `t0` to `t1` with RK4
///
/// The interval is split into equal substeps no longer than `max_step`. An
/// empty interval returns `y0` unchanged.
pub(crate) fn advance_column<C, const D: usize>(
    component: &str,
    tendency: C,
    y0: SVector<Time, D>,
    t0: Time,
    t1: Time,
    max_step: Time,
) -> ESMCResult<SVector<Time, D>>
where
    C: IVP<SVector<Time, D>>,
{
    if t1 <= t0 {
        return Ok(y0);
    }
    let step = substep_size(t1 - t0, max_step);
    let builder = IVPBuilder::new(Arc::new(tendency), y0);
    let mut solver = builder.to_rk4(t0, t1, step);
    solver
        .integrate()
        .map_err(|e| ESMCError::Integration {
            component: component.to_string(),
            details: format!("{:?}", e),
        })?;

    let y = get_last_step(solver.results(), t1).map_err(|e| match e {
        ESMCError::Integration { details, .. } => ESMCError::Integration {
            component: component.to_string(),
            details,
        },
        other => other,
    })?;

    if let Some(i) = y.iter().position(|v| !v.is_finite()) {
        return Err(ESMCError::Integration {
            component: component.to_string(),
            details: format!("state variable {} diverged to {}", i, y[i]),
        });
    }
    Ok(y)
}

/// Length of the interval to `t_target`, rejecting backwards steps
pub(crate) fn interval(component: &str, t: Time, t_target: Time) -> ESMCResult<Time> {
    let dt = t_target - t;
    if !(dt >= 0.0) {
        return Err(ESMCError::Integration {
            component: component.to_string(),
            details: format!("cannot step from t = {} s back to t = {} s", t, t_target),
        });
    }
    Ok(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ode_solvers::Vector1;

    struct Growth;

    impl IVP<Vector1<f64>> for Growth {
        fn calculate_dy_dt(&self, _t: Time, y: &Vector1<f64>, dy_dt: &mut Vector1<f64>) {
            dy_dt[0] = y[0];
        }
    }

    struct Explode;

    impl IVP<Vector1<f64>> for Explode {
        fn calculate_dy_dt(&self, _t: Time, _y: &Vector1<f64>, dy_dt: &mut Vector1<f64>) {
            dy_dt[0] = f64::NAN;
        }
    }

    #[test]
    fn exponential_growth() {
        let y = advance_column("test", Growth, Vector1::new(1.0), 0.0, 1.0, 0.01).unwrap();
        assert_relative_eq!(y[0], 1.0f64.exp(), max_relative = 1e-8);
    }

    #[test]
    fn divergence_is_reported() {
        let result = advance_column("test", Explode, Vector1::new(1.0), 0.0, 1.0, 0.5);
        assert!(matches!(
            result,
            Err(ESMCError::Integration { component, .. }) if component == "test"
        ));
    }

    #[test]
    fn backwards_intervals_fail() {
        assert_eq!(interval("test", 10.0, 20.0).unwrap(), 10.0);
        assert!(interval("test", 20.0, 10.0).is_err());
    }
}
