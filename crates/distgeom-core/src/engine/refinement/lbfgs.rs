use crate::engine::error::DgError;
use nalgebra::DVector;
use std::collections::VecDeque;
use std::ops::ControlFlow;

/// Curvature pairs with `s · y` below this are not stored.
const CURVATURE_THRESHOLD: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LbfgsOptions {
    /// Number of correction pairs kept.
    pub memory: usize,
    /// Longest step, as the norm of the whole displacement.
    pub max_step: f64,
    /// Sufficient decrease constant of the Armijo condition.
    pub armijo: f64,
    pub max_backtracks: usize,
}

impl Default for LbfgsOptions {
    fn default() -> Self {
        Self {
            memory: 10,
            max_step: 1.0,
            armijo: 1e-4,
            max_backtracks: 50,
        }
    }
}

/// State passed to the observer before every iteration.
#[derive(Debug, Clone, Copy)]
pub struct Iteration<'a> {
    /// Completed iterations so far.
    pub iteration: usize,
    pub value: f64,
    pub gradient_norm: f64,
    pub x: &'a DVector<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimization {
    pub iterations: usize,
    pub value: f64,
    pub gradient_norm: f64,
    /// Whether minimization ended because no step decreased the value.
    pub stalled: bool,
}

struct Correction {
    s: DVector<f64>,
    y: DVector<f64>,
    rho: f64,
}

/// Minimizes `objective` from `x` in place with limited memory BFGS and a
/// backtracking Armijo line search.
///
/// Stops when the observer breaks, when the value reaches zero, or when the
/// line search cannot find a decreasing step.
///
/// # Errors
///
/// Propagates the first error of `objective`.
pub fn minimize<F, O>(
    x: &mut DVector<f64>,
    options: &LbfgsOptions,
    mut objective: F,
    mut observer: O,
) -> Result<Minimization, DgError>
where
    F: FnMut(&DVector<f64>) -> Result<(f64, DVector<f64>), DgError>,
    O: FnMut(&Iteration<'_>) -> ControlFlow<()>,
{
    let (mut value, mut gradient) = objective(x)?;
    let mut history: VecDeque<Correction> = VecDeque::with_capacity(options.memory);
    let mut iteration = 0;
    let mut stalled = false;

    loop {
        let state = Iteration {
            iteration,
            value,
            gradient_norm: gradient.norm(),
            x,
        };
        if observer(&state).is_break() || value <= 0.0 {
            break;
        }

        let mut direction = -two_loop_recursion(&gradient, &history);
        let mut slope = gradient.dot(&direction);
        if !(slope < 0.0) {
            history.clear();
            direction = -gradient.clone();
            slope = -gradient.norm_squared();
        }
        if slope == 0.0 {
            break;
        }

        let direction_norm = direction.norm();
        let mut step = (options.max_step / direction_norm).min(1.0);

        let mut accepted = None;
        for _ in 0..options.max_backtracks {
            let candidate = &*x + &direction * step;
            let (candidate_value, candidate_gradient) = objective(&candidate)?;
            if candidate_value <= value + options.armijo * step * slope {
                accepted = Some((candidate, candidate_value, candidate_gradient));
                break;
            }
            step *= 0.5;
        }

        let Some((candidate, candidate_value, candidate_gradient)) = accepted else {
            stalled = true;
            break;
        };

        let s = &candidate - &*x;
        let y = &candidate_gradient - &gradient;
        let curvature = s.dot(&y);
        if curvature > CURVATURE_THRESHOLD {
            if history.len() == options.memory {
                history.pop_front();
            }
            history.push_back(Correction {
                s,
                y,
                rho: 1.0 / curvature,
            });
        }

        *x = candidate;
        value = candidate_value;
        gradient = candidate_gradient;
        iteration += 1;
    }

    Ok(Minimization {
        iterations: iteration,
        value,
        gradient_norm: gradient.norm(),
        stalled,
    })
}

/// Approximates the inverse Hessian applied to `gradient`.
fn two_loop_recursion(gradient: &DVector<f64>, history: &VecDeque<Correction>) -> DVector<f64> {
    let mut q = gradient.clone();
    let mut alphas = Vec::with_capacity(history.len());
    for correction in history.iter().rev() {
        let alpha = correction.rho * correction.s.dot(&q);
        q.axpy(-alpha, &correction.y, 1.0);
        alphas.push(alpha);
    }

    let gamma = history
        .back()
        .map_or(1.0, |last| last.s.dot(&last.y) / last.y.norm_squared());
    let mut r = q * gamma;

    for (correction, alpha) in history.iter().zip(alphas.iter().rev()) {
        let beta = correction.rho * correction.y.dot(&r);
        r.axpy(alpha - beta, &correction.s, 1.0);
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(x: &DVector<f64>) -> Result<(f64, DVector<f64>), DgError> {
        let (a, b) = (x[0], x[1]);
        let value = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
        let gradient = DVector::from_vec(vec![
            -2.0 * (1.0 - a) - 400.0 * a * (b - a * a),
            200.0 * (b - a * a),
        ]);
        Ok((value, gradient))
    }

    #[test]
    fn minimizes_the_rosenbrock_function() {
        let mut x = DVector::from_vec(vec![-1.2, 1.0]);
        let result = minimize(&mut x, &LbfgsOptions::default(), rosenbrock, |state| {
            if state.gradient_norm < 1e-8 || state.iteration >= 1000 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert!(result.iterations < 1000);
        assert!((x[0] - 1.0).abs() < 1e-5 && (x[1] - 1.0).abs() < 1e-5, "{x}");
    }

    #[test]
    fn observer_can_stop_early() {
        let mut x = DVector::from_vec(vec![-1.2, 1.0]);
        let result = minimize(&mut x, &LbfgsOptions::default(), rosenbrock, |state| {
            if state.iteration >= 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(result.iterations, 3);
    }

    #[test]
    fn steps_respect_the_length_cap() {
        let mut x = DVector::from_vec(vec![100.0, -50.0]);
        let options = LbfgsOptions {
            max_step: 0.25,
            ..LbfgsOptions::default()
        };
        let mut previous = x.clone();
        minimize(
            &mut x,
            &options,
            |x| Ok((x.norm_squared(), x * 2.0)),
            |state| {
                assert!((state.x - &previous).norm() <= 0.25 + 1e-12);
                previous = state.x.clone();
                if state.iteration >= 20 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            },
        )
        .unwrap();
    }

    #[test]
    fn objective_errors_propagate() {
        let mut x = DVector::from_vec(vec![1.0]);
        let result = minimize(
            &mut x,
            &LbfgsOptions::default(),
            |_| Err(DgError::RefinementException("nan".to_string())),
            |_| ControlFlow::Continue(()),
        );
        assert!(matches!(result, Err(DgError::RefinementException(_))));
    }

    #[test]
    fn zero_value_ends_minimization() {
        let mut x = DVector::from_vec(vec![0.0, 0.0]);
        let result = minimize(
            &mut x,
            &LbfgsOptions::default(),
            |x| Ok((x.norm_squared(), x * 2.0)),
            |_| ControlFlow::Continue(()),
        )
        .unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.value, 0.0);
    }
}
