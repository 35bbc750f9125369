use crate::calculus::DifferentiableVectorFunction;
use crate::normalisation::Normalisation;
use crate::Real;
use log::debug;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    /// Maximum number of residual evaluations. Must be at least one.
    pub iter_max: usize,
    /// Convergence threshold on `|F|_2 / n` for the normalized residual.
    pub epsilon: T,
    /// Optional bound on every component of a normalized correction.
    pub maximum_increment: Option<T>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NewtonState {
    Iterating,
    Converged,
    Diverged,
}

#[derive(Debug, Clone)]
pub struct NewtonOutcome<T>
where
    T: Scalar,
{
    pub state: NewtonState,
    /// Number of residual evaluations performed.
    pub iterations: usize,
    /// Normalized residual norm at the last evaluation.
    pub error: T,
    /// Physical increment, available once the iteration has converged.
    pub increment: Option<DVector<T>>,
}

#[derive(Debug)]
pub enum NewtonError {
    /// The normalized Jacobian could not be factorized.
    SingularJacobian { iteration: usize },
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            &NewtonError::SingularJacobian { iteration } => {
                write!(f, "Failed to factorize the Jacobian at iteration {}.", iteration)
            }
        }
    }
}

impl Error for NewtonError {}

/// Drives the normalized Newton loop for the system `F(x) = 0`.
///
/// The unknowns `y` are normalized increments; the function is always evaluated at the
/// physical increment `s * y`. Every iteration evaluates the residual, tests
/// `|g|_2 / n < epsilon` and, when not converged, solves `J_n dy = g` and updates `y -= dy`.
/// The iteration counter is incremented before the residual is evaluated, so that a loop
/// limited to `iter_max` evaluations reports `iter_max` on divergence.
///
/// Divergence is reported through [`NewtonState::Diverged`], not as an error.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn solve_normalized<'a, T, F>(
    mut function: F,
    normalisation: &Normalisation<T>,
    y: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<NewtonOutcome<T>, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut y = y.into();
    let n = function.dimension();
    assert_eq!(y.nrows(), n);
    assert_eq!(normalisation.dimension(), n);

    let mut f = DVector::zeros(n);
    let mut j = DMatrix::zeros(n, n);
    let mut iter = 0;
    let mut state = NewtonState::Iterating;
    let mut error = T::zero();

    debug!("beginning of resolution");
    while state == NewtonState::Iterating {
        if iter >= settings.iter_max {
            state = NewtonState::Diverged;
            break;
        }
        iter += 1;

        let x = normalisation.physical_increment(DVectorView::from(&y));
        function.eval_into(&mut DVectorViewMut::from(&mut f), &DVectorView::from(&x));
        function.jacobian_into(&mut DMatrixViewMut::from(&mut j), &DVectorView::from(&x));
        normalisation.scale_residual(DVectorViewMut::from(&mut f));
        normalisation.scale_jacobian(DMatrixViewMut::from(&mut j));

        error = f.norm() / T::from_usize(n).unwrap();
        debug!("iteration {} : {}", iter, error);
        if error < settings.epsilon {
            state = NewtonState::Converged;
            break;
        }

        let lu = j.clone().lu();
        let mut correction = lu
            .solve(&f)
            .ok_or(NewtonError::SingularJacobian { iteration: iter })?;
        if let Some(limit) = settings.maximum_increment {
            clamp_increment(DVectorViewMut::from(&mut correction), limit);
        }
        y -= &correction;
    }

    let increment = match state {
        NewtonState::Converged => {
            debug!("convergence after {} iterations", iter);
            Some(normalisation.physical_increment(DVectorView::from(&y)))
        }
        _ => {
            debug!("no convergence after {} iterations", iter);
            None
        }
    };

    Ok(NewtonOutcome {
        state,
        iterations: iter,
        error,
        increment,
    })
}

/// Clamps every component of a correction to `[-limit, limit]`.
pub fn clamp_increment<T: Real>(mut correction: DVectorViewMut<T>, limit: T) {
    for c in correction.iter_mut() {
        if c.abs() > limit {
            *c = limit.copysign(*c);
        }
    }
}

/// Powell's dog-leg step for the linearised system `J dx = f` within a trust region of size
/// `radius`, given the Newton step `newton` solving that system.
///
/// The Newton step is kept if it lies inside the region. Otherwise, with `g = J^T f`, the Cauchy
/// point is `c = (g^T g) / |J g|^2 g`. If `c` lies inside the region, the step follows the
/// segment from `c` to the Newton step up to the boundary. Otherwise `c` is scaled back onto the
/// boundary.
pub fn dog_leg_step<T: Real>(j: DMatrixView<T>, f: DVectorView<T>, newton: DVectorView<T>, radius: T) -> DVector<T> {
    if newton.norm() < radius {
        return newton.clone_owned();
    }
    let g = j.tr_mul(&f);
    let jg = &j * &g;
    let cauchy = &g * (g.dot(&g) / jg.dot(&jg));
    let cauchy_norm = cauchy.norm();
    if cauchy_norm < radius {
        let r2 = radius * radius;
        let c2 = cauchy.dot(&cauchy);
        let pc = newton.dot(&cauchy);
        let p2 = newton.dot(&newton);
        let discriminant = ((pc - r2) * (pc - r2) + (p2 - r2) * (r2 - c2)).max(T::zero());
        let alpha = (r2 - c2) / ((pc - c2) + discriminant.sqrt());
        &newton * alpha + cauchy * (T::one() - alpha)
    } else {
        cauchy * (radius / cauchy_norm)
    }
}

/// Applies Broyden's rank-one update to an approximate Jacobian.
///
/// With `dz` the last step and `df` the change of the residual over that step, the update is
/// `J += ((df - J dz) dz^T) / (dz^T dz)`, after which `J dz = df` holds. The update is skipped,
/// and `false` returned, when `dz^T dz` does not exceed `100 * eps`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn broyden_update<T: Real>(mut j: DMatrixViewMut<T>, dz: DVectorView<T>, df: DVectorView<T>) -> bool {
    let denominator = dz.dot(&dz);
    if denominator <= 100.0 * T::default_epsilon() {
        return false;
    }
    let predicted = &j * &dz;
    let defect = &df - &predicted;
    j.ger(T::one() / denominator, &defect, &dz, T::one());
    true
}
