use implicit_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use implicit_optimize::newton::*;
use implicit_optimize::normalisation::Normalisation;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Matrix3, Vector3};
use numeric_literals::replace_numeric_literals;

struct MockLinearVectorFunction;

impl MockLinearVectorFunction {
    #[replace_numeric_literals(f64::from(literal))]
    fn matrix() -> Matrix3<f64> {
        Matrix3::new(5, 1, 2, 1, 4, 2, 2, 2, 4)
    }
}

impl VectorFunction<f64> for MockLinearVectorFunction {
    fn dimension(&self) -> usize {
        3
    }

    #[replace_numeric_literals(f64::from(literal))]
    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        let b = Vector3::new(1, 2, 3);
        let r = Self::matrix() * x - b;
        f.copy_from(&r);
    }
}

impl DifferentiableVectorFunction<f64> for MockLinearVectorFunction {
    fn jacobian_into(&mut self, j: &mut DMatrixViewMut<f64>, _x: &DVectorView<f64>) {
        j.copy_from(&Self::matrix());
    }
}

/// f(x) = x^2 - c, applied component-wise.
struct ShiftedSquare {
    c: f64,
}

impl VectorFunction<f64> for ShiftedSquare {
    fn dimension(&self) -> usize {
        1
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        f[0] = x[0] * x[0] - self.c;
    }
}

impl DifferentiableVectorFunction<f64> for ShiftedSquare {
    fn jacobian_into(&mut self, j: &mut DMatrixViewMut<f64>, x: &DVectorView<f64>) {
        j[(0, 0)] = 2.0 * x[0];
    }
}

fn settings(iter_max: usize) -> NewtonSettings<f64> {
    NewtonSettings {
        iter_max,
        epsilon: 1e-12,
        maximum_increment: None,
    }
}

#[test]
fn newton_converges_after_one_correction_for_linear_system() {
    let expected_solution = Vector3::new(-0.125, 0.16666667, 0.72916667);

    let mut y = DVector::zeros(3);
    let outcome = solve_normalized(MockLinearVectorFunction, &Normalisation::identity(3), &mut y, settings(10))
        .expect("Newton iterations must succeed");

    // One evaluation to compute the correction, one to observe convergence
    assert_eq!(outcome.state, NewtonState::Converged);
    assert_eq!(outcome.iterations, 2);
    let increment = outcome.increment.expect("Converged outcome must carry an increment");
    assert!((increment - expected_solution).norm() < 1e-6);
}

#[test]
fn newton_diverges_when_iter_max_is_exhausted() {
    let mut y = DVector::zeros(3);
    let outcome = solve_normalized(MockLinearVectorFunction, &Normalisation::identity(3), &mut y, settings(1))
        .expect("Divergence is not an error");

    assert_eq!(outcome.state, NewtonState::Diverged);
    assert_eq!(outcome.iterations, 1);
    assert!(outcome.increment.is_none());
}

#[test]
fn newton_converges_without_correction_when_initial_guess_is_solution() {
    let mut y = DVector::from_element(1, 2.0);
    let outcome = solve_normalized(ShiftedSquare { c: 4.0 }, &Normalisation::identity(1), &mut y, settings(1))
        .expect("Newton iterations must succeed");
    assert_eq!(outcome.state, NewtonState::Converged);
    assert_eq!(outcome.iterations, 1);
}

#[test]
fn normalized_newton_recovers_physical_increment() {
    let normalisation = Normalisation::identity(3)
        .with_unknown_factor(0..1, 1e-3)
        .with_unknown_factor(1..3, 250.0)
        .with_residual_factor(0..2, 7.5);

    let mut y = DVector::zeros(3);
    let outcome = solve_normalized(MockLinearVectorFunction, &normalisation, &mut y, settings(10))
        .expect("Newton iterations must succeed");
    assert_eq!(outcome.state, NewtonState::Converged);

    let expected = Vector3::new(-0.125, 0.16666667, 0.72916667);
    let increment = outcome.increment.expect("Converged outcome must carry an increment");
    assert_matrix_eq!(increment, expected, comp = abs, tol = 1e-6);
}

#[test]
fn newton_reports_singular_jacobian() {
    let mut y = DVector::from_element(1, 0.0);
    let result = solve_normalized(ShiftedSquare { c: 1.0 }, &Normalisation::identity(1), &mut y, settings(5));
    assert!(matches!(result, Err(NewtonError::SingularJacobian { iteration: 1 })));
}

#[test]
fn increment_limit_clamps_each_component() {
    let mut correction = DVector::from_column_slice(&[0.5, -3.0, 2.0, -0.1]);
    clamp_increment(DVectorViewMut::from(&mut correction), 1.0);
    assert_eq!(correction, DVector::from_column_slice(&[0.5, -1.0, 1.0, -0.1]));
}

#[test]
fn limited_newton_still_converges_on_quadratic() {
    let mut y = DVector::from_element(1, 10.0);
    let limited = NewtonSettings {
        iter_max: 100,
        epsilon: 1e-10,
        maximum_increment: Some(0.5),
    };
    let outcome = solve_normalized(ShiftedSquare { c: 4.0 }, &Normalisation::identity(1), &mut y, limited)
        .expect("Newton iterations must succeed");
    assert_eq!(outcome.state, NewtonState::Converged);
    let increment = outcome.increment.expect("Converged outcome must carry an increment");
    assert!((increment[0] - 2.0).abs() < 1e-8);
}

#[test]
fn broyden_update_satisfies_secant_condition() {
    let mut j = DMatrix::<f64>::identity(2, 2);
    let dz = DVector::from_column_slice(&[0.3, -0.2]);
    let df = DVector::from_column_slice(&[1.0, 0.5]);
    let updated = broyden_update(DMatrixViewMut::from(&mut j), DVectorView::from(&dz), DVectorView::from(&df));
    assert!(updated);
    assert_matrix_eq!(&j * &dz, df, comp = abs, tol = 1e-12);
}

#[test]
fn broyden_update_is_skipped_for_vanishing_step() {
    let mut j = DMatrix::<f64>::identity(2, 2);
    let dz = DVector::zeros(2);
    let df = DVector::from_column_slice(&[1.0, 0.5]);
    let updated = broyden_update(DMatrixViewMut::from(&mut j), DVectorView::from(&dz), DVectorView::from(&df));
    assert!(!updated);
    assert_matrix_eq!(DMatrixView::<f64>::from(&j), DMatrix::<f64>::identity(2, 2));
}

fn dog_leg_system() -> (DMatrix<f64>, DVector<f64>, DVector<f64>) {
    let j = DMatrix::from_diagonal(&DVector::from_column_slice(&[1.0, 10.0]));
    let f = DVector::from_column_slice(&[1.0, 1.0]);
    let newton = j.clone().lu().solve(&f).expect("System is invertible");
    (j, f, newton)
}

#[test]
fn dog_leg_keeps_newton_step_inside_trust_region() {
    let (j, f, newton) = dog_leg_system();
    let step = dog_leg_step(DMatrixView::from(&j), DVectorView::from(&f), DVectorView::from(&newton), 2.0);
    assert_matrix_eq!(step, newton, comp = float);
}

#[test]
fn dog_leg_stops_on_trust_region_boundary_between_cauchy_point_and_newton_step() {
    // |newton| ~ 1.005 and |cauchy| ~ 0.1015
    let (j, f, newton) = dog_leg_system();
    let step = dog_leg_step(DMatrixView::from(&j), DVectorView::from(&f), DVectorView::from(&newton), 0.5);
    assert_scalar_eq!(step.norm(), 0.5, comp = abs, tol = 1e-12);

    let g = j.tr_mul(&f);
    let jg = &j * &g;
    let cauchy = &g * (g.dot(&g) / jg.dot(&jg));
    // The step lies on the segment from the Cauchy point to the Newton step
    let direction = &newton - &cauchy;
    let alpha = (&step - &cauchy).dot(&direction) / direction.dot(&direction);
    assert!(alpha > 0.0 && alpha < 1.0);
    assert_matrix_eq!(step, &cauchy + &direction * alpha, comp = abs, tol = 1e-12);
}

#[test]
fn dog_leg_follows_steepest_descent_for_small_trust_region() {
    let (j, f, newton) = dog_leg_system();
    let step = dog_leg_step(DMatrixView::from(&j), DVectorView::from(&f), DVectorView::from(&newton), 0.05);
    let g = j.tr_mul(&f);
    assert_matrix_eq!(step, &g * (0.05 / g.norm()), comp = abs, tol = 1e-12);
}
