use implicit_optimize::normalisation::Normalisation;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use proptest::prelude::*;

#[test]
fn jacobian_scaling_applies_unknown_then_reciprocal_residual_factor() {
    let normalisation = Normalisation::identity(2)
        .with_unknown_factor(1..2, 4.0)
        .with_residual_factor(0..1, 2.0);
    let mut j = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    normalisation.scale_jacobian(DMatrixViewMut::from(&mut j));
    let expected = DMatrix::from_row_slice(2, 2, &[0.5, 2.0, 1.0, 4.0]);
    assert_matrix_eq!(j, expected, comp = float);
}

#[test]
fn residual_scaling_divides_by_residual_factor() {
    let normalisation = Normalisation::identity(3).with_residual_factor(1..3, 10.0);
    let mut f = DVector::from_column_slice(&[1.0, 20.0, -5.0]);
    normalisation.scale_residual(DVectorViewMut::from(&mut f));
    assert_matrix_eq!(f, DVector::from_column_slice(&[1.0, 2.0, -0.5]), comp = float);
}

proptest! {
    #[test]
    fn normalized_solve_and_undo_reproduce_physical_increment(
        s in prop::collection::vec(prop_oneof![0.01 .. 100.0f64, -100.0 .. -0.01f64], 3),
        r in prop::collection::vec(0.01 .. 100.0f64, 3),
        rhs in prop::collection::vec(-10.0 .. 10.0f64, 3),
    ) {
        // A well-conditioned system J dx = f
        let j = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5,
                                                1.0, 3.0, 0.25,
                                                0.5, 0.25, 2.0]);
        let f = DVector::from_column_slice(&rhs);
        let physical = j.clone().lu().solve(&f).expect("System is invertible");

        let mut normalisation = Normalisation::identity(3);
        for i in 0..3 {
            normalisation = normalisation
                .with_unknown_factor(i..i + 1, s[i])
                .with_residual_factor(i..i + 1, r[i]);
        }
        let mut jn = j.clone();
        normalisation.scale_jacobian(DMatrixViewMut::from(&mut jn));
        let mut fn_ = f.clone();
        normalisation.scale_residual(DVectorViewMut::from(&mut fn_));
        let normalized = jn.lu().solve(&fn_).expect("Normalized system is invertible");

        let recovered = normalisation.physical_increment(DVectorView::from(&normalized));
        prop_assert!((recovered - &physical).norm() <= 1e-6 * (1.0 + physical.norm()));

        let renormalized = normalisation.normalized_increment(DVectorView::from(&physical));
        prop_assert!((renormalized - &normalized).norm() <= 1e-6 * (1.0 + normalized.norm()));
    }
}
