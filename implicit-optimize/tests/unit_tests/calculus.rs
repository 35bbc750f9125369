use implicit_optimize::calculus::*;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DMatrixView, DVector, DVectorView, DVectorViewMut};
use proptest::prelude::*;

/// f(x) = x^2 - c, applied component-wise.
struct ShiftedSquare {
    c: f64,
    dimension: usize,
}

impl VectorFunction<f64> for ShiftedSquare {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        for i in 0..self.dimension {
            f[i] = x[i] * x[i] - self.c;
        }
    }
}

#[test]
fn approximate_jacobian_simple_function() {
    struct SimpleTwoDimensionalPolynomial;

    impl VectorFunction<f64> for SimpleTwoDimensionalPolynomial {
        fn dimension(&self) -> usize {
            2
        }

        fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
            assert_eq!(x.len(), 2);
            assert_eq!(f.len(), x.len());
            let x1 = x[0];
            let x2 = x[1];
            f[0] = x1 * x2 + 3.0;
            f[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
        }
    }

    let mut x = DVector::from_column_slice(&[3.0, 4.0]);
    let j = approximate_jacobian(SimpleTwoDimensionalPolynomial, &mut x, 1e-6);

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
    // The unknowns are restored after every perturbation
    assert_eq!(x, DVector::from_column_slice(&[3.0, 4.0]));
}

#[test]
fn approximate_jacobian_of_scalar_quadratic_is_twice_x() {
    let f = ShiftedSquare { c: 2.0, dimension: 3 };
    let mut x = DVector::from_column_slice(&[1.5, -2.0, 0.25]);
    let j = approximate_jacobian(f, &mut x, 1e-7);
    let expected = DMatrix::from_diagonal(&DVector::from_column_slice(&[3.0, -4.0, 0.5]));
    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
}

#[test]
fn compare_jacobians_reports_location_of_largest_discrepancy() {
    let analytical = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
    let numerical = DMatrix::from_row_slice(2, 2, &[1.0, 2.1, 3.0, 3.5]);
    let discrepancy = compare_jacobians(DMatrixView::from(&analytical), DMatrixView::from(&numerical));
    assert_scalar_eq!(discrepancy.max_abs, 0.5, comp = abs, tol = 1e-12);
    assert_eq!((discrepancy.row, discrepancy.col), (1, 1));
}

#[test]
fn compare_identical_jacobians_yields_zero_discrepancy() {
    let j = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 0.5, 4.0]);
    let discrepancy = compare_jacobians(DMatrixView::from(&j), DMatrixView::from(&j));
    assert_eq!(discrepancy.max_abs, 0.0);
}

proptest! {
    #[test]
    fn central_difference_of_quadratic_is_accurate(x0 in -10.0 .. 10.0f64, c in 0.0 .. 5.0f64) {
        let h = 1e-5;
        let f = ShiftedSquare { c, dimension: 1 };
        let mut x = DVector::from_element(1, x0);
        let j = approximate_jacobian(f, &mut x, h);
        prop_assert!((j[(0, 0)] - 2.0 * x0).abs() <= 1e-4);
    }
}
