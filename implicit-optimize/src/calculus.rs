use crate::Real;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;

pub trait VectorFunction<T>
where
    T: Scalar,
{
    fn dimension(&self) -> usize;
    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>);
}

impl<T, X> VectorFunction<T> for &mut X
where
    T: Scalar,
    X: VectorFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        X::eval_into(self, f, x)
    }
}

/// A vector function that can also provide its (analytical) Jacobian.
pub trait DifferentiableVectorFunction<T>: VectorFunction<T>
where
    T: Scalar,
{
    fn jacobian_into(&mut self, j: &mut DMatrixViewMut<T>, x: &DVectorView<T>);
}

impl<T, X> DifferentiableVectorFunction<T> for &mut X
where
    T: Scalar,
    X: DifferentiableVectorFunction<T>,
{
    fn jacobian_into(&mut self, j: &mut DMatrixViewMut<T>, x: &DVectorView<T>) {
        X::jacobian_into(self, j, x)
    }
}

#[derive(Debug, Clone)]
pub struct VectorFunctionBuilder {
    dimension: usize,
}

#[derive(Debug, Clone)]
pub struct ConcreteVectorFunction<F, J> {
    dimension: usize,
    function: F,
    jacobian: J,
}

impl VectorFunctionBuilder {
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn with_function<F, T>(self, function: F) -> ConcreteVectorFunction<F, ()>
    where
        T: Scalar,
        F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function,
            jacobian: (),
        }
    }
}

impl<F> ConcreteVectorFunction<F, ()> {
    pub fn with_jacobian<J, T>(self, jacobian: J) -> ConcreteVectorFunction<F, J>
    where
        T: Scalar,
        J: FnMut(&mut DMatrixViewMut<T>, &DVectorView<T>),
    {
        ConcreteVectorFunction {
            dimension: self.dimension,
            function: self.function,
            jacobian,
        }
    }
}

impl<F, J, T> VectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Scalar,
    F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
{
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) {
        let func = &mut self.function;
        func(f, x)
    }
}

impl<F, J, T> DifferentiableVectorFunction<T> for ConcreteVectorFunction<F, J>
where
    T: Scalar,
    F: FnMut(&mut DVectorViewMut<T>, &DVectorView<T>),
    J: FnMut(&mut DMatrixViewMut<T>, &DVectorView<T>),
{
    fn jacobian_into(&mut self, j: &mut DMatrixViewMut<T>, x: &DVectorView<T>) {
        let jac = &mut self.jacobian;
        jac(j, x)
    }
}

/// Approximates the Jacobian of a square vector function evaluated at `x`, using
/// central finite differences with resolution `h`.
///
/// The unknowns are perturbed one at a time. Before moving on to the next unknown, `x` is
/// restored to its original value, so that upon returning its content is unchanged.
pub fn approximate_jacobian<'a, T>(f: impl VectorFunction<T>, x: impl Into<DVectorViewMut<'a, T>>, h: T) -> DMatrix<T>
where
    T: Real,
{
    let x = x.into();
    let n = x.len();
    let mut jacobian = DMatrix::zeros(f.dimension(), n);
    approximate_jacobian_into(DMatrixViewMut::from(&mut jacobian), f, x, h);
    jacobian
}

/// Same as [`approximate_jacobian`], but stores the result in the provided output matrix.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn approximate_jacobian_into<'a, T>(
    mut j: DMatrixViewMut<T>,
    mut f: impl VectorFunction<T>,
    x: impl Into<DVectorViewMut<'a, T>>,
    h: T,
) where
    T: Real,
{
    let mut x = x.into();
    let m = f.dimension();
    let n = x.len();
    assert_eq!(m, j.nrows());
    assert_eq!(n, j.ncols());

    // Residuals at x - h e_i and x + h e_i
    let mut f_minus = DVector::zeros(m);
    let mut f_plus = DVector::zeros(m);

    for i in 0..n {
        let xi = x[i];
        x[i] = xi - h;
        f.eval_into(&mut DVectorViewMut::from(&mut f_minus), &DVectorView::from(&x));
        x[i] = xi + h;
        f.eval_into(&mut DVectorViewMut::from(&mut f_plus), &DVectorView::from(&x));
        x[i] = xi;

        // J[.., i] := (f+ - f-) / 2h
        let mut column_i = j.column_mut(i);
        column_i.copy_from(&f_plus);
        column_i -= &f_minus;
        column_i /= 2.0 * h;
    }
}

/// Largest cell-wise difference between an analytical and a numerical Jacobian.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct JacobianDiscrepancy<T> {
    pub max_abs: T,
    pub row: usize,
    pub col: usize,
}

/// Compares two Jacobians cell by cell and reports the maximum absolute discrepancy.
///
/// # Panics
///
/// Panics if the matrices do not have the same dimensions.
pub fn compare_jacobians<T>(analytical: DMatrixView<T>, numerical: DMatrixView<T>) -> JacobianDiscrepancy<T>
where
    T: Real,
{
    assert_eq!(analytical.shape(), numerical.shape());
    let mut discrepancy = JacobianDiscrepancy {
        max_abs: T::zero(),
        row: 0,
        col: 0,
    };
    for col in 0..analytical.ncols() {
        for row in 0..analytical.nrows() {
            let diff = (analytical[(row, col)] - numerical[(row, col)]).abs();
            if diff > discrepancy.max_abs {
                discrepancy = JacobianDiscrepancy {
                    max_abs: diff,
                    row,
                    col,
                };
            }
        }
    }
    discrepancy
}
