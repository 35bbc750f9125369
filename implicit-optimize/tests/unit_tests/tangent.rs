use implicit_optimize::normalisation::Normalisation;
use implicit_optimize::tangent::{extract_inverse_blocks, InverseBlock, TangentError};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DMatrixView, DMatrixViewMut};

#[rustfmt::skip]
fn jacobian() -> DMatrix<f64> {
    DMatrix::from_row_slice(4, 4, &[5.0, 1.0, 0.0, 0.5,
                                    1.0, 4.0, 1.0, 0.0,
                                    0.0, 1.0, 3.0, 1.0,
                                    0.5, 0.0, 1.0, 6.0])
}

#[test]
fn single_factorization_blocks_match_explicit_inverse() {
    let j = jacobian();
    let inverse = j.clone().try_inverse().expect("Jacobian is invertible");

    let blocks = [
        InverseBlock { rows: 0..1, cols: 1..4 },
        InverseBlock { rows: 1..4, cols: 1..4 },
        InverseBlock { rows: 2..3, cols: 0..1 },
    ];
    let extracted = extract_inverse_blocks(DMatrixView::from(&j), &blocks, &Normalisation::identity(4))
        .expect("Extraction must succeed");

    assert_eq!(extracted.len(), 3);
    for (block, output) in blocks.iter().zip(&extracted) {
        let expected = inverse.view(
            (block.rows.start, block.cols.start),
            (block.rows.len(), block.cols.len()),
        );
        assert_matrix_eq!(output.clone(), expected.clone_owned(), comp = abs, tol = 1e-12);
    }
}

#[test]
fn extraction_undoes_normalization() {
    let j = jacobian();
    let physical_inverse = j.clone().try_inverse().expect("Jacobian is invertible");

    let normalisation = Normalisation::identity(4)
        .with_unknown_factor(1..4, 1e-3)
        .with_residual_factor(0..1, 50.0)
        .with_residual_factor(1..4, 2e-2);
    let mut normalized = j.clone();
    normalisation.scale_jacobian(DMatrixViewMut::from(&mut normalized));

    let blocks = [InverseBlock { rows: 1..4, cols: 0..4 }];
    let extracted = extract_inverse_blocks(DMatrixView::from(&normalized), &blocks, &normalisation)
        .expect("Extraction must succeed");

    let expected = physical_inverse.view((1, 0), (3, 4));
    assert_matrix_eq!(extracted[0].clone(), expected.clone_owned(), comp = abs, tol = 1e-9);
}

#[test]
fn singular_jacobian_is_reported() {
    let j = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
    let blocks = [InverseBlock { rows: 0..2, cols: 0..2 }];
    let result = extract_inverse_blocks(DMatrixView::from(&j), &blocks, &Normalisation::identity(2));
    assert_eq!(result, Err(TangentError::SingularJacobian));
}

#[test]
fn out_of_bounds_block_is_rejected() {
    let j = jacobian();
    let blocks = [InverseBlock { rows: 0..1, cols: 3..5 }];
    let result = extract_inverse_blocks(DMatrixView::from(&j), &blocks, &Normalisation::identity(4));
    assert!(matches!(result, Err(TangentError::BlockOutOfBounds { dimension: 4, .. })));
}
