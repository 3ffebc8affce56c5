use nalgebra::{DMatrix, DVector, RealField};
use nalgebra_sparse::CsrMatrix;
use std::ops::Range;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Extract a dense copy of the given rows and columns of a sparse matrix.
pub fn dense_block<T>(matrix: &CsrMatrix<T>, rows: Range<usize>, cols: Range<usize>) -> DMatrix<T>
where
    T: RealField + Copy,
{
    let mut block = DMatrix::zeros(rows.len(), cols.len());
    for (i, j, &v) in matrix.triplet_iter() {
        if rows.contains(&i) && cols.contains(&j) {
            block[(i - rows.start, j - cols.start)] += v;
        }
    }
    block
}

/// Solve a sparse system by converting it to a dense matrix and using an LU decomposition.
///
/// Only suitable for the small systems occurring in tests.
pub fn solve_dense<T>(matrix: &CsrMatrix<T>, rhs: &DVector<T>) -> Option<DVector<T>>
where
    T: RealField + Copy,
{
    DMatrix::from(matrix).lu().solve(rhs)
}

pub fn prefix_sum(counts: impl IntoIterator<Item = usize>, x0: usize) -> impl Iterator<Item = usize> {
    counts.into_iter().scan(x0, |sum, x| {
        let current = *sum;
        *sum += x;
        Some(current)
    })
}
