//! Row-wise iteration shared by the per-pixel stages.

use ndarray::{Array2, ArrayViewMut1, Axis};

/// Run `f` over every row of `out` and sum what it returns.
///
/// Rows go to the rayon pool when `parallel` is set and the `parallel` feature
/// is compiled in; otherwise they run in order on the calling thread. Both
/// paths write the same values.
pub(crate) fn sum_rows<T, F>(out: &mut Array2<T>, parallel: bool, f: F) -> usize
where
    T: Send + Sync,
    F: Fn(usize, ArrayViewMut1<T>) -> usize + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        if parallel {
            use ndarray::parallel::prelude::*;
            return out
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .map(|(row, out_row)| f(row, out_row))
                .sum();
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    out.axis_iter_mut(Axis(0))
        .enumerate()
        .map(|(row, out_row)| f(row, out_row))
        .sum()
}
