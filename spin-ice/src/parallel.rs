use rayon::prelude::*;

/// Evaluate `body(i)` for every cell index `0..n_cells`, optionally in parallel.
///
/// Output order always follows the cell index, so callers get identical
/// results whichever path runs. When `sequential` is true the work stays on
/// the current thread (no rayon overhead, best when outer-level parallelism
/// over sweep workers already saturates the cores).
pub fn map_cells<T: Send>(
    n_cells: usize,
    sequential: bool,
    body: impl Fn(usize) -> T + Send + Sync,
) -> Vec<T> {
    if sequential {
        (0..n_cells).map(body).collect()
    } else {
        (0..n_cells).into_par_iter().map(body).collect()
    }
}

/// Fill a row-major `rows × row_len` buffer row by row, optionally in parallel.
///
/// The closure receives `(row_index, row_slice)`. Rows are disjoint, so no
/// synchronisation is needed.
pub fn fill_rows<T: Send>(
    data: &mut [T],
    row_len: usize,
    sequential: bool,
    body: impl Fn(usize, &mut [T]) + Send + Sync,
) {
    if row_len == 0 {
        return;
    }
    if sequential {
        data.chunks_mut(row_len)
            .enumerate()
            .for_each(|(i, row)| body(i, row));
    } else {
        data.par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(i, row)| body(i, row));
    }
}

/// Sum `body(i)` over all cells in index order.
///
/// Per-cell terms are computed in parallel but reduced sequentially so the
/// floating-point result does not depend on the thread count.
pub fn sum_cells(n_cells: usize, sequential: bool, body: impl Fn(usize) -> f64 + Send + Sync) -> f64 {
    map_cells(n_cells, sequential, body).into_iter().sum()
}
