use super::dipolar::PairCoupling;
use super::{CouplingKernel, SparseKernel};
use crate::parallel::fill_rows;

/// Exact `n × n` coupling matrix with a zero diagonal.
#[derive(Debug, Clone)]
pub struct DenseKernel {
    n_cells: usize,
    couplings: Vec<f64>,
    max_abs: f64,
    nonzero: usize,
}

impl DenseKernel {
    pub(crate) fn build(
        pairs: &PairCoupling<'_>,
        exchange: Option<&SparseKernel>,
        n_cells: usize,
        sequential: bool,
    ) -> Self {
        let mut couplings = vec![0.0; n_cells * n_cells];
        fill_rows(&mut couplings, n_cells, sequential, |i, row| {
            for (j, c) in row.iter_mut().enumerate() {
                *c = pairs.full(i, j);
            }
            if let Some(ex) = exchange {
                ex.for_each_coupling(i, &mut |j, c| row[j] += c);
            }
        });
        let max_abs = couplings.iter().fold(0.0, |m, &c| super::abs_max(m, c));
        let nonzero = couplings.iter().filter(|&&c| c != 0.0).count();
        Self {
            n_cells,
            couplings,
            max_abs,
            nonzero,
        }
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.couplings[i * self.n_cells..(i + 1) * self.n_cells]
    }
}

impl CouplingKernel for DenseKernel {
    fn n_cells(&self) -> usize {
        self.n_cells
    }

    #[inline]
    fn coupling(&self, i: usize, j: usize) -> f64 {
        self.couplings[i * self.n_cells + j]
    }

    fn for_each_coupling(&self, i: usize, f: &mut dyn FnMut(usize, f64)) {
        for (j, &c) in self.row(i).iter().enumerate() {
            if c != 0.0 {
                f(j, c);
            }
        }
    }

    #[inline]
    fn field(&self, i: usize, spins: &[i8]) -> f64 {
        self.row(i)
            .iter()
            .zip(spins)
            .map(|(&c, &s)| c * s as f64)
            .sum()
    }

    fn nonzero_count(&self) -> usize {
        self.nonzero
    }

    fn max_abs(&self) -> f64 {
        self.max_abs
    }
}
