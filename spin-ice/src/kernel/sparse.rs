use super::CouplingKernel;

/// Compressed sparse rows of non-zero couplings.
///
/// Row `i` holds the pairs `(j, J(i, j))` sorted by `j`. Both `(i, j)` and
/// `(j, i)` are stored.
#[derive(Debug, Clone)]
pub struct SparseKernel {
    row_start: Vec<usize>,
    cols: Vec<u32>,
    values: Vec<f64>,
    max_abs: f64,
}

impl SparseKernel {
    /// Assemble from per-row entry lists. Repeated columns are summed and
    /// zero couplings are dropped.
    pub(crate) fn from_rows(rows: Vec<Vec<(u32, f64)>>) -> Self {
        let mut row_start = Vec::with_capacity(rows.len() + 1);
        row_start.push(0);
        let total: usize = rows.iter().map(Vec::len).sum();
        let mut cols = Vec::with_capacity(total);
        let mut values = Vec::with_capacity(total);
        let mut max_abs = 0.0f64;
        for mut row in rows {
            row.sort_unstable_by_key(|&(j, _)| j);
            let mut k = 0;
            while k < row.len() {
                let (j, mut c) = row[k];
                k += 1;
                while k < row.len() && row[k].0 == j {
                    c += row[k].1;
                    k += 1;
                }
                if c != 0.0 {
                    cols.push(j);
                    values.push(c);
                    max_abs = super::abs_max(max_abs, c);
                }
            }
            row_start.push(cols.len());
        }
        Self {
            row_start,
            cols,
            values,
            max_abs,
        }
    }

    #[inline]
    fn span(&self, i: usize) -> (&[u32], &[f64]) {
        let (a, b) = (self.row_start[i], self.row_start[i + 1]);
        (&self.cols[a..b], &self.values[a..b])
    }
}

impl CouplingKernel for SparseKernel {
    fn n_cells(&self) -> usize {
        self.row_start.len() - 1
    }

    fn coupling(&self, i: usize, j: usize) -> f64 {
        let (cols, values) = self.span(i);
        match cols.binary_search(&(j as u32)) {
            Ok(k) => values[k],
            Err(_) => 0.0,
        }
    }

    fn for_each_coupling(&self, i: usize, f: &mut dyn FnMut(usize, f64)) {
        let (cols, values) = self.span(i);
        for (&j, &c) in cols.iter().zip(values) {
            f(j as usize, c);
        }
    }

    #[inline]
    fn field(&self, i: usize, spins: &[i8]) -> f64 {
        let (cols, values) = self.span(i);
        cols.iter()
            .zip(values)
            .map(|(&j, &c)| c * spins[j as usize] as f64)
            .sum()
    }

    fn nonzero_count(&self) -> usize {
        self.values.len()
    }

    fn max_abs(&self) -> f64 {
        self.max_abs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csr_lookup() {
        let k = SparseKernel::from_rows(vec![
            vec![(2, 0.5), (1, -1.0)],
            vec![(0, -1.0)],
            vec![(0, 0.5), (1, 0.0)],
        ]);
        assert_eq!(k.n_cells(), 3);
        assert_eq!(k.nonzero_count(), 4);
        assert_eq!(k.coupling(0, 1), -1.0);
        assert_eq!(k.coupling(2, 1), 0.0);
        assert_eq!(k.max_abs(), 1.0);
        assert_eq!(k.field(0, &[1, -1, 1]), 1.5);

        let mut seen = Vec::new();
        k.for_each_coupling(0, &mut |j, c| seen.push((j, c)));
        assert_eq!(seen, vec![(1, -1.0), (2, 0.5)]);
    }

    #[test]
    fn test_repeated_columns_are_summed() {
        let k = SparseKernel::from_rows(vec![
            vec![(1, 0.25), (1, 0.5)],
            vec![(0, 0.5), (0, 0.25)],
        ]);
        assert_eq!(k.nonzero_count(), 2);
        assert_eq!(k.coupling(0, 1), 0.75);
        assert_eq!(k.coupling(1, 0), 0.75);
    }
}
