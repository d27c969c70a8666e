use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::geometry::Geometry;
use crate::kernel::CouplingKernel;

/// Disjoint classes of cells covering every cell once.
///
/// Batch updates pick one class per step; classes produced here have no
/// coupling above the colouring threshold between their members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    classes: Vec<Vec<usize>>,
}

impl Partition {
    /// Greedy colouring of the graph of couplings with `|J| > threshold`.
    ///
    /// Cells are visited in index order and take the lowest colour not used
    /// by an already-coloured neighbour.
    pub fn colouring(kernel: &dyn CouplingKernel, threshold: f64) -> Self {
        let n = kernel.n_cells();
        let mut colour = vec![usize::MAX; n];
        let mut taken: Vec<bool> = Vec::new();
        let mut classes: Vec<Vec<usize>> = Vec::new();

        for i in 0..n {
            taken.clear();
            taken.resize(classes.len() + 1, false);
            kernel.for_each_coupling(i, &mut |j, c| {
                if c.abs() > threshold && colour[j] != usize::MAX {
                    taken[colour[j]] = true;
                }
            });
            let c = taken.iter().position(|&t| !t).unwrap_or(classes.len());
            if c == classes.len() {
                classes.push(Vec::new());
            }
            colour[i] = c;
            classes[c].push(i);
        }
        debug!(n_cells = n, n_classes = classes.len(), threshold, "coloured coupling graph");
        Self { classes }
    }

    /// Classes keyed by `(ix mod spacing, iy mod spacing)`.
    ///
    /// Fails when two cells of one class are coupled.
    pub fn grid(geometry: &Geometry, kernel: &dyn CouplingKernel, spacing: usize) -> SimResult<Self> {
        if spacing == 0 {
            return Err(SimError::Configuration(
                "grid sampling spacing must be >= 1".to_string(),
            ));
        }
        let key = |i: usize| {
            let c = geometry.cell(i);
            (c.iy % spacing) * spacing + c.ix % spacing
        };
        let mut classes = vec![Vec::new(); spacing * spacing];
        for i in 0..geometry.n_cells() {
            classes[key(i)].push(i);
        }
        classes.retain(|c| !c.is_empty());
        let partition = Self { classes };

        if let Some((i, j)) = partition.first_coupled_pair(kernel, 0.0) {
            return Err(SimError::Configuration(format!(
                "grid sampling with spacing {spacing} puts coupled cells {i} and {j} in one class; \
                 increase the spacing or reduce the kernel"
            )));
        }
        Ok(partition)
    }

    pub fn classes(&self) -> &[Vec<usize>] {
        &self.classes
    }

    pub fn class(&self, k: usize) -> &[usize] {
        &self.classes[k]
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// First pair `(i, j)` sharing a class with `|J(i, j)| > threshold`.
    pub fn first_coupled_pair(
        &self,
        kernel: &dyn CouplingKernel,
        threshold: f64,
    ) -> Option<(usize, usize)> {
        let mut class_of = vec![usize::MAX; kernel.n_cells()];
        for (k, class) in self.classes.iter().enumerate() {
            for &i in class {
                class_of[i] = k;
            }
        }
        for (k, class) in self.classes.iter().enumerate() {
            for &i in class {
                let mut hit = None;
                kernel.for_each_coupling(i, &mut |j, c| {
                    if hit.is_none() && class_of[j] == k && c.abs() > threshold {
                        hit = Some(j);
                    }
                });
                if let Some(j) = hit {
                    return Some((i, j));
                }
            }
        }
        None
    }
}
