use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use serde::Serialize;
use tracing::{debug, info};
use validator::Validate;

use crate::backend::{self, Backend};
use crate::config::{KernelReduction, Pattern, Sampling, SimConfig, UpdateScheme};
use crate::energy::{zeeman_factors, EnergyBreakdown, InteractionModel};
use crate::error::{SimError, SimResult};
use crate::geometry::{Extent, Geometry, GeometryKind};
use crate::kernel::{
    build_kernel, exchange_kernel, nearest_neighbour_coupling, CouplingKernel, Dipolar,
    SparseKernel,
};
use crate::params::{CellField, ExternalField, ParamValues, Parameters, ParamsConfig};
use crate::partition::Partition;
use crate::relax::{self, Budget, Progress, RelaxReport};
use crate::state::{pattern_spins, SpinState};
use crate::update::{StepContext, StepOutcome, Updater};

/// Net magnetization normalised by the total moment, each component in `[−1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Magnetization {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Result of [`Simulation::steps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    /// Steps actually performed.
    pub steps: usize,
    pub flips: usize,
    /// Stopped early because no cell could switch.
    pub frozen: bool,
}

/// Serialisable readout of the current state.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub time: f64,
    pub sweeps: f64,
    pub switches: u64,
    pub spins: Vec<i8>,
    pub energy: EnergyBreakdown,
    pub magnetization: Magnetization,
}

/// One artificial spin-ice simulation: geometry, parameter fields, coupling
/// kernel, state and the update scheme chosen at construction.
///
/// All randomness comes from a single `Xoshiro256StarStar` seeded from
/// [`SimConfig::seed`], so two simulations built from the same inputs
/// produce identical trajectories.
#[derive(Debug)]
pub struct Simulation {
    geometry: Geometry,
    params: Parameters,
    field: ExternalField,
    config: SimConfig,
    backend: Backend,
    state: SpinState,
    model: InteractionModel,
    updater: Updater,
    /// Batch-sampling classes; `None` for single-cell sampling.
    sampling: Option<Partition>,
    /// Built on first use by `relax`.
    relax_partition: Option<Partition>,
    rng: Xoshiro256StarStar,
}

fn sampling_partition(
    geometry: &Geometry,
    kernel: &dyn CouplingKernel,
    sampling: Sampling,
) -> SimResult<Option<Partition>> {
    match sampling {
        Sampling::Single => Ok(None),
        Sampling::Sublattice => Ok(Some(Partition::colouring(kernel, 0.0))),
        Sampling::Grid { spacing } => Partition::grid(geometry, kernel, spacing).map(Some),
    }
}

impl Simulation {
    /// Build a catalog lattice with default parameter fields.
    pub fn create(
        kind: GeometryKind,
        a: f64,
        extent: impl Into<Extent>,
        config: SimConfig,
    ) -> SimResult<Self> {
        let geometry = kind.build(a, extent, config.angle, config.periodic)?;
        Self::new(geometry, ParamsConfig::default(), config)
    }

    /// Build a simulation on any geometry.
    ///
    /// The geometry's own boundary flag is used; `config.periodic` and
    /// `config.angle` only apply to [`create`](Self::create).
    pub fn new(geometry: Geometry, params: ParamsConfig, config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let backend = backend::current()?;
        let params = Parameters::new(&geometry, params)?;
        let mut rng = Xoshiro256StarStar::seed_from_u64(config.seed);
        let state = SpinState::from_pattern(&geometry, config.pattern, &mut rng);

        let exchange = exchange_kernel(&geometry, config.exchange)?;
        let kernel = build_kernel(
            &geometry,
            &params.moment,
            config.reduction,
            dipolar(&config),
            exchange.as_ref(),
            config.sequential,
        )?;
        let sampling = sampling_partition(&geometry, kernel.as_ref(), config.sampling)?;
        let field = ExternalField::default();
        let zeeman = zeeman_factors(&geometry, &params.moment, &field);
        let model = InteractionModel::new(
            kernel,
            exchange,
            zeeman,
            &state.spins,
            config.field_refresh_interval,
            config.sequential,
        );
        let updater = Updater::new(config.scheme, config.attempt_frequency, geometry.n_cells());

        info!(
            n_cells = geometry.n_cells(),
            nx = geometry.nx,
            ny = geometry.ny,
            scheme = ?config.scheme,
            reduction = ?config.reduction,
            sampling = ?config.sampling,
            backend = %backend,
            "simulation ready"
        );
        Ok(Self {
            geometry,
            params,
            field,
            config,
            backend,
            state,
            model,
            updater,
            sampling,
            relax_partition: None,
            rng,
        })
    }

    fn split(&mut self) -> (&mut Updater, StepContext<'_>) {
        (
            &mut self.updater,
            StepContext {
                params: &self.params,
                model: &mut self.model,
                state: &mut self.state,
                rng: &mut self.rng,
                partition: self.sampling.as_ref(),
                sequential: self.config.sequential,
            },
        )
    }

    fn check_cell(&self, i: usize) -> SimResult<()> {
        if i >= self.geometry.n_cells() {
            return Err(SimError::Configuration(format!(
                "cell index {i} out of range for {} cells",
                self.geometry.n_cells()
            )));
        }
        Ok(())
    }

    // --- stepping ---

    /// One step of the configured update scheme.
    pub fn step(&mut self) -> SimResult<StepOutcome> {
        let (updater, mut ctx) = self.split();
        updater.step(&mut ctx)
    }

    /// Up to `n` steps; stops early when the state is frozen.
    pub fn steps(&mut self, n: usize) -> SimResult<StepSummary> {
        let mut summary = StepSummary {
            steps: 0,
            flips: 0,
            frozen: false,
        };
        for _ in 0..n {
            match self.step()? {
                StepOutcome::Frozen => {
                    summary.frozen = true;
                    break;
                }
                outcome => {
                    summary.steps += 1;
                    summary.flips += outcome.flips();
                }
            }
        }
        Ok(summary)
    }

    pub fn relax(&mut self) -> SimResult<RelaxReport> {
        self.relax_with(Budget::default(), |_| {})
    }

    /// [`relax`](Self::relax) with a caller budget and a per-round callback.
    pub fn relax_with(
        &mut self,
        budget: Budget,
        mut on_round: impl FnMut(&Progress),
    ) -> SimResult<RelaxReport> {
        let partition = match self.relax_partition.take() {
            Some(p) => p,
            None => {
                let threshold = self.config.relax_tolerance * self.model.kernel().max_abs();
                Partition::colouring(self.model.kernel(), threshold)
            }
        };
        let max_rounds = self.config.relax_max_rounds;
        let (_, mut ctx) = self.split();
        let result = relax::relax(&mut ctx, &partition, max_rounds, budget, &mut on_round);
        self.relax_partition = Some(partition);
        result
    }

    pub fn minimize(&mut self) -> SimResult<RelaxReport> {
        self.minimize_with(Budget::default(), |_| {})
    }

    /// [`minimize`](Self::minimize) with a caller budget and a per-flip callback.
    pub fn minimize_with(
        &mut self,
        budget: Budget,
        mut on_flip: impl FnMut(&Progress),
    ) -> SimResult<RelaxReport> {
        let max_flips = self
            .config
            .minimize_factor
            .saturating_mul(self.geometry.n_cells());
        let (_, mut ctx) = self.split();
        relax::minimize(&mut ctx, max_flips, budget, &mut on_flip)
    }

    /// Switch cell `i` unconditionally.
    pub fn flip(&mut self, i: usize) -> SimResult<()> {
        self.check_cell(i)?;
        let (_, mut ctx) = self.split();
        ctx.flip(i);
        Ok(())
    }

    // --- field mutation ---

    pub fn set_field(&mut self, field: ExternalField) -> SimResult<()> {
        field.check_shape(self.geometry.n_cells())?;
        let zeeman = zeeman_factors(&self.geometry, &self.params.moment, &field);
        self.model.set_zeeman(zeeman);
        self.field = field;
        Ok(())
    }

    pub fn set_temperature(&mut self, values: impl Into<ParamValues>) -> SimResult<()> {
        self.params.temperature = values
            .into()
            .into_field("temperature", self.geometry.n_cells())?;
        Ok(())
    }

    pub fn set_barrier(&mut self, values: impl Into<ParamValues>) -> SimResult<()> {
        self.params.e_barrier = values
            .into()
            .into_field("e_barrier", self.geometry.n_cells())?;
        Ok(())
    }

    pub fn set_anisotropy(&mut self, values: impl Into<ParamValues>) -> SimResult<()> {
        self.params.anisotropy = values
            .into()
            .into_field("anisotropy", self.geometry.n_cells())?;
        Ok(())
    }

    /// Replace the moment field and rebuild everything derived from it.
    /// On error the simulation is left unchanged.
    pub fn set_moment(&mut self, values: impl Into<ParamValues>) -> SimResult<()> {
        let moment = values.into().into_field("moment", self.geometry.n_cells())?;
        let exchange = exchange_kernel(&self.geometry, self.config.exchange)?;
        self.rebuild(moment, dipolar(&self.config), exchange)?;
        debug!("moment field replaced, kernel rebuilt");
        Ok(())
    }

    /// Set the nearest-neighbour exchange J_ex [J] and rebuild the kernel.
    /// On error the simulation is left unchanged.
    pub fn set_exchange(&mut self, value: f64) -> SimResult<()> {
        let exchange = exchange_kernel(&self.geometry, value)?;
        self.rebuild(self.params.moment.clone(), dipolar(&self.config), exchange)?;
        self.config.exchange = value;
        debug!(exchange = value, "exchange replaced, kernel rebuilt");
        Ok(())
    }

    /// Strongest dipolar coupling between nearest neighbours [J], using the
    /// mean moment.
    pub fn nn_interaction(&self) -> SimResult<f64> {
        nearest_neighbour_coupling(&self.geometry, &self.params.moment, dipolar(&self.config))
    }

    /// Rescale the dipolar prefactor so that [`nn_interaction`](Self::nn_interaction)
    /// becomes `value` [J], then rebuild the kernel.
    /// On error the simulation is left unchanged.
    pub fn set_nn_interaction(&mut self, value: f64) -> SimResult<()> {
        if !(value.is_finite() && value >= 0.0) {
            return Err(SimError::Configuration(format!(
                "nearest-neighbour interaction must be finite and >= 0, got {value}"
            )));
        }
        let unit = nearest_neighbour_coupling(
            &self.geometry,
            &self.params.moment,
            Dipolar {
                prefactor: 1.0,
                ..dipolar(&self.config)
            },
        )?;
        if unit == 0.0 {
            return Err(SimError::Configuration(
                "nearest-neighbour interaction is zero at unit prefactor, cannot rescale"
                    .to_string(),
            ));
        }
        let scaled = Dipolar {
            prefactor: value / unit,
            ..dipolar(&self.config)
        };
        let exchange = self.model.exchange().cloned();
        self.rebuild(self.params.moment.clone(), scaled, exchange)?;
        self.config.dipolar_prefactor = scaled.prefactor;
        debug!(
            nn_interaction = value,
            prefactor = scaled.prefactor,
            "dipolar prefactor rescaled"
        );
        Ok(())
    }

    /// Build the kernel, sampling classes and Zeeman factors for new couplings
    /// and commit them only if every piece succeeded.
    fn rebuild(
        &mut self,
        moment: CellField,
        dipolar: Dipolar,
        exchange: Option<SparseKernel>,
    ) -> SimResult<()> {
        let kernel = build_kernel(
            &self.geometry,
            &moment,
            self.config.reduction,
            dipolar,
            exchange.as_ref(),
            self.config.sequential,
        )?;
        let sampling = sampling_partition(&self.geometry, kernel.as_ref(), self.config.sampling)?;
        let zeeman = zeeman_factors(&self.geometry, &moment, &self.field);

        self.model.replace_kernel(kernel, exchange, &self.state.spins);
        self.model.set_zeeman(zeeman);
        self.params.moment = moment;
        self.sampling = sampling;
        self.relax_partition = None;
        Ok(())
    }

    /// Reset the spins to `pattern`. Clocks are kept.
    pub fn set_pattern(&mut self, pattern: Pattern) {
        let spins = pattern_spins(&self.geometry, pattern, &mut self.rng);
        self.model.assign(&mut self.state.spins, &spins);
    }

    // --- readout ---

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn field(&self) -> &ExternalField {
        &self.field
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn scheme(&self) -> UpdateScheme {
        self.updater.scheme()
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn n_cells(&self) -> usize {
        self.geometry.n_cells()
    }

    pub fn state(&self) -> &SpinState {
        &self.state
    }

    pub fn spins(&self) -> &[i8] {
        self.state.spins()
    }

    /// Physical time [s] accumulated by the Néel scheme.
    pub fn time(&self) -> f64 {
        self.state.time()
    }

    pub fn sweeps(&self) -> f64 {
        self.state.sweeps()
    }

    pub fn kernel(&self) -> &dyn CouplingKernel {
        self.model.kernel()
    }

    pub fn total_energy(&self) -> SimResult<f64> {
        self.model
            .total_energy(&self.state.spins, &self.params.anisotropy)
    }

    pub fn energy_breakdown(&self) -> SimResult<EnergyBreakdown> {
        self.model
            .energy_breakdown(&self.state.spins, &self.params.anisotropy)
    }

    /// `h_i` [J], so that switching `i` changes the energy by `2·s_i·h_i`.
    pub fn local_field(&self, i: usize) -> SimResult<f64> {
        self.check_cell(i)?;
        self.model.local_field(&self.state.spins, i)
    }

    pub fn coupling(&self, i: usize, j: usize) -> SimResult<f64> {
        self.check_cell(i)?;
        self.check_cell(j)?;
        Ok(self.model.kernel().coupling(i, j))
    }

    pub fn magnetization(&self) -> Magnetization {
        let moment = &self.params.moment;
        let total: f64 = moment.as_slice().iter().sum();
        if total == 0.0 {
            return Magnetization {
                x: 0.0,
                y: 0.0,
                z: 0.0,
            };
        }
        let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
        for (i, &s) in self.state.spins.iter().enumerate() {
            let m = s as f64 * moment[i];
            match self.geometry.orientation(i) {
                Some((ox, oy)) => {
                    x += m * ox;
                    y += m * oy;
                }
                None => z += m,
            }
        }
        Magnetization {
            x: x / total,
            y: y / total,
            z: z / total,
        }
    }

    pub fn snapshot(&self) -> SimResult<Snapshot> {
        Ok(Snapshot {
            time: self.state.time,
            sweeps: self.state.sweeps(),
            switches: self.state.switches,
            spins: self.state.spins.clone(),
            energy: self.energy_breakdown()?,
            magnetization: self.magnetization(),
        })
    }

    /// Reduction in effect, for reporting.
    pub fn reduction(&self) -> KernelReduction {
        self.config.reduction
    }

    pub fn anisotropy(&self) -> &CellField {
        &self.params.anisotropy
    }
}

fn dipolar(config: &SimConfig) -> Dipolar {
    Dipolar {
        prefactor: config.dipolar_prefactor,
        decay: config.dipolar_decay,
    }
}
