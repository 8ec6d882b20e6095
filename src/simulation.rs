use crate::convergence::{ConvergenceTest, StopReason};
use crate::exchange::Exchange;
use crate::field_state::FieldState;
use crate::freeze::{count_frozen, count_receptive};
use crate::grid::HexGrid;
use crate::partition::{plan_with_hops, Partition, UPDATE_HOPS};
use crate::strategy::{build_strategy, worker_count, ConcurrencyStrategy};
use crate::update::UpdateRule;
use anyhow::Result;
use log::{debug, info, trace};
use reiter_common::{SimParams, SimulationConfig, Snapshot};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Seconds between progress lines in the log.
const PROGRESS_INTERVAL_SECS: f64 = 5.0;

/// Receives the field after seeding, after every pass, and once more at the end.
pub trait StateObserver {
    /// `iteration` is the number of completed passes; `is_final` marks the last call of a run.
    fn observe(&mut self, iteration: usize, field: &[f32], is_final: bool) -> Result<()>;
}

impl<F> StateObserver for F
where
    F: FnMut(usize, &[f32], bool) -> Result<()>,
{
    fn observe(&mut self, iteration: usize, field: &[f32], is_final: bool) -> Result<()> {
        self(iteration, field, is_final)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub iterations: usize,
    pub reason: StopReason,
    pub elapsed: Duration,
    pub frozen_cells: usize,
    pub receptive_cells: usize,
}

/// Manages the state and execution of one crystal growth run.
pub struct ReiterSimulation {
    /// The configuration the run was built from.
    config: SimulationConfig,
    params: SimParams,
    rule: UpdateRule,
    /// Double-buffered field; the engine is its only owner.
    state: FieldState,
    /// Scatter/gather scratch, lent to the strategy each pass.
    exchange: Exchange,
    strategy: Box<dyn ConcurrencyStrategy>,
    convergence: ConvergenceTest,
    /// Completed passes.
    iteration: usize,
    /// Snapshots collected at record intervals.
    recorded_snapshots: Vec<Snapshot>,
}

impl ReiterSimulation {
    /// Builds the engine with the strategy selected in `config.run`.
    ///
    /// The configuration is expected to be validated already.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let params = config.get_sim_params();
        let partitions = plan_with_hops(
            params.total_cells(),
            worker_count(&config.run),
            params.width,
            UPDATE_HOPS,
        );
        let strategy = build_strategy(&config.run, &partitions)?;
        Ok(Self::with_strategy(config, partitions, strategy))
    }

    /// Builds the engine around an existing strategy and partition plan.
    pub fn with_strategy(
        config: SimulationConfig,
        partitions: Vec<Partition>,
        strategy: Box<dyn ConcurrencyStrategy>,
    ) -> Self {
        let params = config.get_sim_params();
        let grid = HexGrid::from_params(&params);
        debug!(
            "Partition plan for {} strategy: {:?}",
            strategy.name(),
            partitions
        );

        Self {
            rule: UpdateRule::new(&params),
            state: FieldState::new(grid, params.beta),
            exchange: Exchange::new(partitions),
            strategy,
            convergence: ConvergenceTest::new(config.run.max_iterations, config.run.stability_patience),
            iteration: 0,
            recorded_snapshots: Vec::new(),
            params,
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn num_workers(&self) -> usize {
        self.exchange.num_workers()
    }

    /// The newest completed field.
    pub fn field(&self) -> &[f32] {
        self.state.latest()
    }

    pub fn frozen_count(&self) -> usize {
        count_frozen(self.field())
    }

    pub fn receptive_count(&self) -> usize {
        count_receptive(&self.state.grid, self.field())
    }

    /// Advances the field by one pass: scatter, local update, gather, swap.
    ///
    /// Returns whether the receptive set was unchanged by the pass.
    pub fn step(&mut self) -> Result<bool> {
        let grid = self.state.grid;
        let previous = &self.state.previous;
        let current = &mut self.state.current;

        self.strategy.scatter(&mut self.exchange, previous)?;
        self.strategy.local_update(&mut self.exchange, &self.rule)?;
        self.strategy.gather(&mut self.exchange, current)?;

        let stable = ConvergenceTest::is_stable(&grid, previous, current);

        // --- Swap Buffers: Output becomes Input for next pass ---
        self.state.swap_buffers();
        self.iteration += 1;
        Ok(stable)
    }

    /// Runs passes until the field is stable or the iteration ceiling is passed.
    pub fn run(&mut self, observer: &mut dyn StateObserver) -> Result<RunOutcome> {
        let record_interval = self.config.output.record_interval;
        info!(
            "Running {}x{} grid with the {} strategy on {} worker(s), at most {} iterations.",
            self.params.width,
            self.params.height,
            self.strategy.name(),
            self.num_workers(),
            self.convergence.max_iterations() + 1
        );

        observer.observe(self.iteration, self.field(), false)?;
        if record_interval > 0 {
            self.record_snapshot();
        }

        let start_time = Instant::now();
        let mut previous_print_time = start_time;

        let reason = loop {
            let step_start_time = Instant::now();
            let stable = self.step()?;
            let step_duration = step_start_time.elapsed();

            observer.observe(self.iteration, self.field(), false)?;

            let is_record_step = record_interval > 0 && self.iteration % record_interval == 0;
            if is_record_step {
                self.record_snapshot();
            }

            let now = Instant::now();
            if now.duration_since(previous_print_time).as_secs_f64() >= PROGRESS_INTERVAL_SECS || is_record_step {
                info!(
                    "Iteration {} | Frozen: {} | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                    self.iteration,
                    self.frozen_count(),
                    step_duration.as_secs_f64() * 1000.0,
                    start_time.elapsed().as_secs_f64()
                );
                previous_print_time = now;
            } else {
                trace!(
                    "Iteration {} completed in {:.3} ms (stable: {})",
                    self.iteration,
                    step_duration.as_secs_f64() * 1000.0,
                    stable
                );
            }

            if let Some(reason) = self.convergence.observe(self.iteration, stable) {
                break reason;
            }
        };
        let elapsed = start_time.elapsed();

        observer.observe(self.iteration, self.field(), true)?;
        let last_recorded = self.recorded_snapshots.last().map(|s| s.iteration);
        if record_interval > 0 && last_recorded != Some(self.iteration) {
            self.record_snapshot();
        }

        let outcome = RunOutcome {
            iterations: self.iteration,
            reason,
            elapsed,
            frozen_cells: self.frozen_count(),
            receptive_cells: self.receptive_count(),
        };
        info!(
            "Simulation stopped after {} iterations ({:?}) with {} frozen cells.",
            outcome.iterations, outcome.reason, outcome.frozen_cells
        );
        Ok(outcome)
    }

    /// A snapshot of the newest completed field.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            iteration: self.iteration,
            width: self.params.width,
            height: self.params.height,
            frozen_cells: self.frozen_count(),
            receptive_cells: self.receptive_count(),
            values: self.field().to_vec(),
        }
    }

    pub fn record_snapshot(&mut self) {
        let snapshot = self.snapshot();
        trace!("Recorded snapshot at iteration {}.", snapshot.iteration);
        self.recorded_snapshots.push(snapshot);
    }

    pub fn get_recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freeze::is_frozen;
    use crate::strategy::{DistributedStrategy, SequentialStrategy, ThreadedStrategy};
    use reiter_common::Backend;

    fn config(width: usize, height: usize, backend: Backend, workers: usize) -> SimulationConfig {
        let text = format!(
            r#"
            [grid]
            width = {width}
            height = {height}

            [params]
            alpha = 1.0
            beta = 0.5
            gamma = 0.01

            [run]
            workers = {workers}
            max_iterations = 40

            [output]
            base_filename = "test"
            "#
        );
        let mut config = SimulationConfig::from_toml_str(&text).unwrap();
        config.run.backend = backend;
        config
    }

    fn engine(backend: Backend, workers: usize) -> ReiterSimulation {
        ReiterSimulation::new(config(13, 11, backend, workers)).unwrap()
    }

    #[test]
    fn five_by_five_scenario() {
        let mut sim = ReiterSimulation::new(config(5, 5, Backend::Sequential, 1)).unwrap();
        let grid = HexGrid::from_params(sim.params());
        assert_eq!(grid.row_col(grid.center()), (2, 2));
        assert_eq!(sim.field()[grid.center()], 1.0);

        sim.step().unwrap();
        let field = sim.field();
        assert!(grid.in_bounds_neighbors(grid.center()).any(|n| field[n] > 0.5));
        for id in (0..grid.total_cells()).filter(|&id| grid.is_border(id)) {
            assert_eq!(field[id], 0.5);
        }
    }

    #[test]
    fn border_stays_at_beta_and_freezing_is_monotonic() {
        let mut sim = engine(Backend::Sequential, 1);
        let grid = HexGrid::from_params(sim.params());
        let mut frozen_before: Vec<bool> = sim.field().iter().map(|&v| is_frozen(v)).collect();

        for _ in 0..60 {
            sim.step().unwrap();
            let field = sim.field();
            for id in 0..grid.total_cells() {
                if grid.is_border(id) {
                    assert_eq!(field[id], 0.5);
                }
                if frozen_before[id] {
                    assert!(is_frozen(field[id]), "cell {} un-froze", id);
                }
            }
            frozen_before = field.iter().map(|&v| is_frozen(v)).collect();
        }
        assert!(sim.frozen_count() > 1);
    }

    #[test]
    fn parallel_strategies_match_sequential_bit_for_bit() {
        for workers in [1, 2, 3, 5, 8] {
            let mut sequential = engine(Backend::Sequential, 1);
            let mut threaded = engine(Backend::Threaded, workers);
            let mut distributed = engine(Backend::Distributed, workers);
            assert_eq!(threaded.num_workers(), workers);
            assert_eq!(distributed.num_workers(), workers);

            for iteration in 0..50 {
                let s = sequential.step().unwrap();
                let t = threaded.step().unwrap();
                let d = distributed.step().unwrap();
                assert_eq!(s, t);
                assert_eq!(s, d);
                assert_eq!(sequential.field(), threaded.field(), "threaded diverged at {} with {} workers", iteration, workers);
                assert_eq!(sequential.field(), distributed.field(), "distributed diverged at {} with {} workers", iteration, workers);
            }
        }
    }

    #[test]
    fn single_worker_partition_matches_sequential() {
        let cfg = config(10, 9, Backend::Sequential, 1);
        let params = cfg.get_sim_params();
        let one = || plan_with_hops(params.total_cells(), 1, params.width, UPDATE_HOPS);

        let mut reference = ReiterSimulation::with_strategy(cfg.clone(), one(), Box::new(SequentialStrategy::new()));
        let mut threaded = ReiterSimulation::with_strategy(cfg.clone(), one(), Box::new(ThreadedStrategy::new(Some(2)).unwrap()));
        let mut distributed =
            ReiterSimulation::with_strategy(cfg, one(), Box::new(DistributedStrategy::spawn(&one()).unwrap()));

        for _ in 0..25 {
            reference.step().unwrap();
            threaded.step().unwrap();
            distributed.step().unwrap();
            assert_eq!(reference.field(), threaded.field());
            assert_eq!(reference.field(), distributed.field());
        }
    }

    #[test]
    fn run_halts_within_ceiling_plus_one() {
        let mut cfg = config(15, 15, Backend::Sequential, 1);
        cfg.run.max_iterations = 7;
        cfg.run.stability_patience = 1_000;
        let mut sim = ReiterSimulation::new(cfg).unwrap();

        let mut seen = Vec::new();
        let mut observer = |iteration: usize, _: &[f32], is_final: bool| -> Result<()> {
            seen.push((iteration, is_final));
            Ok(())
        };
        let outcome = sim.run(&mut observer).unwrap();

        assert_eq!(outcome.reason, StopReason::IterationCeiling);
        assert_eq!(outcome.iterations, 8);
        assert_eq!(seen.first(), Some(&(0, false)));
        assert_eq!(seen.last(), Some(&(8, true)));
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn run_stops_on_stable_receptive_set() {
        // Without a freezing increment nothing ever crosses the threshold.
        let mut cfg = config(9, 9, Backend::Sequential, 1);
        cfg.params.gamma = 0.0;
        cfg.params.alpha = 0.0;
        let mut sim = ReiterSimulation::new(cfg).unwrap();
        let mut ignore = |_: usize, _: &[f32], _: bool| -> Result<()> { Ok(()) };
        let outcome = sim.run(&mut ignore).unwrap();
        assert_eq!(outcome.reason, StopReason::Stable);
        assert_eq!(outcome.iterations, 1);
    }

    #[test]
    fn snapshots_are_recorded_at_interval_and_at_the_end() {
        let mut cfg = config(9, 9, Backend::Threaded, 2);
        cfg.run.max_iterations = 9;
        cfg.run.stability_patience = 1_000;
        cfg.output.record_interval = 4;
        let mut sim = ReiterSimulation::new(cfg).unwrap();
        let mut ignore = |_: usize, _: &[f32], _: bool| -> Result<()> { Ok(()) };
        sim.run(&mut ignore).unwrap();

        let iterations: Vec<usize> = sim.get_recorded_snapshots().iter().map(|s| s.iteration).collect();
        assert_eq!(iterations, vec![0, 4, 8, 10]);
        let last = sim.get_recorded_snapshots().last().unwrap();
        assert_eq!(last.values.len(), 81);
        assert_eq!(last.frozen_cells, sim.frozen_count());
    }
}
