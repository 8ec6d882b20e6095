//! Concurrency strategies driving the scatter, local update and gather
//! phases of each iteration.
//!
//! The engine owns the field buffers and the [`Exchange`] scratch space; a
//! strategy only borrows them for the duration of a phase. All strategies
//! route every cell through [`UpdateRule::update_cell`], so they produce the
//! same field bit for bit for a given partition plan.

mod distributed;
mod sequential;
mod threaded;

pub use distributed::DistributedStrategy;
pub use sequential::SequentialStrategy;
pub use threaded::ThreadedStrategy;

use anyhow::Result;
use reiter_common::{Backend, RunConfig};

use crate::exchange::Exchange;
use crate::partition::Partition;
use crate::update::UpdateRule;

/// One way of distributing a pass across workers.
///
/// Each call is a barrier: when it returns, every worker has finished the
/// phase. A pass is always `scatter`, then `local_update`, then `gather`.
pub trait ConcurrencyStrategy: Send {
    fn name(&self) -> &'static str;

    /// Hands each worker its padded slice of `previous`.
    fn scatter(&mut self, exchange: &mut Exchange, previous: &[f32]) -> Result<()>;

    /// Runs the update rule over every worker's owned span.
    fn local_update(&mut self, exchange: &mut Exchange, rule: &UpdateRule) -> Result<()>;

    /// Collects every owned span into `current`, in partition order.
    fn gather(&mut self, exchange: &mut Exchange, current: &mut [f32]) -> Result<()>;
}

/// Number of partitions a backend splits the grid into.
pub fn worker_count(run: &RunConfig) -> usize {
    match run.backend {
        Backend::Sequential => 1,
        Backend::Threaded | Backend::Distributed => run.workers,
    }
}

/// Builds the strategy selected in the run configuration.
pub fn build_strategy(run: &RunConfig, partitions: &[Partition]) -> Result<Box<dyn ConcurrencyStrategy>> {
    let strategy: Box<dyn ConcurrencyStrategy> = match run.backend {
        Backend::Sequential => Box::new(SequentialStrategy::new()),
        Backend::Threaded => Box::new(ThreadedStrategy::new(run.threads)?),
        Backend::Distributed => Box::new(DistributedStrategy::spawn(partitions)?),
    };
    Ok(strategy)
}
