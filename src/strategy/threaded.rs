use anyhow::{Context, Result};
use log::debug;
use rayon::prelude::*;

use super::ConcurrencyStrategy;
use crate::exchange::{gather_owned_chunk, owned_chunks_mut, scatter_view, update_owned, Exchange};
use crate::update::UpdateRule;

/// Shared-memory strategy: one Rayon task per partition.
///
/// Tasks write only their own output buffer and, during gather, only their
/// own disjoint chunk of `current`. Every phase joins before returning.
pub struct ThreadedStrategy {
    pool: Option<rayon::ThreadPool>,
}

impl ThreadedStrategy {
    /// Uses a dedicated pool of `threads` threads, or the global Rayon pool.
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let pool = match threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("reiter-rayon-{}", i))
                    .build()
                    .context("Failed to build Rayon thread pool")?;
                debug!("Threaded strategy using a dedicated pool of {} threads.", n);
                Some(pool)
            }
            None => None,
        };
        Ok(Self { pool })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl ConcurrencyStrategy for ThreadedStrategy {
    fn name(&self) -> &'static str {
        "threaded"
    }

    fn scatter(&mut self, exchange: &mut Exchange, previous: &[f32]) -> Result<()> {
        let Exchange { partitions, views, .. } = exchange;
        self.install(|| {
            partitions
                .par_iter()
                .zip(views.par_iter_mut())
                .for_each(|(part, view)| scatter_view(part, previous, view));
        });
        Ok(())
    }

    fn local_update(&mut self, exchange: &mut Exchange, rule: &UpdateRule) -> Result<()> {
        let Exchange { partitions, views, outputs } = exchange;
        self.install(|| {
            partitions
                .par_iter()
                .zip(views.par_iter())
                .zip(outputs.par_iter_mut())
                .for_each(|((part, view), output)| update_owned(rule, part, view, output));
        });
        Ok(())
    }

    fn gather(&mut self, exchange: &mut Exchange, current: &mut [f32]) -> Result<()> {
        let Exchange { partitions, outputs, .. } = exchange;
        let chunks = owned_chunks_mut(partitions, current);
        self.install(|| {
            chunks
                .into_par_iter()
                .zip(outputs.par_iter())
                .for_each(|(chunk, output)| gather_owned_chunk(output, chunk));
        });
        Ok(())
    }
}
