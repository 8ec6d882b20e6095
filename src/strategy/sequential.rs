use anyhow::Result;

use super::ConcurrencyStrategy;
use crate::exchange::{gather_owned, scatter_view, update_owned, Exchange};
use crate::update::UpdateRule;

/// Single-threaded reference strategy: walks the partitions in order.
#[derive(Debug, Default)]
pub struct SequentialStrategy;

impl SequentialStrategy {
    pub fn new() -> Self {
        SequentialStrategy
    }
}

impl ConcurrencyStrategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn scatter(&mut self, exchange: &mut Exchange, previous: &[f32]) -> Result<()> {
        for (part, view) in exchange.partitions.iter().zip(exchange.views.iter_mut()) {
            scatter_view(part, previous, view);
        }
        Ok(())
    }

    fn local_update(&mut self, exchange: &mut Exchange, rule: &UpdateRule) -> Result<()> {
        let slots = exchange.views.iter().zip(exchange.outputs.iter_mut());
        for (part, (view, output)) in exchange.partitions.iter().zip(slots) {
            update_owned(rule, part, view, output);
        }
        Ok(())
    }

    fn gather(&mut self, exchange: &mut Exchange, current: &mut [f32]) -> Result<()> {
        for (part, output) in exchange.partitions.iter().zip(&exchange.outputs) {
            gather_owned(part, output, current);
        }
        Ok(())
    }
}
