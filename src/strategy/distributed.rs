use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, trace, warn};

use super::ConcurrencyStrategy;
use crate::exchange::{gather_owned, update_owned, Exchange};
use crate::partition::Partition;
use crate::update::UpdateRule;

/// How often a blocked collective checks whether a worker has died.
const LIVENESS_POLL: Duration = Duration::from_millis(50);

/// Messages from the coordinator to one worker.
enum WorkerMsg {
    /// Padded slice of the global field for the next pass.
    Scatter { view: Vec<f32> },
    /// Compute the owned span into `output`.
    Update { rule: UpdateRule, output: Vec<f32> },
    /// Return both buffers to the coordinator.
    Gather,
    Shutdown,
}

/// Messages from a worker back to the coordinator.
enum WorkerReply {
    Received { rank: usize },
    Updated { rank: usize },
    Gathered { rank: usize, view: Vec<f32>, output: Vec<f32> },
    Failed { rank: usize, reason: String },
}

struct WorkerHandle {
    rank: usize,
    tx: Sender<WorkerMsg>,
    join: Option<JoinHandle<()>>,
}

/// Message-passing strategy with one long-lived worker per partition.
///
/// Workers share no memory with the coordinator or with each other: every
/// byte a worker reads arrives in a `Scatter` message and every byte it
/// produces leaves in a `Gathered` reply. Each phase is a blocking
/// collective, and losing any worker aborts the run.
pub struct DistributedStrategy {
    workers: Vec<WorkerHandle>,
    replies: Receiver<WorkerReply>,
}

impl DistributedStrategy {
    /// Starts one worker thread per partition.
    pub fn spawn(partitions: &[Partition]) -> Result<Self> {
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded();
        let mut workers = Vec::with_capacity(partitions.len());

        for part in partitions {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let replies = reply_tx.clone();
            let part = *part;
            let join = std::thread::Builder::new()
                .name(format!("reiter-worker-{}", part.rank))
                .spawn(move || worker_loop(part, rx, replies))
                .with_context(|| format!("Failed to spawn worker {}", part.rank))?;
            workers.push(WorkerHandle { rank: part.rank, tx, join: Some(join) });
        }
        debug!("Distributed strategy started {} workers.", workers.len());

        Ok(Self { workers, replies: reply_rx })
    }

    fn send(&self, rank: usize, msg: WorkerMsg) -> Result<()> {
        self.workers[rank]
            .tx
            .send(msg)
            .map_err(|_| anyhow::anyhow!("Worker {} is unreachable.", rank))
    }

    /// Blocks until every worker has replied once, returning the replies by rank.
    fn collect(&self, phase: &str) -> Result<Vec<WorkerReply>> {
        let mut slots: Vec<Option<WorkerReply>> = (0..self.workers.len()).map(|_| None).collect();
        let mut pending = self.workers.len();

        while pending > 0 {
            match self.replies.recv_timeout(LIVENESS_POLL) {
                Ok(WorkerReply::Failed { rank, reason }) => {
                    anyhow::bail!("Worker {} failed during {}: {}", rank, phase, reason);
                }
                Ok(reply) => {
                    let rank = reply_rank(&reply);
                    if slots[rank].replace(reply).is_some() {
                        anyhow::bail!("Worker {} replied twice during {}.", rank, phase);
                    }
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(dead) = self.workers.iter().find(|w| w.join.as_ref().map_or(true, |j| j.is_finished())) {
                        anyhow::bail!("Worker {} exited during {}.", dead.rank, phase);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    anyhow::bail!("All workers disconnected during {}.", phase);
                }
            }
        }
        trace!("Collective '{}' completed.", phase);
        Ok(slots.into_iter().flatten().collect())
    }

    #[cfg(test)]
    fn kill_worker(&mut self, rank: usize) {
        let worker = &mut self.workers[rank];
        let _ = worker.tx.send(WorkerMsg::Shutdown);
        if let Some(join) = worker.join.take() {
            let _ = join.join();
        }
    }
}

fn reply_rank(reply: &WorkerReply) -> usize {
    match reply {
        WorkerReply::Received { rank }
        | WorkerReply::Updated { rank }
        | WorkerReply::Gathered { rank, .. }
        | WorkerReply::Failed { rank, .. } => *rank,
    }
}

impl ConcurrencyStrategy for DistributedStrategy {
    fn name(&self) -> &'static str {
        "distributed"
    }

    fn scatter(&mut self, exchange: &mut Exchange, previous: &[f32]) -> Result<()> {
        if exchange.num_workers() != self.workers.len() {
            anyhow::bail!(
                "Exchange has {} partitions but {} workers are running.",
                exchange.num_workers(),
                self.workers.len()
            );
        }
        for (part, view) in exchange.partitions.iter().zip(exchange.views.iter_mut()) {
            let mut buffer = std::mem::take(view);
            buffer.copy_from_slice(&previous[part.view_range()]);
            self.send(part.rank, WorkerMsg::Scatter { view: buffer })?;
        }
        self.collect("scatter")?;
        Ok(())
    }

    fn local_update(&mut self, exchange: &mut Exchange, rule: &UpdateRule) -> Result<()> {
        for (part, output) in exchange.partitions.iter().zip(exchange.outputs.iter_mut()) {
            let output = std::mem::take(output);
            self.send(part.rank, WorkerMsg::Update { rule: *rule, output })?;
        }
        self.collect("update")?;
        Ok(())
    }

    fn gather(&mut self, exchange: &mut Exchange, current: &mut [f32]) -> Result<()> {
        for worker in &self.workers {
            self.send(worker.rank, WorkerMsg::Gather)?;
        }
        for reply in self.collect("gather")? {
            let WorkerReply::Gathered { rank, view, output } = reply else {
                anyhow::bail!("Unexpected reply during gather.");
            };
            let part = exchange.partitions[rank];
            gather_owned(&part, &output, current);
            exchange.views[rank] = view;
            exchange.outputs[rank] = output;
        }
        exchange.check_sizes()
    }
}

impl Drop for DistributedStrategy {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.tx.send(WorkerMsg::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(join) = worker.join.take() {
                if join.join().is_err() {
                    warn!("Worker {} panicked before shutdown.", worker.rank);
                }
            }
        }
    }
}

/// Body of a worker: owns only what the coordinator last sent it.
fn worker_loop(part: Partition, rx: Receiver<WorkerMsg>, replies: Sender<WorkerReply>) {
    let rank = part.rank;
    let mut view: Option<Vec<f32>> = None;
    let mut output: Option<Vec<f32>> = None;

    while let Ok(msg) = rx.recv() {
        let reply = match msg {
            WorkerMsg::Scatter { view: received } => {
                if received.len() != part.view_len() {
                    WorkerReply::Failed {
                        rank,
                        reason: format!("view of {} cells, expected {}", received.len(), part.view_len()),
                    }
                } else {
                    view = Some(received);
                    WorkerReply::Received { rank }
                }
            }
            WorkerMsg::Update { rule, output: mut buffer } => match &view {
                Some(v) if buffer.len() == part.count => {
                    update_owned(&rule, &part, v, &mut buffer);
                    output = Some(buffer);
                    WorkerReply::Updated { rank }
                }
                Some(_) => WorkerReply::Failed {
                    rank,
                    reason: format!("output of {} cells, expected {}", buffer.len(), part.count),
                },
                None => WorkerReply::Failed { rank, reason: "update before scatter".to_string() },
            },
            WorkerMsg::Gather => match (view.take(), output.take()) {
                (Some(view), Some(output)) => WorkerReply::Gathered { rank, view, output },
                _ => WorkerReply::Failed { rank, reason: "gather before update".to_string() },
            },
            WorkerMsg::Shutdown => break,
        };
        if replies.send(reply).is_err() {
            break;
        }
    }
    trace!("Worker {} stopped.", rank);
}
