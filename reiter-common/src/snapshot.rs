use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// A snapshot of the field and growth metrics after a given iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of completed update passes when the snapshot was taken.
    pub iteration: usize,
    pub width: usize,
    pub height: usize,
    /// Cells whose value has reached the freezing threshold.
    pub frozen_cells: usize,
    /// Interior cells that are frozen or touch frozen structure.
    pub receptive_cells: usize,
    /// Row-major cell values.
    pub values: Vec<f32>,
}

impl Snapshot {
    pub fn value_at(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.width + col]
    }
}

/// Writes snapshots as a bincode stream: a `u32` count followed by each snapshot.
pub fn write_snapshot_stream<W: Write>(mut writer: W, snapshots: &[Snapshot]) -> Result<()> {
    let count = u32::try_from(snapshots.len()).context("Too many snapshots for the stream header")?;
    bincode::serialize_into(&mut writer, &count).context("Failed to write snapshot count")?;
    for snapshot in snapshots {
        bincode::serialize_into(&mut writer, snapshot)
            .with_context(|| format!("Failed to write snapshot for iteration {}", snapshot.iteration))?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a stream produced by [`write_snapshot_stream`].
pub fn read_snapshot_stream<R: Read>(mut reader: R) -> Result<Vec<Snapshot>> {
    let count: u32 = bincode::deserialize_from(&mut reader)
        .context("Failed to read snapshot count from header")?;
    let mut snapshots = Vec::with_capacity(count as usize);
    for i in 0..count {
        let snapshot: Snapshot = bincode::deserialize_from(&mut reader)
            .with_context(|| format!("Failed to read snapshot {} of {}", i, count))?;
        snapshots.push(snapshot);
    }
    Ok(snapshots)
}
