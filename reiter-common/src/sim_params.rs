use serde::{Deserialize, Serialize};

/// Immutable parameters of one run, derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    // Grid
    pub width: usize,
    pub height: usize,

    // Model
    pub alpha: f32, // Diffusion rate
    pub beta: f32,  // Ambient value, also held by the border
    pub gamma: f32, // Freezing increment per pass for receptive cells
}

impl SimParams {
    pub fn total_cells(&self) -> usize {
        self.width * self.height
    }
}
