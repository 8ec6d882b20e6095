pub mod config;
pub mod layout;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use config::{Backend, DumpCadence, DumpFormat, GridConfig, ModelConfig, OutputConfig, RunConfig, SimulationConfig};
pub use layout::TileLayout;
pub use sim_params::SimParams;
pub use snapshot::{read_snapshot_stream, write_snapshot_stream, Snapshot};
