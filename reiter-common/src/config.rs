use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::layout::TileLayout;
use crate::sim_params::SimParams;
use std::path::Path;

// Grid dimensions, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
}

// Model parameters of the freezing rule
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelConfig {
    pub alpha: f32, // Diffusion rate
    pub beta: f32,  // Ambient background value (also the border value)
    pub gamma: f32, // Freezing increment added to receptive cells
}

/// Which concurrency strategy drives the update loop.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sequential,
    Threaded,
    Distributed,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Backend::Sequential),
            "threaded" => Ok(Backend::Threaded),
            "distributed" => Ok(Backend::Distributed),
            other => anyhow::bail!("Unknown backend '{}'. Expected sequential, threaded or distributed.", other),
        }
    }
}

// Run control
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RunConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    // Consecutive stable passes required before the run stops
    #[serde(default = "default_stability_patience")]
    pub stability_patience: usize,
    // Size of a dedicated rayon pool for the threaded backend (None = global pool)
    #[serde(default)]
    pub threads: Option<usize>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    None,
    Txt,
    Img,
    All,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpCadence {
    Never,
    Every,
    Last,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_directory")]
    pub directory: String,
    #[serde(default = "default_dump_format")]
    pub dump_format: DumpFormat,
    #[serde(default = "default_dump_cadence")]
    pub dump_cadence: DumpCadence,
    #[serde(default = "default_pixels_per_cell")]
    pub pixels_per_cell: u32,
    // Iterations between recorded snapshots (0 disables recording)
    #[serde(default)]
    pub record_interval: usize,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack"
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            backend: default_backend(),
            workers: default_workers(),
            max_iterations: default_max_iterations(),
            stability_patience: default_stability_patience(),
            threads: None,
        }
    }
}

fn default_backend() -> Backend {
    Backend::Sequential
}

fn default_workers() -> usize {
    1
}

fn default_max_iterations() -> usize {
    1000
}

fn default_stability_patience() -> usize {
    1
}

fn default_directory() -> String {
    ".".to_string()
}

fn default_dump_format() -> DumpFormat {
    DumpFormat::None
}

fn default_dump_cadence() -> DumpCadence {
    DumpCadence::Never
}

fn default_pixels_per_cell() -> u32 {
    4
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub params: ModelConfig,
    #[serde(default)]
    pub run: RunConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;

        Ok(config)
    }

    /// Builds a configuration from grid and model parameters alone, with every
    /// other section at its default. Used when no config file is present.
    pub fn with_model(width: usize, height: usize, alpha: f32, beta: f32, gamma: f32) -> Self {
        SimulationConfig {
            grid: GridConfig { width, height },
            params: ModelConfig { alpha, beta, gamma },
            run: RunConfig::default(),
            output: OutputConfig {
                base_filename: "reiter".to_string(),
                directory: default_directory(),
                dump_format: default_dump_format(),
                dump_cadence: default_dump_cadence(),
                pixels_per_cell: default_pixels_per_cell(),
                record_interval: 0,
                format: None,
            },
        }
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameters the engine cannot run with. The engine itself does not re-check them.
    pub fn validate(&self) -> Result<()> {
        if self.grid.width < 3 || self.grid.height < 3 {
            anyhow::bail!(
                "Grid must be at least 3x3, got {}x{}.",
                self.grid.width,
                self.grid.height
            );
        }
        if self.grid.width.checked_mul(self.grid.height).is_none() {
            anyhow::bail!("Grid {}x{} is too large.", self.grid.width, self.grid.height);
        }
        if !(0.0..1.0).contains(&self.params.beta) {
            anyhow::bail!("beta must lie in [0, 1), got {}.", self.params.beta);
        }
        if !self.params.alpha.is_finite() || !self.params.gamma.is_finite() {
            anyhow::bail!("alpha and gamma must be finite numbers.");
        }
        if self.run.workers == 0 {
            anyhow::bail!("workers must be greater than 0.");
        }
        if self.run.stability_patience == 0 {
            anyhow::bail!("stability_patience must be greater than 0.");
        }
        if self.run.threads == Some(0) {
            anyhow::bail!("threads must be greater than 0 when set.");
        }
        if self.output.pixels_per_cell == 0 {
            anyhow::bail!("pixels_per_cell must be greater than 0.");
        }
        if self.output.dump_format != DumpFormat::None {
            TileLayout::try_new(self.grid.width, self.grid.height, self.output.pixels_per_cell)?;
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        SimParams {
            width: self.grid.width,
            height: self.grid.height,
            alpha: self.params.alpha,
            beta: self.params.beta,
            gamma: self.params.gamma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [grid]
        width = 100
        height = 80

        [params]
        alpha = 1.0
        beta = 0.5
        gamma = 0.01

        [output]
        base_filename = "reiter"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = SimulationConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.run.backend, Backend::Sequential);
        assert_eq!(config.run.workers, 1);
        assert_eq!(config.run.max_iterations, 1000);
        assert_eq!(config.run.stability_patience, 1);
        assert_eq!(config.output.dump_format, DumpFormat::None);
        assert_eq!(config.output.dump_cadence, DumpCadence::Never);
        assert_eq!(config.output.pixels_per_cell, 4);

        let params = config.get_sim_params();
        assert_eq!(params.width, 100);
        assert_eq!(params.height, 80);
        assert_eq!(params.total_cells(), 8000);
    }

    #[test]
    fn run_section_parses_backend_names() {
        let text = format!("{}\n[run]\nbackend = \"distributed\"\nworkers = 3\n", MINIMAL);
        let config = SimulationConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.run.backend, Backend::Distributed);
        assert_eq!(config.run.workers, 3);
    }

    #[test]
    fn rejects_degenerate_grid() {
        let text = MINIMAL.replace("width = 100", "width = 2");
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn rejects_beta_out_of_range() {
        let text = MINIMAL.replace("beta = 0.5", "beta = 1.0");
        assert!(SimulationConfig::from_toml_str(&text).is_err());
        let text = MINIMAL.replace("beta = 0.5", "beta = -0.1");
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn rejects_image_dumps_that_overflow() {
        let mut config = SimulationConfig::with_model(100_000, 10, 1.0, 0.5, 0.01);
        config.output.pixels_per_cell = 50_000;
        config.validate().unwrap();
        config.output.dump_format = DumpFormat::Img;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_workers() {
        let text = format!("{}\n[run]\nworkers = 0\n", MINIMAL);
        assert!(SimulationConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn model_only_config_uses_defaults() {
        let config = SimulationConfig::with_model(10, 12, 1.0, 0.4, 0.001);
        config.validate().unwrap();
        assert_eq!(config.run.max_iterations, 1000);
        assert_eq!(config.output.dump_format, DumpFormat::None);
        assert_eq!(config.get_sim_params().total_cells(), 120);
    }

    #[test]
    fn backend_from_str_is_case_insensitive() {
        assert_eq!("Threaded".parse::<Backend>().unwrap(), Backend::Threaded);
        assert!("gpu".parse::<Backend>().is_err());
    }
}
