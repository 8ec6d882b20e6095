use crate::simulation::{RunOutcome, StateObserver};
use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use log::{debug, error, info};
use reiter_common::{write_snapshot_stream, DumpCadence, DumpFormat, SimulationConfig, Snapshot, TileLayout};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes field states to disk as text tables and/or images.
///
/// Which states are written is decided by the configured cadence:
/// `every` writes the seeded field and the result of every pass, `last`
/// writes only the final field.
#[derive(Debug, Clone)]
pub struct DumpSink {
    format: DumpFormat,
    cadence: DumpCadence,
    directory: PathBuf,
    base_filename: String,
    layout: TileLayout,
}

impl DumpSink {
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        let output = &config.output;
        let sink = DumpSink {
            format: output.dump_format,
            cadence: output.dump_cadence,
            directory: PathBuf::from(&output.directory),
            base_filename: output.base_filename.clone(),
            layout: TileLayout::new(config.grid.width, config.grid.height, output.pixels_per_cell),
        };
        if sink.is_enabled() {
            std::fs::create_dir_all(&sink.directory)
                .with_context(|| format!("Failed to create output directory '{}'", sink.directory.display()))?;
        }
        Ok(sink)
    }

    pub fn is_enabled(&self) -> bool {
        self.format != DumpFormat::None && self.cadence != DumpCadence::Never
    }

    fn wants(&self, is_final: bool) -> bool {
        match self.cadence {
            DumpCadence::Never => false,
            // The final call repeats the last pass, which was already written.
            DumpCadence::Every => !is_final,
            DumpCadence::Last => is_final,
        }
    }

    fn path_for(&self, iteration: usize, extension: &str) -> PathBuf {
        self.directory
            .join(format!("{}_{}.{}", self.base_filename, iteration, extension))
    }

    /// Writes the field for `iteration` in every enabled format.
    pub fn dump(&self, iteration: usize, field: &[f32]) -> Result<()> {
        if matches!(self.format, DumpFormat::Txt | DumpFormat::All) {
            let path = self.path_for(iteration, "txt");
            save_state_to_txt(field, self.layout.width, &path)?;
            debug!("Wrote text dump {}", path.display());
        }
        if matches!(self.format, DumpFormat::Img | DumpFormat::All) {
            let path = self.path_for(iteration, "png");
            save_state_to_img(field, &self.layout, &path)?;
            debug!("Wrote image dump {}", path.display());
        }
        Ok(())
    }
}

impl StateObserver for DumpSink {
    fn observe(&mut self, iteration: usize, field: &[f32], is_final: bool) -> Result<()> {
        if self.format == DumpFormat::None || !self.wants(is_final) {
            return Ok(());
        }
        self.dump(iteration, field)
    }
}

/// Writes the field as tab-separated rows, six decimals per value.
pub fn save_state_to_txt(field: &[f32], width: usize, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create text dump '{}'", path.display()))?;
    for row in field.chunks(width) {
        writer.write_record(row.iter().map(|v| format!("{:.6}", v)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Intensity of a cell value on the single rendered channel.
#[inline]
pub fn cell_intensity(value: f32) -> u8 {
    ((value / 10.0) * 255.0).clamp(0.0, 255.0) as u8
}

/// Renders the field as staggered rectangular tiles, intensity in the blue channel.
pub fn render_field_image(field: &[f32], layout: &TileLayout) -> RgbaImage {
    let mut image: RgbaImage = ImageBuffer::from_pixel(layout.image_width(), layout.image_height(), Rgba([0, 0, 0, 255]));
    let (tile_w, tile_h) = layout.tile_size();

    for row in 0..layout.height {
        for col in 0..layout.width {
            let value = field[row * layout.width + col];
            let pixel = Rgba([0, 0, cell_intensity(value), 255]);
            let (x0, y0) = layout.tile_origin(row, col);
            for y in y0..y0 + tile_h {
                for x in x0..x0 + tile_w {
                    image.put_pixel(x, y, pixel);
                }
            }
        }
    }
    image
}

pub fn save_state_to_img(field: &[f32], layout: &TileLayout, path: &Path) -> Result<()> {
    render_field_image(field, layout)
        .save(path)
        .with_context(|| format!("Failed to write image dump '{}'", path.display()))
}

/// Writes recorded snapshots in the configured format and returns the file written.
pub fn save_snapshots(config: &SimulationConfig, snapshots: &[Snapshot]) -> Result<PathBuf> {
    let output = &config.output;
    let directory = Path::new(&output.directory);
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create output directory '{}'", directory.display()))?;
    let output_format = output.format.as_deref().unwrap_or("bincode");

    let path = match output_format {
        "json" => {
            let path = directory.join(format!("{}_snapshots.json", output.base_filename));
            let file = File::create(&path)
                .with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, snapshots).context("Error serializing snapshots to JSON")?;
            writer
                .flush()
                .with_context(|| format!("Error writing snapshot file '{}'", path.display()))?;
            path
        }
        "messagepack" => {
            let path = directory.join(format!("{}_snapshots.msgpack", output.base_filename));
            let file = File::create(&path)
                .with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            rmp_serde::encode::write(&mut writer, snapshots).context("Error serializing snapshots to MessagePack")?;
            writer.flush()?;
            path
        }
        other => {
            if other != "bincode" {
                error!("Unknown output format: {}. Using bincode instead.", other);
            }
            let path = directory.join(format!("{}_snapshots.bin", output.base_filename));
            let file = File::create(&path)
                .with_context(|| format!("Error creating snapshot file '{}'", path.display()))?;
            write_snapshot_stream(BufWriter::new(file), snapshots)?;
            path
        }
    };
    info!("{} snapshots saved to {}", snapshots.len(), path.display());
    Ok(path)
}

/// Writes `iteration,frozen,receptive` for every recorded snapshot.
pub fn save_growth_curve(config: &SimulationConfig, snapshots: &[Snapshot]) -> Result<PathBuf> {
    let path = Path::new(&config.output.directory).join(format!("{}_growth.csv", config.output.base_filename));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Error creating growth file '{}'", path.display()))?;
    writer.write_record(["iteration", "frozen", "receptive"])?;
    for snapshot in snapshots {
        writer.write_record(&[
            snapshot.iteration.to_string(),
            snapshot.frozen_cells.to_string(),
            snapshot.receptive_cells.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(path)
}

/// Writes the run summary as pretty JSON.
pub fn save_summary(config: &SimulationConfig, outcome: &RunOutcome) -> Result<PathBuf> {
    let directory = Path::new(&config.output.directory);
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create output directory '{}'", directory.display()))?;
    let path = directory.join(format!("{}_summary.json", config.output.base_filename));
    let file = File::create(&path).with_context(|| format!("Error creating summary file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, outcome).context("Error serializing run summary")?;
    writer
        .flush()
        .with_context(|| format!("Error writing summary file '{}'", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::StopReason;
    use reiter_common::read_snapshot_stream;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("reiter_dump_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(dir: &Path, format: DumpFormat, cadence: DumpCadence) -> SimulationConfig {
        let text = format!(
            r#"
            [grid]
            width = 4
            height = 3

            [params]
            alpha = 1.0
            beta = 0.5
            gamma = 0.01

            [output]
            base_filename = "dump"
            directory = "{}"
            pixels_per_cell = 2
            "#,
            dir.display().to_string().replace('\\', "/")
        );
        let mut config = SimulationConfig::from_toml_str(&text).unwrap();
        config.output.dump_format = format;
        config.output.dump_cadence = cadence;
        config
    }

    fn field() -> Vec<f32> {
        (0..12).map(|i| i as f32 * 0.5).collect()
    }

    #[test]
    fn text_dump_is_tab_separated_rows() {
        let dir = test_dir("txt");
        let path = dir.join("state.txt");
        save_state_to_txt(&field(), 4, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "0.000000\t0.500000\t1.000000\t1.500000");
        assert_eq!(lines[2].split('\t').count(), 4);
    }

    #[test]
    fn image_tiles_follow_the_staggered_layout() {
        let layout = TileLayout::new(4, 3, 2);
        let image = render_field_image(&field(), &layout);
        assert_eq!(image.dimensions(), (8, 14));

        // (0, 1) holds 0.5 and sits one tile-half lower than (0, 0).
        assert_eq!(image.get_pixel(2, 2)[2], cell_intensity(0.5));
        assert_eq!(image.get_pixel(2, 0)[2], 0);
        assert_eq!(image.get_pixel(0, 0)[3], 255);
        assert_eq!(cell_intensity(10.0), 255);
        assert_eq!(cell_intensity(20.0), 255);
        assert_eq!(cell_intensity(-1.0), 0);
    }

    #[test]
    fn cadence_every_skips_the_repeated_final_state() {
        let dir = test_dir("every");
        let mut sink = DumpSink::from_config(&config(&dir, DumpFormat::Txt, DumpCadence::Every)).unwrap();
        sink.observe(0, &field(), false).unwrap();
        sink.observe(1, &field(), false).unwrap();
        sink.observe(1, &field(), true).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["dump_0.txt", "dump_1.txt"]);
    }

    #[test]
    fn cadence_last_writes_only_the_final_state() {
        let dir = test_dir("last");
        let mut sink = DumpSink::from_config(&config(&dir, DumpFormat::All, DumpCadence::Last)).unwrap();
        sink.observe(0, &field(), false).unwrap();
        sink.observe(5, &field(), true).unwrap();

        assert!(!dir.join("dump_0.txt").exists());
        assert!(dir.join("dump_5.txt").exists());
        assert!(dir.join("dump_5.png").exists());
    }

    fn outcome() -> RunOutcome {
        RunOutcome {
            iterations: 12,
            reason: StopReason::Stable,
            elapsed: std::time::Duration::from_millis(5),
            frozen_cells: 3,
            receptive_cells: 9,
        }
    }

    #[test]
    fn summary_is_written_as_json() {
        let dir = test_dir("summary");
        let cfg = config(&dir, DumpFormat::None, DumpCadence::Never);
        let path = save_summary(&cfg, &outcome()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["iterations"], 12);
        assert_eq!(json["reason"], "Stable");
    }

    #[cfg(unix)]
    #[test]
    fn full_disk_fails_the_summary_write() {
        let dir = test_dir("summary_full");
        let cfg = config(&dir, DumpFormat::None, DumpCadence::Never);
        std::os::unix::fs::symlink("/dev/full", dir.join("dump_summary.json")).unwrap();
        assert!(save_summary(&cfg, &outcome()).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn full_disk_fails_the_json_snapshot_write() {
        let dir = test_dir("snapshots_full");
        let mut cfg = config(&dir, DumpFormat::None, DumpCadence::Never);
        cfg.output.format = Some("json".to_string());
        std::os::unix::fs::symlink("/dev/full", dir.join("dump_snapshots.json")).unwrap();
        let snapshots = vec![Snapshot {
            iteration: 0,
            width: 4,
            height: 3,
            frozen_cells: 1,
            receptive_cells: 7,
            values: field(),
        }];
        assert!(save_snapshots(&cfg, &snapshots).is_err());
    }

    #[test]
    fn bincode_snapshots_are_readable_as_a_stream() {
        let dir = test_dir("snapshots");
        let cfg = config(&dir, DumpFormat::None, DumpCadence::Never);
        let snapshots = vec![Snapshot {
            iteration: 3,
            width: 4,
            height: 3,
            frozen_cells: 1,
            receptive_cells: 2,
            values: field(),
        }];
        let path = save_snapshots(&cfg, &snapshots).unwrap();
        let read_back = read_snapshot_stream(File::open(path).unwrap()).unwrap();
        assert_eq!(read_back, snapshots);

        let growth = save_growth_curve(&cfg, &snapshots).unwrap();
        let text = std::fs::read_to_string(growth).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["iteration,frozen,receptive", "3,1,2"]);
    }
}
