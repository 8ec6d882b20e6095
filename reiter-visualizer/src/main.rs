use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};
use palette::{FromColor, Hsv, Srgb};
use plotters::prelude::*;
use rayon::prelude::*;
use reiter_common::{read_snapshot_stream, Snapshot, TileLayout};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Tiles narrower than this are filled as rectangles, a hexagon would collapse.
const MIN_HEX_PIXELS: u32 = 4;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot stream (.bin) written by the engine
    #[arg(short, long)]
    input: PathBuf,

    /// Directory receiving frame_<n>.png and growth.png
    #[arg(short, long, default_value = "frames")]
    output_dir: PathBuf,

    /// Width of one cell in pixels
    #[arg(long, default_value_t = 4)]
    pixels_per_cell: u32,

    /// Background color - name of the color for the background
    #[arg(long, default_value = "black")]
    bg_color: String,

    /// Chunk size for parallel processing
    #[arg(long, default_value_t = 10)]
    chunk_size: usize,

    /// Do not draw the growth chart
    #[arg(long)]
    skip_chart: bool,
}

// Color definitions for named colors (RGBA format)
const COLOR_MAP: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("gray", [128, 128, 128, 255]),
    ("navy", [0, 0, 128, 255]),
];

/// Parse a color name to RGBA values
fn parse_color(color_name: &str) -> [u8; 4] {
    for &(name, color) in COLOR_MAP {
        if name.eq_ignore_ascii_case(color_name) {
            return color;
        }
    }
    warn!("Color '{}' not recognized, using black.", color_name);
    [0, 0, 0, 255]
}

fn hsv_to_rgba(hue: f32, saturation: f32, value: f32) -> Rgba<u8> {
    let rgb = Srgb::from_color(Hsv::new(hue, saturation, value));
    Rgba([
        (rgb.red * 255.0).round() as u8,
        (rgb.green * 255.0).round() as u8,
        (rgb.blue * 255.0).round() as u8,
        255,
    ])
}

/// Color of a cell value: a blue ramp below the freezing threshold,
/// an ice ramp fading to white above it.
fn cell_color(value: f32, max_value: f32) -> Rgba<u8> {
    if value < 1.0 {
        let t = value.clamp(0.0, 1.0);
        hsv_to_rgba(220.0, 0.9 - 0.3 * t, 0.25 + 0.45 * t)
    } else {
        let span = (max_value - 1.0).max(f32::EPSILON);
        let t = ((value - 1.0) / span).clamp(0.0, 1.0);
        hsv_to_rgba(190.0, 0.45 * (1.0 - t), 0.85 + 0.15 * t)
    }
}

/// Corners of the flat-topped hexagon inscribed in the tile of `(row, col)`.
fn hex_vertices(layout: &TileLayout, row: usize, col: usize) -> [Point<i32>; 6] {
    let (x0, y0) = layout.tile_origin(row, col);
    let (tile_w, tile_h) = layout.tile_size();
    let (x0, y0) = (x0 as i32, y0 as i32);
    // Last pixel column/row inside the tile.
    let right = tile_w as i32 - 1;
    let bottom = tile_h as i32 - 1;
    let inset = right / 4;
    let mid = bottom / 2;
    [
        Point::new(x0, y0 + mid),
        Point::new(x0 + inset, y0),
        Point::new(x0 + right - inset, y0),
        Point::new(x0 + right, y0 + mid),
        Point::new(x0 + right - inset, y0 + bottom),
        Point::new(x0 + inset, y0 + bottom),
    ]
}

/// Draw one snapshot as a hex mosaic.
fn draw_frame(snapshot: &Snapshot, pixels_per_cell: u32, bg_color: [u8; 4]) -> Result<RgbaImage> {
    if snapshot.values.len() != snapshot.width * snapshot.height {
        anyhow::bail!(
            "Snapshot {} holds {} values for a {}x{} grid.",
            snapshot.iteration,
            snapshot.values.len(),
            snapshot.width,
            snapshot.height
        );
    }
    let layout = TileLayout::try_new(snapshot.width, snapshot.height, pixels_per_cell)?;
    let mut image = ImageBuffer::from_pixel(layout.image_width(), layout.image_height(), Rgba(bg_color));
    let max_value = snapshot.values.iter().copied().fold(1.0f32, f32::max);
    let (tile_w, tile_h) = layout.tile_size();

    for row in 0..snapshot.height {
        for col in 0..snapshot.width {
            let color = cell_color(snapshot.value_at(row, col), max_value);
            if pixels_per_cell < MIN_HEX_PIXELS {
                let (x0, y0) = layout.tile_origin(row, col);
                draw_filled_rect_mut(&mut image, Rect::at(x0 as i32, y0 as i32).of_size(tile_w, tile_h), color);
            } else {
                draw_polygon_mut(&mut image, &hex_vertices(&layout, row, col), color);
            }
        }
    }
    Ok(image)
}

fn frame_path(output_dir: &Path, index: usize) -> PathBuf {
    output_dir.join(format!("frame_{:05}.png", index))
}

/// Frozen-cell count per recorded iteration.
fn growth_points(snapshots: &[Snapshot]) -> Vec<(u64, u64)> {
    snapshots
        .iter()
        .map(|s| (s.iteration as u64, s.frozen_cells as u64))
        .collect()
}

/// Plot the frozen-cell count against the iteration.
fn draw_growth_chart(snapshots: &[Snapshot], path: &Path) -> Result<()> {
    let points = growth_points(snapshots);
    let max_iteration = points.iter().map(|p| p.0).max().unwrap_or(0) + 1;
    let max_frozen = points.iter().map(|p| p.1).max().unwrap_or(0) + 1;

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow::anyhow!("Failed to clear chart: {}", e))?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Frozen cells", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0u64..max_iteration, 0u64..max_frozen)
        .map_err(|e| anyhow::anyhow!("Failed to build chart: {}", e))?;
    chart
        .configure_mesh()
        .x_desc("iteration")
        .y_desc("frozen cells")
        .draw()
        .map_err(|e| anyhow::anyhow!("Failed to draw chart axes: {}", e))?;
    chart
        .draw_series(LineSeries::new(points, &BLUE))
        .map_err(|e| anyhow::anyhow!("Failed to draw growth series: {}", e))?;
    root.present()
        .map_err(|e| anyhow::anyhow!("Failed to write chart '{}': {}", path.display(), e))?;
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    let args = Args::parse();
    run_with_args(&args)
}

fn run_with_args(args: &Args) -> Result<()> {
    info!("Starting Reiter Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output directory: {}", args.output_dir.display());
    if args.pixels_per_cell == 0 || args.chunk_size == 0 {
        anyhow::bail!("pixels_per_cell and chunk_size must be greater than 0.");
    }

    // --- Open and Parse Snapshot File ---
    let input_file = File::open(&args.input)
        .with_context(|| format!("Failed to open input file: {}", args.input.display()))?;
    let snapshots = read_snapshot_stream(BufReader::new(input_file))
        .with_context(|| format!("Failed to read snapshot stream: {}", args.input.display()))?;
    info!("Found {} snapshots in the file", snapshots.len());

    if snapshots.is_empty() {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    }
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", args.output_dir.display()))?;

    let bg_color = parse_color(&args.bg_color);

    // Set up progress bar
    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    snapshots
        .par_chunks(args.chunk_size)
        .enumerate()
        .try_for_each(|(chunk_idx, chunk)| -> Result<()> {
            for (i, snapshot) in chunk.iter().enumerate() {
                let index = chunk_idx * args.chunk_size + i;
                let path = frame_path(&args.output_dir, index);
                draw_frame(snapshot, args.pixels_per_cell, bg_color)?
                    .save(&path)
                    .with_context(|| format!("Failed to write frame {}", path.display()))?;
                progress_bar.inc(1);
            }
            Ok(())
        })?;
    progress_bar.finish_with_message("Frames written");

    let duration = start_time.elapsed();
    info!(
        "Rendered {} frames in {:.2?} ({:.1} frames per second)",
        snapshots.len(),
        duration,
        snapshots.len() as f64 / duration.as_secs_f64().max(f64::EPSILON)
    );

    if !args.skip_chart {
        let chart_path = args.output_dir.join("growth.png");
        // A missing system font must not cost the frames already written.
        match draw_growth_chart(&snapshots, &chart_path) {
            Ok(()) => info!("Growth chart saved to {}", chart_path.display()),
            Err(e) => warn!("Skipping growth chart: {}", e),
        }
    }

    Ok(())
}
