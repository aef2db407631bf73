//! Render a scene (or a point source) through a simulated aperture plate
//!
//! The camera and aperture come from a JSON job file, or from a camera preset
//! and a pinhole diameter given on the command line. The render runs on the
//! background worker with a progress bar and the result is written as PNG.
//!
//! Usage:
//! ```
//! cargo run --release --bin aperture_render -- --preset nikon_z --pinhole 0.3 \
//!     --source scene.jpg --output out.png
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use simulator::hardware::camera::models;
use simulator::physics::{
    auto_optimize, calculate_physics, optimize_double_slit, pinhole_exposure, ReferenceExposure,
};
use simulator::shared_args::SharedRenderArgs;
use simulator::sims::{MaskSource, SimulationEvent, SimulationRequest, SimulationWorker};
use simulator::{ApertureSpec, CameraSpec};

/// Camera and aperture description loaded from JSON
#[derive(Deserialize, Debug)]
struct RenderJob {
    camera: CameraSpec,
    aperture: ApertureSpec,
    #[serde(default)]
    diffraction_blur_hint_mm: Option<f64>,
}

#[derive(Parser, Debug)]
#[command(
    name = "Aperture Render",
    about = "Simulates an image taken through a pinhole or coded aperture",
    long_about = None
)]
struct Args {
    #[command(flatten)]
    shared: SharedRenderArgs,

    /// JSON job file with "camera" and "aperture" objects
    #[arg(long, conflicts_with_all = ["preset", "pinhole"])]
    job: Option<PathBuf>,

    /// Camera body preset id (see --list-presets)
    #[arg(long, default_value = "nikon_z")]
    preset: String,

    /// Aperture-to-sensor distance in mm (defaults to the preset's)
    #[arg(long)]
    focal_length: Option<f64>,

    /// Centre wavelength in nm
    #[arg(long)]
    wavelength: Option<f64>,

    /// Camera ISO
    #[arg(long)]
    iso: Option<f64>,

    /// Pinhole diameter in mm
    #[arg(long, default_value_t = 0.3)]
    pinhole: f64,

    /// Resize the aperture to the Rayleigh optimum before rendering
    #[arg(long, default_value_t = false)]
    auto_optimize: bool,

    /// Replace the aperture with a double slit tuned for this camera
    #[arg(long, default_value_t = false)]
    double_slit: bool,

    /// Scene image; a point source is rendered when omitted
    #[arg(long)]
    source: Option<PathBuf>,

    /// Mask image for CUSTOM apertures
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Output PNG path
    #[arg(long, default_value = "aperture_render.png")]
    output: PathBuf,

    /// Reference exposure "f-number,seconds,iso" to translate to the pinhole
    #[arg(long, value_parser = parse_reference)]
    reference: Option<ReferenceExposure>,

    /// Print the closed-form optics summary as JSON and exit
    #[arg(long, default_value_t = false)]
    summary_only: bool,

    /// List camera presets and exit
    #[arg(long, default_value_t = false)]
    list_presets: bool,
}

/// Parse a reference exposure in format "f-number,seconds,iso"; seconds may be a fraction like 1/125
fn parse_reference(s: &str) -> Result<ReferenceExposure, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err("Reference must be in format 'f-number,seconds,iso'".to_string());
    }
    let number = |v: &str, what: &str| {
        v.parse::<f64>()
            .map_err(|_| format!("Invalid {what} value '{v}'"))
    };
    let f_number = number(parts[0], "f-number")?;
    let time_s = match parts[1].split_once('/') {
        Some((num, den)) => number(num, "time")? / number(den, "time")?,
        None => number(parts[1], "time")?,
    };
    let iso = number(parts[2], "ISO")?;
    Ok(ReferenceExposure::new(f_number, time_s, iso))
}

fn build_job(args: &Args) -> Result<RenderJob> {
    if let Some(path) = &args.job {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {}", path.display()))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse job file: {}", path.display()));
    }

    let Some(preset) = models::find(&args.preset) else {
        bail!("Unknown camera preset '{}'", args.preset);
    };
    let mut camera = CameraSpec::from_preset(preset);
    if let Some(f) = args.focal_length {
        camera = camera.with_focal_length(f);
    }
    if let Some(wavelength) = args.wavelength {
        camera = camera.with_wavelength(wavelength);
    }
    if let Some(iso) = args.iso {
        camera = camera.with_iso(iso);
    }

    Ok(RenderJob {
        camera,
        aperture: ApertureSpec::pinhole(args.pinhole),
        diffraction_blur_hint_mm: None,
    })
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_presets {
        for preset in models::ALL.iter() {
            println!(
                "{:<16} {:<28} {:>6.1} x {:<6.1} mm  flange {:.2} mm",
                preset.id,
                preset.name,
                preset.sensor_width_mm,
                preset.sensor_height_mm,
                preset.flange_distance_mm
            );
        }
        return Ok(());
    }

    let mut job = build_job(&args)?;
    if args.auto_optimize {
        job.aperture = auto_optimize(&job.aperture, &job.camera);
    }
    if args.double_slit {
        job.aperture = optimize_double_slit(&job.aperture, &job.camera);
    }

    let summary = calculate_physics(&job.camera, &job.aperture);
    if args.summary_only {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "{} {:.3} mm at f={} mm: f/{:.0}, T/{:.0}, blur {:.3} mm (optimum {:.3} mm)",
        job.aperture.kind.name(),
        job.aperture.diameter_mm,
        job.camera.focal_length_mm,
        summary.f_number,
        summary.t_stop,
        summary.total_blur_mm,
        summary.optimal_diameter_mm
    );
    if let Some(reference) = &args.reference {
        let exposure = pinhole_exposure(reference, &job.camera, &summary)?;
        println!("Pinhole exposure: {}", exposure.time_display);
        if let Some(corrected) = &exposure.reciprocity_display {
            println!("With reciprocity failure: {corrected}");
        }
        if let Some(warning) = exposure.warning {
            println!("{warning}");
        }
    }

    let mut request = SimulationRequest::new(job.camera, job.aperture)
        .with_options(args.shared.render_options());
    request.exposure_ev = args.shared.exposure_ev;
    request.point_source_intensity = args.shared.point_source_intensity;
    request.diffraction_blur_hint_mm = job.diffraction_blur_hint_mm;
    if let Some(path) = &args.source {
        let source = image::open(path)
            .with_context(|| format!("Failed to open source image: {}", path.display()))?;
        request.source_image = Some(source.to_rgba8());
    }
    if let Some(path) = &args.mask {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read mask image: {}", path.display()))?;
        request.mask = Some(MaskSource::Encoded(bytes));
    }

    let config = args
        .shared
        .simulation_config()
        .context("Failed to load simulation config")?;
    let mut worker = SimulationWorker::new(config);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:32} [{bar:40.cyan/blue}] {pos}% ({elapsed})")?
            .progress_chars("█▉▊▋▌▍▎▏ "),
    );

    let event = worker.run_blocking(request, &mut |label, percent| {
        pb.set_message(label.to_string());
        pb.set_position(percent.round() as u64);
    })?;

    match event {
        SimulationEvent::Completed(output) => {
            pb.finish_with_message(format!("Done ({})", output.method));
            if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            output
                .image
                .save(&args.output)
                .with_context(|| format!("Failed to write {}", args.output.display()))?;
            println!("Wrote {}", args.output.display());
            Ok(())
        }
        SimulationEvent::Failed { error } => {
            pb.abandon_with_message("Failed");
            bail!("Simulation failed: {error}")
        }
        SimulationEvent::Progress { .. } => bail!("Simulation ended without a result"),
    }
}
