use std::path::PathBuf;

use clap::Args;

use crate::config::SimulationConfig;
use crate::optics::EngineMode;
use crate::sims::RenderOptions;

/// Parse an engine name: "geometric" or "wave" (case-insensitive)
fn parse_engine(s: &str) -> Result<EngineMode, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "geometric" | "geo" => Ok(EngineMode::Geometric),
        "wave" => Ok(EngineMode::Wave),
        other => Err(format!(
            "Unknown engine '{other}', expected 'geometric' or 'wave'"
        )),
    }
}

/// Render arguments shared across binaries
#[derive(Args, Debug, Clone)]
pub struct SharedRenderArgs {
    /// Output width in pixels (height follows the sensor aspect ratio)
    #[arg(long, default_value_t = 1024)]
    pub resolution: usize,

    /// Propagation engine: geometric or wave
    #[arg(long, default_value = "wave", value_parser = parse_engine)]
    pub engine: EngineMode,

    /// Sample five spectral bands for chromatic aberration
    #[arg(long, default_value_t = false)]
    pub chromatic: bool,

    /// Apply cos^4 vignetting
    #[arg(long, default_value_t = false)]
    pub vignetting: bool,

    /// Apply ISO-dependent luminance noise
    #[arg(long, default_value_t = false)]
    pub noise: bool,

    /// Seed for the sensor noise field
    #[arg(long)]
    pub seed: Option<u64>,

    /// Exposure compensation in stops
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub exposure_ev: f64,

    /// Brightness of the point source when no scene image is given
    #[arg(long, default_value_t = 10.0)]
    pub point_source_intensity: f64,

    /// JSON file with engine tuning overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use reduced wave grids for a quick preview
    #[arg(long, default_value_t = false)]
    pub preview: bool,
}

impl SharedRenderArgs {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            engine: self.engine,
            resolution: self.resolution,
            chromatic_aberration: self.chromatic,
            vignetting: self.vignetting,
            sensor_noise: self.noise,
            noise_seed: self.seed,
        }
    }

    /// Engine configuration: the config file if given, else defaults (or preview grids).
    pub fn simulation_config(&self) -> Result<SimulationConfig, std::io::Error> {
        match &self.config {
            Some(path) => SimulationConfig::load_from_file(path),
            None if self.preview => Ok(SimulationConfig::preview()),
            None => Ok(SimulationConfig::default()),
        }
    }
}
