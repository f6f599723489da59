use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use skycam_hw::{
    CameraId, ChipInfo, Control, ExposureSettings, FirmwareVersion, NativeSdk, OverscanArea,
    QhySdk, SdkVersion, Session, SkycamConfig,
};

#[derive(Parser)]
#[command(name = "skycam", about = "QHYCCD single-frame capture")]
struct Cli {
    /// Configuration file (defaults to $SKYCAM_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the vendor SDK version
    Version,
    /// Find a camera and report its geometry and current settings
    Probe {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Expose one frame and write it as a grayscale PNG
    Capture {
        /// Exposure time in microseconds
        #[arg(short, long)]
        exposure_us: Option<f64>,
        #[arg(short, long)]
        gain: Option<f64>,
        #[arg(long)]
        offset: Option<f64>,
        /// Symmetric binning factor (1-4)
        #[arg(short, long)]
        bin: Option<u32>,
        /// Transfer bit depth (8 or 16)
        #[arg(long)]
        bits: Option<u32>,
        /// Output file (default: capture_<UTC timestamp>.png)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct ProbeReport {
    sdk_version: SdkVersion,
    camera: CameraId,
    chip: ChipInfo,
    overscan: OverscanArea,
    firmware: Option<FirmwareVersion>,
    gain: f64,
    offset: f64,
    exposure_us: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let sdk = NativeSdk::load(config.sdk_library.as_deref()).context("failed to load QHYCCD SDK")?;

    match cli.command {
        Commands::Version => {
            println!("{}", sdk.version());
        }
        Commands::Probe { json } => {
            let report = probe(sdk, config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Capture {
            exposure_us,
            gain,
            offset,
            bin,
            bits,
            out,
        } => {
            let mut settings = config.capture;
            if let Some(v) = exposure_us {
                settings.exposure_us = v;
            }
            if let Some(v) = gain {
                settings.gain = v;
            }
            if let Some(v) = offset {
                settings.offset = v;
            }
            if let Some(v) = bin {
                settings.bin_x = v;
                settings.bin_y = v;
            }
            if let Some(v) = bits {
                settings.bit_depth = v;
            }
            let out = out.unwrap_or_else(default_capture_path);
            capture(sdk, config, &settings, &out)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SkycamConfig> {
    match path {
        Some(path) => {
            let mut config = SkycamConfig::from_file(path)?;
            config.apply_env();
            Ok(config)
        }
        None => Ok(SkycamConfig::load()?),
    }
}

fn default_capture_path() -> PathBuf {
    PathBuf::from(
        chrono::Utc::now()
            .format("capture_%Y%m%d_%H%M%S.png")
            .to_string(),
    )
}

fn probe(sdk: NativeSdk, config: SkycamConfig) -> Result<ProbeReport> {
    let sdk_version = sdk.version();
    let (session, id) = Session::discover(sdk, config).context("camera discovery failed")?;
    let report = {
        let camera = session.connect(&id)?;
        camera.initialize()?;
        let chip = camera.chip_info()?;
        let firmware = match camera.firmware_version() {
            Ok(fw) => Some(fw),
            Err(e) => {
                tracing::warn!(error = %e, "firmware version unavailable");
                None
            }
        };
        let report = ProbeReport {
            sdk_version,
            camera: id.clone(),
            chip,
            overscan: camera.overscan_area(),
            firmware,
            gain: camera.param(Control::Gain),
            offset: camera.param(Control::Offset),
            exposure_us: camera.param(Control::Exposure),
        };
        camera.disconnect().context("failed to close camera")?;
        report
    };
    session.release().context("failed to release SDK resources")?;
    Ok(report)
}

fn print_report(r: &ProbeReport) {
    println!("SDK:        {}", r.sdk_version);
    println!("Camera:     {} ({})", r.camera, r.camera.model());
    match &r.firmware {
        Some(fw) => println!("Firmware:   {fw}"),
        None => println!("Firmware:   unknown"),
    }
    println!(
        "Sensor:     {}x{} px, {:.2}x{:.2} mm, {:.2}x{:.2} um pixels, {} bit",
        r.chip.image_width,
        r.chip.image_height,
        r.chip.chip_width_mm,
        r.chip.chip_height_mm,
        r.chip.pixel_width_um,
        r.chip.pixel_height_um,
        r.chip.bits_per_pixel,
    );
    println!(
        "Overscan:   {}x{} at ({}, {})",
        r.overscan.width, r.overscan.height, r.overscan.x, r.overscan.y
    );
    println!("Gain:       {}", r.gain);
    println!("Offset:     {}", r.offset);
    println!("Exposure:   {} us", r.exposure_us);
}

fn capture(
    sdk: NativeSdk,
    config: SkycamConfig,
    settings: &ExposureSettings,
    out: &Path,
) -> Result<()> {
    let (session, id) = Session::discover(sdk, config).context("camera discovery failed")?;
    {
        let camera = session.connect(&id)?;
        camera.initialize()?;
        camera.apply(settings).context("failed to apply exposure settings")?;

        println!("Exposing {} for {} us...", id, settings.exposure_us);
        let frame = camera.capture_frame()?;
        println!(
            "  {}x{} {}-bit, mean level {:.1}",
            frame.width,
            frame.height,
            frame.bits_per_pixel,
            frame.mean_level()
        );

        frame
            .to_image()?
            .save(out)
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("Saved {}", out.display());

        camera.disconnect().context("failed to close camera")?;
    }
    session.release().context("failed to release SDK resources")?;
    Ok(())
}
