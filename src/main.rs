use std::{fs::File, path::PathBuf};

use clap::Parser;
use log::info;

use kinect_registration::{
    Calibration, CameraParams, ColorEncoding, Config, Error, Frame, FrameFormat, PcdWriter,
    Registration, COLOR_HEIGHT, COLOR_WIDTH, DEPTH_HEIGHT, DEPTH_WIDTH,
};

/// Register a captured Kinect v2 depth and color frame and export the point cloud.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Calibration of both cameras as JSON ({"ir": {...}, "color": {...}})
    #[arg(short, long)]
    calibration: PathBuf,
    /// Depth frame, 512x424 little endian f32 millimetres
    #[arg(short, long)]
    depth: PathBuf,
    /// Color frame, 1920x1080 pixels of 4 bytes
    #[arg(long)]
    color: PathBuf,
    /// Color frame byte order is RGBX instead of BGRX
    #[arg(long)]
    rgbx: bool,
    /// Registration settings as JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output point cloud
    #[arg(short, long, default_value = "output.pcd")]
    output: PathBuf,
    /// Write binary instead of ascii records
    #[arg(long)]
    binary: bool,
    /// Store colors as float bit patterns
    #[arg(long)]
    float_rgb: bool,
    /// Only write points with depth
    #[arg(long)]
    sparse: bool,
    /// Keep colors of pixels hidden from the color camera
    #[arg(long)]
    no_filter: bool,
    /// Also write the point cloud of depth in color space
    #[arg(long)]
    big_depth: Option<PathBuf>,
    #[arg(long)]
    undistorted_image: Option<PathBuf>,
    #[arg(long)]
    registered_image: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let args = Args::parse();

    let params = CameraParams::from_json(&tokio::fs::read_to_string(&args.calibration).await?)?;
    let mut config = match &args.config {
        Some(path) => Config::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => Config::default(),
    };
    config.enable_filter &= !args.no_filter;
    config.with_big_depth |= args.big_depth.is_some();

    let depth: Vec<f32> = tokio::fs::read(&args.depth)
        .await?
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let depth = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &depth)?;

    let color_format = if args.rgbx {
        FrameFormat::RGBX
    } else {
        FrameFormat::BGRX
    };
    let color = Frame::from_pixels(
        COLOR_WIDTH,
        COLOR_HEIGHT,
        color_format,
        tokio::fs::read(&args.color).await?,
    )?;

    tokio::task::spawn_blocking(move || export(&args, &params, &config, &color, &depth))
        .await
        .map_err(|e| Error::Io(e.into()))?
}

fn export(
    args: &Args,
    params: &CameraParams,
    config: &Config,
    color: &Frame,
    depth: &Frame,
) -> Result<(), Error> {
    let registration =
        Registration::with_config(Calibration::new(params.ir, params.color)?, config)?;
    let registered = registration.apply_with_config(color, depth, config)?;

    let mut writer = if args.binary {
        PcdWriter::binary()
    } else {
        PcdWriter::ascii()
    };
    if args.float_rgb {
        writer = writer.with_color_encoding(ColorEncoding::Float);
    }

    let written = if args.sparse {
        let points = registration.points_array_for(&registered.undistorted)?;
        writer.write_sparse(
            File::create(&args.output)?,
            &points,
            Some(&registered.registered),
        )?
    } else {
        registration.write_pcd(
            File::create(&args.output)?,
            &registered.undistorted,
            Some(&registered.registered),
            &writer,
        )?
    };
    info!("Wrote {written} points to {}", args.output.display());

    if let (Some(path), Some(big_depth)) = (&args.big_depth, &registered.big_depth) {
        let written = registration.write_big_pcd(File::create(path)?, big_depth, Some(color), &writer)?;
        info!("Wrote {written} points to {}", path.display());
    }

    if let Some(path) = &args.undistorted_image {
        registered.undistorted.to_image()?.save(path)?;
    }

    if let Some(path) = &args.registered_image {
        registered.registered.to_image()?.save(path)?;
    }

    Ok(())
}
