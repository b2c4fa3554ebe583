mod calibration;
mod camera;
mod frame;
mod point_cloud;
mod processor;
mod source;

use serde::Deserialize;
use thiserror::Error;

pub use calibration::Calibration;
pub use camera::{CameraParams, ColorParams, IrParams};
pub use frame::{Frame, FrameFormat, FrameType};
pub use point_cloud::{
    pcd::{read_pcd, ColorEncoding, DataEncoding, PcdWriter},
    PointArray, PointCloud,
};
pub use processor::registration::{Registered, Registration};
pub use source::{frame_queue, FrameListener, FrameQueue, FrameSender};

pub const DEPTH_WIDTH: usize = 512;
pub const DEPTH_HEIGHT: usize = 424;
pub const DEPTH_SIZE: usize = DEPTH_WIDTH * DEPTH_HEIGHT;

pub const COLOR_WIDTH: usize = 1920;
pub const COLOR_HEIGHT: usize = 1080;
pub const COLOR_SIZE: usize = COLOR_WIDTH * COLOR_HEIGHT;

/// Depth in color space has one blank row above and below the color image.
pub const BIG_DEPTH_HEIGHT: usize = COLOR_HEIGHT + 2;
pub const BIG_DEPTH_SIZE: usize = COLOR_WIDTH * BIG_DEPTH_HEIGHT;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error("Invalid calibration parameter {name}: {value}")]
    Calibration { name: &'static str, value: f32 },
    #[error("Invalid {frame} frame: {reason}")]
    InvalidFrame { frame: &'static str, reason: String },
    #[error("Point array is {points_width}x{points_height} but color frame is {color_width}x{color_height}")]
    ShapeMismatch {
        points_width: usize,
        points_height: usize,
        color_width: usize,
        color_height: usize,
    },
    #[error("Got {rows} row indices but {cols} column indices")]
    IndexCountMismatch { rows: usize, cols: usize },
    #[error("Unsupported frame format {0:?}")]
    UnsupportedFormat(FrameFormat),
    #[error("Invalid configuration value {name}: {value}")]
    Config { name: &'static str, value: f32 },
    #[error("Malformed point cloud: {0}")]
    MalformedPointCloud(String),
    #[error("Frame source disconnected")]
    Disconnected,
}

/// Configuration of registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // Drop colors of depth pixels hidden from the color camera
    pub enable_filter: bool,
    // Also produce depth in color space
    pub with_big_depth: bool,
    // Relative depth difference to the closest surface still accepted by the filter
    pub filter_tolerance: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_filter: true,
            with_big_depth: false,
            filter_tolerance: 0.01,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;

        Ok(config)
    }

    /// Rejects a filter tolerance that is negative or not finite.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.filter_tolerance.is_finite() || self.filter_tolerance < 0.0 {
            return Err(Error::Config {
                name: "filter_tolerance",
                value: self.filter_tolerance,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = Config::from_json(r#"{ "with_big_depth": true }"#).unwrap();

        assert!(config.enable_filter);
        assert!(config.with_big_depth);
        assert_eq!(config.filter_tolerance, 0.01);
    }

    #[test]
    fn malformed_config_is_json_error() {
        assert!(matches!(
            Config::from_json("{ enable_filter: yes }"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn filter_tolerance_must_be_finite_and_positive() {
        assert!(matches!(
            Config::from_json(r#"{ "filter_tolerance": -0.5 }"#),
            Err(Error::Config {
                name: "filter_tolerance",
                ..
            })
        ));

        let config = Config {
            filter_tolerance: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config { .. })));

        assert!(Config::from_json(r#"{ "filter_tolerance": 0.0 }"#).is_ok());
    }
}
