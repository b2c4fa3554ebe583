pub mod pcd;

use crate::Error;

/// Dense grid of 3D points, one per pixel of the frame it was computed from, row major.
#[derive(Debug, Clone)]
pub struct PointArray {
    width: usize,
    height: usize,
    points: Vec<[f32; 3]>,
}

impl PointArray {
    pub fn new(width: usize, height: usize, points: Vec<[f32; 3]>) -> Result<Self, Error> {
        if points.len() != width * height {
            return Err(Error::InvalidFrame {
                frame: "point",
                reason: format!("{} points for a {width}x{height} grid", points.len()),
            });
        }

        Ok(Self {
            width,
            height,
            points,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> [f32; 3] {
        self.points[row * self.width + col]
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn into_points(self) -> Vec<[f32; 3]> {
        self.points
    }

    /// Number of points with geometry.
    pub fn valid_count(&self) -> usize {
        self.points.iter().filter(|p| !p[2].is_nan()).count()
    }
}

/// Point cloud as stored in a file.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub width: usize,
    pub height: usize,
    pub points: Vec<[f32; 3]>,
    /// Red in the low byte, then green, then blue.
    pub colors: Option<Vec<u32>>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
