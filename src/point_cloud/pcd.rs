//! PCD (Point Cloud Library) files.
//!
//! Points are written exactly as computed, in millimetres with z pointing away
//! from the sensor. Points without geometry stay in dense clouds as NaN.

use std::io::{self, BufRead, BufWriter, Read, Write};

use log::trace;

use crate::{frame::Frame, Error};

use super::{PointArray, PointCloud};

const MAX_RESERVED_POINTS: usize = 4096;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum DataEncoding {
    #[default]
    Ascii,
    /// Little endian 4 byte fields
    Binary,
}

/// Type of the packed `rgb` field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ColorEncoding {
    #[default]
    Integer,
    /// Bit pattern of the packed color reinterpreted as float, as most PCL tools expect
    Float,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PcdWriter {
    pub data: DataEncoding,
    pub color: ColorEncoding,
}

impl PcdWriter {
    pub fn ascii() -> Self {
        Self::default()
    }

    pub fn binary() -> Self {
        Self {
            data: DataEncoding::Binary,
            ..Default::default()
        }
    }

    pub fn with_color_encoding(mut self, color: ColorEncoding) -> Self {
        self.color = color;
        self
    }

    /// Write every point of the grid, colored by the same sized `colors` frame when given.
    /// Returns the number of points written.
    pub fn write<W: Write>(
        &self,
        output: W,
        points: &PointArray,
        colors: Option<&Frame>,
    ) -> Result<usize, Error> {
        let colors = colors
            .map(|frame| packed_colors(points, frame))
            .transpose()?;

        self.write_records(
            output,
            points.width(),
            points.height(),
            points.points(),
            colors.as_deref(),
        )
    }

    /// Write only points with a finite, non zero depth as an unorganized cloud.
    pub fn write_sparse<W: Write>(
        &self,
        output: W,
        points: &PointArray,
        colors: Option<&Frame>,
    ) -> Result<usize, Error> {
        let colors = colors
            .map(|frame| packed_colors(points, frame))
            .transpose()?;

        let kept: Vec<usize> = points
            .points()
            .iter()
            .enumerate()
            .filter(|(_, [_, _, z])| z.is_finite() && *z != 0.0)
            .map(|(i, _)| i)
            .collect();
        let sparse_points: Vec<[f32; 3]> = kept.iter().map(|&i| points.points()[i]).collect();
        let sparse_colors: Option<Vec<u32>> = colors
            .as_ref()
            .map(|colors| kept.iter().map(|&i| colors[i]).collect());

        self.write_records(
            output,
            sparse_points.len(),
            1,
            &sparse_points,
            sparse_colors.as_deref(),
        )
    }

    fn write_records<W: Write>(
        &self,
        output: W,
        width: usize,
        height: usize,
        points: &[[f32; 3]],
        colors: Option<&[u32]>,
    ) -> Result<usize, Error> {
        let mut output = BufWriter::new(output);

        self.write_header(&mut output, width, height, colors.is_some())?;

        match self.data {
            DataEncoding::Ascii => {
                for (i, [x, y, z]) in points.iter().enumerate() {
                    match (colors, self.color) {
                        (Some(colors), ColorEncoding::Integer) => {
                            writeln!(output, "{x} {y} {z} {}", colors[i])?
                        }
                        (Some(colors), ColorEncoding::Float) => {
                            writeln!(output, "{x} {y} {z} {}", f32::from_bits(colors[i]))?
                        }
                        (None, _) => writeln!(output, "{x} {y} {z}")?,
                    }
                }
            }
            DataEncoding::Binary => {
                for (i, point) in points.iter().enumerate() {
                    for value in point {
                        output.write_all(&value.to_le_bytes())?;
                    }

                    if let Some(colors) = colors {
                        output.write_all(&colors[i].to_le_bytes())?;
                    }
                }
            }
        }

        output.flush()?;

        trace!(
            "Wrote {} {:?} PCD points ({width}x{height})",
            points.len(),
            self.data
        );

        Ok(points.len())
    }

    fn write_header<W: Write>(
        &self,
        output: &mut W,
        width: usize,
        height: usize,
        with_color: bool,
    ) -> io::Result<()> {
        writeln!(output, "VERSION .7")?;

        if with_color {
            let rgb_type = match self.color {
                ColorEncoding::Integer => "I",
                ColorEncoding::Float => "F",
            };

            writeln!(output, "FIELDS x y z rgb")?;
            writeln!(output, "SIZE 4 4 4 4")?;
            writeln!(output, "TYPE F F F {rgb_type}")?;
            writeln!(output, "COUNT 1 1 1 1")?;
        } else {
            writeln!(output, "FIELDS x y z")?;
            writeln!(output, "SIZE 4 4 4")?;
            writeln!(output, "TYPE F F F")?;
            writeln!(output, "COUNT 1 1 1")?;
        }

        writeln!(output, "WIDTH {width}")?;
        writeln!(output, "HEIGHT {height}")?;
        writeln!(output, "VIEWPOINT 0 0 0 1 0 0 0")?;
        writeln!(output, "POINTS {}", width * height)?;
        writeln!(
            output,
            "DATA {}",
            match self.data {
                DataEncoding::Ascii => "ascii",
                DataEncoding::Binary => "binary",
            }
        )
    }
}

fn packed_colors(points: &PointArray, frame: &Frame) -> Result<Vec<u32>, Error> {
    if frame.width != points.width() || frame.height != points.height() {
        return Err(Error::ShapeMismatch {
            points_width: points.width(),
            points_height: points.height(),
            color_width: frame.width,
            color_height: frame.height,
        });
    }

    (0..frame.len()).map(|i| frame.packed_rgb(i)).collect()
}

/// Read a cloud with `x y z` and optionally `rgb` fields as written by [`PcdWriter`].
pub fn read_pcd<R: BufRead>(mut input: R) -> Result<PointCloud, Error> {
    let mut width = None;
    let mut height = None;
    let mut count = None;
    let mut with_color = false;
    let mut rgb_is_float = false;
    let mut line = String::new();

    let binary = loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(malformed("missing DATA line"));
        }

        let mut words = line.split_whitespace();
        let Some(key) = words.next() else {
            continue;
        };
        let values: Vec<&str> = words.collect();

        match key {
            key if key.starts_with('#') => {}
            "VERSION" | "SIZE" | "COUNT" | "VIEWPOINT" => {}
            "FIELDS" => match values.as_slice() {
                ["x", "y", "z"] => with_color = false,
                ["x", "y", "z", "rgb"] => with_color = true,
                _ => return Err(malformed(&format!("unsupported fields {values:?}"))),
            },
            "TYPE" => rgb_is_float = values.get(3) == Some(&"F"),
            "WIDTH" => width = Some(parse_count(&values, "WIDTH")?),
            "HEIGHT" => height = Some(parse_count(&values, "HEIGHT")?),
            "POINTS" => count = Some(parse_count(&values, "POINTS")?),
            "DATA" => match values.first() {
                Some(&"ascii") => break false,
                Some(&"binary") => break true,
                _ => return Err(malformed(&format!("unsupported data {values:?}"))),
            },
            _ => return Err(malformed(&format!("unknown header line {key}"))),
        }
    };

    let (Some(width), Some(height), Some(count)) = (width, height, count) else {
        return Err(malformed("header lacks WIDTH, HEIGHT or POINTS"));
    };
    if width.checked_mul(height) != Some(count) {
        return Err(malformed(&format!(
            "{count} points do not fill {width}x{height}"
        )));
    }

    // the count is not trusted until the records are read
    let capacity = count.min(MAX_RESERVED_POINTS);
    let mut points = Vec::with_capacity(capacity);
    let mut colors = with_color.then(|| Vec::with_capacity(capacity));

    if binary {
        let record_size = if with_color { 16 } else { 12 };
        let mut record = vec![0u8; record_size];

        for _ in 0..count {
            input.read_exact(&mut record)?;

            let field = |i: usize| {
                [
                    record[i * 4],
                    record[i * 4 + 1],
                    record[i * 4 + 2],
                    record[i * 4 + 3],
                ]
            };

            points.push([
                f32::from_le_bytes(field(0)),
                f32::from_le_bytes(field(1)),
                f32::from_le_bytes(field(2)),
            ]);

            if let Some(colors) = colors.as_mut() {
                colors.push(u32::from_le_bytes(field(3)));
            }
        }
    } else {
        let fields = if with_color { 4 } else { 3 };

        for _ in 0..count {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                return Err(malformed(&format!(
                    "expected {count} points, got {}",
                    points.len()
                )));
            }

            let values: Vec<&str> = line.split_whitespace().collect();
            if values.len() != fields {
                return Err(malformed(&format!("record `{}`", line.trim_end())));
            }

            points.push([
                parse_float(values[0])?,
                parse_float(values[1])?,
                parse_float(values[2])?,
            ]);

            if let Some(colors) = colors.as_mut() {
                colors.push(if rgb_is_float {
                    parse_float(values[3])?.to_bits()
                } else {
                    values[3]
                        .parse()
                        .map_err(|_| malformed(&format!("color `{}`", values[3])))?
                });
            }
        }
    }

    let mut rest = Vec::new();
    input.read_to_end(&mut rest)?;
    let trailing = if binary {
        !rest.is_empty()
    } else {
        !rest.iter().all(u8::is_ascii_whitespace)
    };
    if trailing {
        return Err(malformed(&format!("data after {count} points")));
    }

    Ok(PointCloud {
        width,
        height,
        points,
        colors,
    })
}

fn malformed(reason: &str) -> Error {
    Error::MalformedPointCloud(reason.to_string())
}

fn parse_count(values: &[&str], key: &str) -> Result<usize, Error> {
    values
        .first()
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| malformed(&format!("{key} {values:?}")))
}

fn parse_float(value: &str) -> Result<f32, Error> {
    value
        .parse()
        .map_err(|_| malformed(&format!("number `{value}`")))
}
