use std::io::Write;

use log::debug;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    calibration::Calibration,
    camera::{ColorParams, IrParams},
    frame::{Frame, FrameFormat},
    point_cloud::{pcd::PcdWriter, PointArray},
    Config, Error, BIG_DEPTH_HEIGHT, BIG_DEPTH_SIZE, COLOR_HEIGHT, COLOR_SIZE, COLOR_WIDTH,
    DEPTH_HEIGHT, DEPTH_SIZE, DEPTH_WIDTH,
};

const FILTER_WIDTH_HALF: usize = 2;
const FILTER_HEIGHT_HALF: usize = 1;

/// Frames produced by [`Registration::apply`].
#[derive(Debug, Clone)]
pub struct Registered {
    /// Depth in millimetres without lens distortion, NaN where there is no data.
    pub undistorted: Frame,
    /// Color sampled at every undistorted depth pixel, zero where there is none.
    pub registered: Frame,
    /// Depth in color space, 1920x1082, NaN where no depth pixel projects.
    pub big_depth: Option<Frame>,
}

/// Maps depth frames onto the color camera and back into 3D.
///
/// Colors are sampled from the nearest color pixel. All 3D coordinates are in
/// millimetres in the frame of the sensor they were computed for, z pointing away from it.
#[derive(Debug, Clone)]
pub struct Registration {
    calibration: Calibration,
    filter_tolerance: f32,
}

impl Registration {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            calibration,
            filter_tolerance: Config::default().filter_tolerance,
        }
    }

    pub fn with_config(calibration: Calibration, config: &Config) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            calibration,
            filter_tolerance: config.filter_tolerance,
        })
    }

    pub fn from_params(ir_params: IrParams, color_params: ColorParams) -> Result<Self, Error> {
        Ok(Self::new(Calibration::new(ir_params, color_params)?))
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// [`Registration::apply`] with the switches of `config`.
    pub fn apply_with_config(
        &self,
        color_frame: &Frame,
        depth_frame: &Frame,
        config: &Config,
    ) -> Result<Registered, Error> {
        self.apply(
            color_frame,
            depth_frame,
            config.enable_filter,
            config.with_big_depth,
        )
    }

    pub fn apply(
        &self,
        color_frame: &Frame,
        depth_frame: &Frame,
        enable_filter: bool,
        with_big_depth: bool,
    ) -> Result<Registered, Error> {
        check_depth_frame(depth_frame)?;
        check_color_frame(color_frame)?;

        let calibration = &self.calibration;
        let color_params = calibration.color_params();
        let depth = depth_frame.depth_values();

        let color_cx = color_params.cx + 0.5; // 0.5 added for later rounding

        // map for storing the min z values used for each color pixel, with a border of
        // FILTER_HEIGHT_HALF rows on top and bottom so that no vertical check is needed
        let mut filter_map =
            (enable_filter || with_big_depth).then(|| vec![f32::INFINITY; BIG_DEPTH_SIZE]);
        // offset to the color image rows
        let offset_filter_map = COLOR_WIDTH * FILTER_HEIGHT_HALF;

        let mut undistorted = Vec::with_capacity(DEPTH_SIZE);
        // color offset for each depth pixel
        let mut depth_to_c_off = Vec::with_capacity(DEPTH_SIZE);

        /* Fix depth distortion, and compute pixel to use from 'color' based on depth measurement,
         * stored as offset in the color data.
         */
        for i in 0..DEPTH_SIZE {
            // depth at the distorted position, pixels mapping outside of the sensor have none
            let z = calibration.distort_map[i].map_or(f32::NAN, |index| depth[index]);

            if !is_valid_depth(z) {
                undistorted.push(f32::NAN);
                depth_to_c_off.push(None);
                continue;
            }

            undistorted.push(z);

            // calculating x offset for color image based on depth value
            let rx = (calibration.depth_to_color_map_x[i] + (color_params.shift_m / z))
                * color_params.fx
                + color_cx;
            // same as round since 0.5 was already added to color_cx
            let cx = rx.floor();
            let cy = calibration.depth_to_color_map_yi[i];

            if !(0.0..COLOR_WIDTH as f32).contains(&cx) || !(0..COLOR_HEIGHT as i32).contains(&cy)
            {
                depth_to_c_off.push(None);
                continue;
            }

            let (cx, cy) = (cx as usize, cy as usize);
            let c_off = cx + cy * COLOR_WIDTH;

            depth_to_c_off.push(Some(c_off));

            if let Some(filter_map) = filter_map.as_mut() {
                // setting a window around the filter map pixel corresponding to the color pixel with the current z value
                let first = cx.saturating_sub(FILTER_WIDTH_HALF);
                let last = (cx + FILTER_WIDTH_HALF).min(COLOR_WIDTH - 1);

                // padded row cy is the row above the color pixel
                for row in cy..=cy + 2 * FILTER_HEIGHT_HALF {
                    let row_start = row * COLOR_WIDTH;

                    for it in &mut filter_map[row_start + first..=row_start + last] {
                        // only set if the current z is smaller
                        if z < *it {
                            *it = z;
                        }
                    }
                }
            }
        }

        /* Construct 'registered' image. */
        let bytes_per_pixel = color_frame.bytes_per_pixel;
        let mut registered = Vec::with_capacity(DEPTH_SIZE * bytes_per_pixel);
        let mut hidden = 0;

        for (i, c_off) in depth_to_c_off.iter().copied().enumerate() {
            let c_off = match (c_off, filter_map.as_ref()) {
                // the filter drops pixels hidden behind a closer surface in color space
                (Some(c_off), Some(filter_map)) if enable_filter => {
                    let min_z = filter_map[offset_filter_map + c_off];
                    let z = undistorted[i];

                    // check for allowed depth noise
                    if (z - min_z) / z > self.filter_tolerance {
                        hidden += 1;
                        None
                    } else {
                        Some(c_off)
                    }
                }
                (c_off, _) => c_off,
            };

            match c_off {
                Some(c_off) => registered.extend_from_slice(color_frame.pixel(c_off)),
                None => registered.extend(std::iter::repeat(0).take(bytes_per_pixel)),
            }
        }

        debug!(
            "Registered depth frame {}: {} pixels with color, {} hidden by the filter",
            depth_frame.sequence,
            depth_to_c_off.iter().flatten().count() - hidden,
            hidden
        );

        let big_depth = match filter_map {
            Some(mut filter_map) if with_big_depth => {
                for z in filter_map.iter_mut().filter(|z| z.is_infinite()) {
                    *z = f32::NAN;
                }

                // the border rows are outside of the color image
                filter_map[..COLOR_WIDTH].fill(f32::NAN);
                filter_map[BIG_DEPTH_SIZE - COLOR_WIDTH..].fill(f32::NAN);

                let mut big_depth = Frame::from_depth(COLOR_WIDTH, BIG_DEPTH_HEIGHT, &filter_map)?;
                big_depth.copy_metadata(depth_frame);

                Some(big_depth)
            }
            _ => None,
        };

        let mut undistorted = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &undistorted)?;
        undistorted.copy_metadata(depth_frame);

        let mut registered =
            Frame::from_pixels(DEPTH_WIDTH, DEPTH_HEIGHT, color_frame.format, registered)?;
        registered.copy_metadata(color_frame);

        Ok(Registered {
            undistorted,
            registered,
            big_depth,
        })
    }

    /// Only undo the lens distortion of `depth_frame`.
    pub fn undistort_depth(&self, depth_frame: &Frame) -> Result<Frame, Error> {
        check_depth_frame(depth_frame)?;

        let depth = depth_frame.depth_values();
        let undistorted: Vec<f32> = self
            .calibration
            .distort_map
            .iter()
            .map(|index| match index {
                Some(index) if is_valid_depth(depth[*index]) => depth[*index],
                _ => f32::NAN,
            })
            .collect();

        let mut undistorted_frame = Frame::from_depth(DEPTH_WIDTH, DEPTH_HEIGHT, &undistorted)?;
        undistorted_frame.copy_metadata(depth_frame);

        Ok(undistorted_frame)
    }

    /// 3D coordinates of the undistorted depth pixels at (`rows[i]`, `cols[i]`).
    pub fn points_for(
        &self,
        undistorted: &Frame,
        rows: &[usize],
        cols: &[usize],
    ) -> Result<(Vec<f32>, Vec<f32>, Vec<f32>), Error> {
        check_float_frame(undistorted, "undistorted", DEPTH_WIDTH, DEPTH_HEIGHT)?;

        if rows.len() != cols.len() {
            return Err(Error::IndexCountMismatch {
                rows: rows.len(),
                cols: cols.len(),
            });
        }

        let intrinsics = Pinhole::from(self.calibration.ir_params());
        let mut xs = Vec::with_capacity(rows.len());
        let mut ys = Vec::with_capacity(rows.len());
        let mut zs = Vec::with_capacity(rows.len());

        for (&row, &col) in rows.iter().zip(cols) {
            if row >= DEPTH_HEIGHT || col >= DEPTH_WIDTH {
                return Err(Error::InvalidFrame {
                    frame: "undistorted",
                    reason: format!("pixel ({row}, {col}) is outside of the frame"),
                });
            }

            let z = undistorted.depth_at(row * DEPTH_WIDTH + col);
            let [x, y, z] = intrinsics.unproject(row as f32, col as f32, z);

            xs.push(x);
            ys.push(y);
            zs.push(z);
        }

        Ok((xs, ys, zs))
    }

    /// 3D coordinates of every undistorted depth pixel, row major.
    pub fn points_array_for(&self, undistorted: &Frame) -> Result<PointArray, Error> {
        check_float_frame(undistorted, "undistorted", DEPTH_WIDTH, DEPTH_HEIGHT)?;

        let intrinsics = Pinhole::from(self.calibration.ir_params());

        PointArray::new(
            DEPTH_WIDTH,
            DEPTH_HEIGHT,
            intrinsics.unproject_frame(&undistorted.depth_values(), DEPTH_WIDTH, 0),
        )
    }

    /// 3D coordinates of every big depth pixel in the color camera frame.
    pub fn big_points_array_for(&self, big_depth: &Frame) -> Result<PointArray, Error> {
        check_float_frame(big_depth, "big depth", COLOR_WIDTH, BIG_DEPTH_HEIGHT)?;

        let intrinsics = Pinhole::from(self.calibration.color_params());

        // big depth row 0 lies above color row 0
        PointArray::new(
            COLOR_WIDTH,
            BIG_DEPTH_HEIGHT,
            intrinsics.unproject_frame(&big_depth.depth_values(), COLOR_WIDTH, 1),
        )
    }

    /// Write the point cloud of `undistorted`, colored by `registered` when given.
    pub fn write_pcd<W: Write>(
        &self,
        output: W,
        undistorted: &Frame,
        registered: Option<&Frame>,
        writer: &PcdWriter,
    ) -> Result<usize, Error> {
        let points = self.points_array_for(undistorted)?;

        writer.write(output, &points, registered)
    }

    /// Write the point cloud of `big_depth`, colored by the full resolution `color_frame` when given.
    pub fn write_big_pcd<W: Write>(
        &self,
        output: W,
        big_depth: &Frame,
        color_frame: Option<&Frame>,
        writer: &PcdWriter,
    ) -> Result<usize, Error> {
        let points = self.big_points_array_for(big_depth)?;

        let colors = match color_frame {
            Some(color_frame) => {
                check_color_frame(color_frame)?;

                // blank rows matching the border of big depth
                let border = vec![0; COLOR_WIDTH * color_frame.bytes_per_pixel];
                let buffer = [border.as_slice(), &color_frame.buffer, &border].concat();

                Some(Frame::from_pixels(
                    COLOR_WIDTH,
                    BIG_DEPTH_HEIGHT,
                    color_frame.format,
                    buffer,
                )?)
            }
            None => None,
        };

        writer.write(output, &points, colors.as_ref())
    }
}

fn is_valid_depth(z: f32) -> bool {
    z.is_finite() && z > 0.0
}

#[derive(Clone, Copy)]
struct Pinhole {
    fx: f32,
    fy: f32,
    cx: f32,
    cy: f32,
}

impl From<&IrParams> for Pinhole {
    fn from(params: &IrParams) -> Self {
        Self {
            fx: params.fx,
            fy: params.fy,
            cx: params.cx,
            cy: params.cy,
        }
    }
}

impl From<&ColorParams> for Pinhole {
    fn from(params: &ColorParams) -> Self {
        Self {
            fx: params.fx,
            fy: params.fy,
            cx: params.cx,
            cy: params.cy,
        }
    }
}

impl Pinhole {
    fn unproject(&self, row: f32, col: f32, z: f32) -> [f32; 3] {
        if !is_valid_depth(z) {
            return [f32::NAN; 3];
        }

        [
            (col - self.cx) * z / self.fx,
            (row - self.cy) * z / self.fy,
            z,
        ]
    }

    fn unproject_frame(&self, depth: &[f32], width: usize, row_offset: usize) -> Vec<[f32; 3]> {
        let unproject = |(i, &z): (usize, &f32)| {
            let row = (i / width) as f32 - row_offset as f32;

            self.unproject(row, (i % width) as f32, z)
        };

        #[cfg(feature = "parallel")]
        let points = depth.par_iter().enumerate().map(unproject).collect();
        #[cfg(not(feature = "parallel"))]
        let points = depth.iter().enumerate().map(unproject).collect();

        points
    }
}

fn check_float_frame(
    frame: &Frame,
    name: &'static str,
    width: usize,
    height: usize,
) -> Result<(), Error> {
    if frame.width != width || frame.height != height {
        return Err(Error::InvalidFrame {
            frame: name,
            reason: format!(
                "expected {width}x{height}, got {}x{}",
                frame.width, frame.height
            ),
        });
    }

    if !matches!(frame.format, FrameFormat::Float | FrameFormat::Raw) || frame.bytes_per_pixel != 4
    {
        return Err(Error::InvalidFrame {
            frame: name,
            reason: format!(
                "expected 4 byte float pixels, got {:?} with {} bytes",
                frame.format, frame.bytes_per_pixel
            ),
        });
    }

    if frame.buffer.len() != width * height * 4 {
        return Err(Error::InvalidFrame {
            frame: name,
            reason: format!("buffer of {} bytes", frame.buffer.len()),
        });
    }

    Ok(())
}

fn check_depth_frame(frame: &Frame) -> Result<(), Error> {
    check_float_frame(frame, "depth", DEPTH_WIDTH, DEPTH_HEIGHT)
}

fn check_color_frame(frame: &Frame) -> Result<(), Error> {
    if frame.width != COLOR_WIDTH || frame.height != COLOR_HEIGHT {
        return Err(Error::InvalidFrame {
            frame: "color",
            reason: format!(
                "expected {COLOR_WIDTH}x{COLOR_HEIGHT}, got {}x{}",
                frame.width, frame.height
            ),
        });
    }

    if frame.format.rgb_positions().is_none() || frame.bytes_per_pixel != 4 {
        return Err(Error::InvalidFrame {
            frame: "color",
            reason: format!(
                "expected BGRX or RGBX pixels, got {:?} with {} bytes",
                frame.format, frame.bytes_per_pixel
            ),
        });
    }

    if frame.buffer.len() != COLOR_SIZE * 4 {
        return Err(Error::InvalidFrame {
            frame: "color",
            reason: format!("buffer of {} bytes", frame.buffer.len()),
        });
    }

    Ok(())
}
