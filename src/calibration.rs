use log::debug;

use crate::{
    camera::{ColorParams, IrParams},
    Error, DEPTH_HEIGHT, DEPTH_SIZE, DEPTH_WIDTH,
};

// these seem to be hardcoded in the original SDK
const DEPTH_Q: f32 = 0.01;
const COLOR_Q: f32 = 0.002199;

/// Factory calibration of both cameras together with the per pixel maps derived from it.
#[derive(Debug, Clone)]
pub struct Calibration {
    /// Depth camera parameters.
    ir_params: IrParams,
    /// Color camera parameters.
    color_params: ColorParams,
    pub(crate) distort_map: Vec<Option<usize>>,
    pub(crate) depth_to_color_map_x: Vec<f32>,
    pub(crate) depth_to_color_map_y: Vec<f32>,
    pub(crate) depth_to_color_map_yi: Vec<i32>,
}

impl Calibration {
    pub fn new(ir_params: IrParams, color_params: ColorParams) -> Result<Self, Error> {
        ir_params.validate()?;
        color_params.validate()?;

        let mut calibration = Self {
            ir_params,
            color_params,
            distort_map: Vec::with_capacity(DEPTH_SIZE),
            depth_to_color_map_x: Vec::with_capacity(DEPTH_SIZE),
            depth_to_color_map_y: Vec::with_capacity(DEPTH_SIZE),
            depth_to_color_map_yi: Vec::with_capacity(DEPTH_SIZE),
        };

        calibration.fill_maps();

        debug!(
            "Calibration maps built, {} of {} depth pixels map inside the sensor",
            calibration.distort_map.iter().flatten().count(),
            DEPTH_SIZE
        );

        Ok(calibration)
    }

    fn fill_maps(&mut self) {
        for y in 0..DEPTH_HEIGHT {
            for x in 0..DEPTH_WIDTH {
                // compute the distorted coordinate for current pixel
                let (mx, my) = self.distort(x as f32, y as f32);
                // rounding the values and check if the pixel is inside the image
                let ix = (mx + 0.5).floor();
                let iy = (my + 0.5).floor();
                let inside = (0.0..DEPTH_WIDTH as f32).contains(&ix)
                    && (0.0..DEPTH_HEIGHT as f32).contains(&iy);

                // computing the index from the coordinates for faster access to the data
                self.distort_map
                    .push(inside.then(|| iy as usize * DEPTH_WIDTH + ix as usize));

                // compute the depth to color mapping entries for the current pixel
                let (rx, ry) = self.depth_to_color(x as f32, y as f32);

                self.depth_to_color_map_x.push(rx);
                self.depth_to_color_map_y.push(ry);
                // compute the y offset to minimize later computations
                self.depth_to_color_map_yi.push((ry + 0.5).floor() as i32);
            }
        }
    }

    pub fn ir_params(&self) -> &IrParams {
        &self.ir_params
    }

    pub fn color_params(&self) -> &ColorParams {
        &self.color_params
    }

    pub fn distort(&self, mx: f32, my: f32) -> (f32, f32) {
        let ir = &self.ir_params;

        // see http://en.wikipedia.org/wiki/Distortion_(optics) for description
        let dx = (mx - ir.cx) / ir.fx;
        let dy = (my - ir.cy) / ir.fy;
        let dx2 = dx * dx;
        let dy2 = dy * dy;
        let r2 = dx2 + dy2;
        let dxdy2 = 2.0 * dx * dy;
        let kr = 1.0 + ((ir.k3 * r2 + ir.k2) * r2 + ir.k1) * r2;

        (
            ir.fx * (dx * kr + ir.p2 * (r2 + 2.0 * dx2) + ir.p1 * dxdy2) + ir.cx,
            ir.fy * (dy * kr + ir.p1 * (r2 + 2.0 * dy2) + ir.p2 * dxdy2) + ir.cy,
        )
    }

    /// Color coordinate of a depth pixel without the depth dependent baseline term.
    pub fn depth_to_color(&self, mut mx: f32, mut my: f32) -> (f32, f32) {
        let color = &self.color_params;

        mx = (mx - self.ir_params.cx) * DEPTH_Q;
        my = (my - self.ir_params.cy) * DEPTH_Q;

        let wx = (mx * mx * mx * color.mx_x3y0)
            + (my * my * my * color.mx_x0y3)
            + (mx * mx * my * color.mx_x2y1)
            + (my * my * mx * color.mx_x1y2)
            + (mx * mx * color.mx_x2y0)
            + (my * my * color.mx_x0y2)
            + (mx * my * color.mx_x1y1)
            + (mx * color.mx_x1y0)
            + (my * color.mx_x0y1)
            + (color.mx_x0y0);

        let wy = (mx * mx * mx * color.my_x3y0)
            + (my * my * my * color.my_x0y3)
            + (mx * mx * my * color.my_x2y1)
            + (my * my * mx * color.my_x1y2)
            + (mx * mx * color.my_x2y0)
            + (my * my * color.my_x0y2)
            + (mx * my * color.my_x1y1)
            + (mx * color.my_x1y0)
            + (my * color.my_x0y1)
            + (color.my_x0y0);

        (
            (wx / (color.fx * COLOR_Q)) - (color.shift_m / color.shift_d),
            (wy / COLOR_Q) + color.cy,
        )
    }

    /// Color pixel coordinate of the undistorted depth pixel (`dx`, `dy`) at depth `dz` (mm).
    pub fn depth_to_color_at(&self, dx: usize, dy: usize, dz: f32) -> (f32, f32) {
        let index = dx + dy * DEPTH_WIDTH;

        (
            (self.depth_to_color_map_x[index] + (self.color_params.shift_m / dz))
                * self.color_params.fx
                + self.color_params.cx,
            self.depth_to_color_map_y[index],
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Values in the range of a real Kinect v2 factory calibration.
    pub(crate) fn sample_params() -> (IrParams, ColorParams) {
        let ir = IrParams {
            fx: 365.456,
            fy: 365.456,
            cx: 254.878,
            cy: 205.395,
            k1: 0.0905474,
            k2: -0.26819,
            k3: 0.0950862,
            p1: 0.0,
            p2: 0.0,
        };
        let color = ColorParams {
            fx: 1081.37,
            fy: 1081.37,
            cx: 959.5,
            cy: 539.5,
            shift_d: 863.0,
            shift_m: 52.0,
            mx_x1y0: 0.6353,
            mx_x0y0: 0.1405,
            my_x0y1: 0.6353,
            my_x0y0: 0.0,
            ..Default::default()
        };

        (ir, color)
    }

    /// No lens distortion, linear mapping of the depth grid onto the color grid.
    pub(crate) fn pinhole_params() -> (IrParams, ColorParams) {
        let ir = IrParams {
            fx: 365.0,
            fy: 365.0,
            cx: 256.0,
            cy: 212.0,
            ..Default::default()
        };
        let color = ColorParams {
            fx: 1081.37,
            fy: 1081.37,
            cx: 959.5,
            cy: 539.5,
            shift_d: 863.0,
            shift_m: 52.0,
            // one depth pixel spans fx_color / fx_ir color pixels
            mx_x1y0: 1081.37 * COLOR_Q / (365.0 * DEPTH_Q),
            my_x0y1: 1081.37 * COLOR_Q / (365.0 * DEPTH_Q),
            ..Default::default()
        };

        (ir, color)
    }

    #[test]
    fn principal_point_is_not_distorted() {
        let (ir, color) = sample_params();
        let calibration = Calibration::new(ir, color).unwrap();

        let (x, y) = calibration.distort(ir.cx, ir.cy);

        assert!((x - ir.cx).abs() < 1e-4);
        assert!((y - ir.cy).abs() < 1e-4);
    }

    #[test]
    fn without_coefficients_distortion_is_identity() {
        let (ir, color) = pinhole_params();
        let calibration = Calibration::new(ir, color).unwrap();

        for (x, y) in [(0.0, 0.0), (100.0, 300.0), (511.0, 423.0)] {
            let (dx, dy) = calibration.distort(x, y);
            assert!((dx - x).abs() < 1e-3, "{dx} != {x}");
            assert!((dy - y).abs() < 1e-3, "{dy} != {y}");
        }

        assert!(calibration
            .distort_map
            .iter()
            .enumerate()
            .all(|(i, index)| *index == Some(i)));
    }

    #[test]
    fn positive_k1_pushes_corners_outward() {
        let (mut ir, color) = pinhole_params();
        ir.k1 = 0.1;
        let calibration = Calibration::new(ir, color).unwrap();

        let (x, y) = calibration.distort(0.0, 0.0);

        assert!(x < 0.0);
        assert!(y < 0.0);
        assert_eq!(calibration.distort_map[0], None);
    }

    #[test]
    fn baseline_shrinks_with_depth() {
        let (ir, color) = pinhole_params();
        let calibration = Calibration::new(ir, color).unwrap();

        let (near, _) = calibration.depth_to_color_at(256, 212, 500.0);
        let (far, _) = calibration.depth_to_color_at(256, 212, 4000.0);

        assert!(near > far);
    }

    #[test]
    fn infinite_parameter_is_rejected() {
        let (mut ir, color) = sample_params();
        ir.cx = f32::INFINITY;

        assert!(matches!(
            Calibration::new(ir, color),
            Err(Error::Calibration { name: "ir.cx", .. })
        ));
    }
}
