use serde::{Deserialize, Serialize};

use crate::Error;

/// Color camera calibration parameters.
/// Kinect v2 includes factory preset values for these parameters. They are used in Registration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorParams {
    /*
        Intrinsic parameters
    */
    /// Focal length x (pixel)
    pub fx: f32,
    /// Focal length y (pixel)
    pub fy: f32,
    /// Principal point x (pixel)
    pub cx: f32,
    /// Principal point y (pixel)
    pub cy: f32,

    /*
        Extrinsic parameters

        These parameters are used in [a formula](https://github.com/OpenKinect/libfreenect2/issues/41#issuecomment-72022111)
        to map coordinates in the depth camera to the color camera.

        They cannot be used for matrix transformation.
    */
    pub shift_d: f32,
    pub shift_m: f32,

    pub mx_x3y0: f32,
    pub mx_x0y3: f32,
    pub mx_x2y1: f32,
    pub mx_x1y2: f32,
    pub mx_x2y0: f32,
    pub mx_x0y2: f32,
    pub mx_x1y1: f32,
    pub mx_x1y0: f32,
    pub mx_x0y1: f32,
    pub mx_x0y0: f32,

    pub my_x3y0: f32,
    pub my_x0y3: f32,
    pub my_x2y1: f32,
    pub my_x1y2: f32,
    pub my_x2y0: f32,
    pub my_x0y2: f32,
    pub my_x1y1: f32,
    pub my_x1y0: f32,
    pub my_x0y1: f32,
    pub my_x0y0: f32,
}

impl ColorParams {
    fn named(&self) -> [(&'static str, f32); 26] {
        [
            ("color.fx", self.fx),
            ("color.fy", self.fy),
            ("color.cx", self.cx),
            ("color.cy", self.cy),
            ("color.shift_d", self.shift_d),
            ("color.shift_m", self.shift_m),
            ("color.mx_x3y0", self.mx_x3y0),
            ("color.mx_x0y3", self.mx_x0y3),
            ("color.mx_x2y1", self.mx_x2y1),
            ("color.mx_x1y2", self.mx_x1y2),
            ("color.mx_x2y0", self.mx_x2y0),
            ("color.mx_x0y2", self.mx_x0y2),
            ("color.mx_x1y1", self.mx_x1y1),
            ("color.mx_x1y0", self.mx_x1y0),
            ("color.mx_x0y1", self.mx_x0y1),
            ("color.mx_x0y0", self.mx_x0y0),
            ("color.my_x3y0", self.my_x3y0),
            ("color.my_x0y3", self.my_x0y3),
            ("color.my_x2y1", self.my_x2y1),
            ("color.my_x1y2", self.my_x1y2),
            ("color.my_x2y0", self.my_x2y0),
            ("color.my_x0y2", self.my_x0y2),
            ("color.my_x1y1", self.my_x1y1),
            ("color.my_x1y0", self.my_x1y0),
            ("color.my_x0y1", self.my_x0y1),
            ("color.my_x0y0", self.my_x0y0),
        ]
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_finite(&self.named())?;
        validate_non_zero(&[
            ("color.fx", self.fx),
            ("color.fy", self.fy),
            ("color.shift_d", self.shift_d),
        ])
    }
}

/// IR camera intrinsic calibration parameters.
/// Kinect v2 includes factory preset values for these parameters. They are used in depth image decoding, and Registration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrParams {
    /// Focal length x (pixel)
    pub fx: f32,
    /// Focal length y (pixel)
    pub fy: f32,
    /// Principal point x (pixel)
    pub cx: f32,
    /// Principal point y (pixel)
    pub cy: f32,
    /// Radial distortion coefficient, 1st-order
    pub k1: f32,
    /// Radial distortion coefficient, 2nd-order
    pub k2: f32,
    /// Radial distortion coefficient, 3rd-order
    pub k3: f32,
    /// Tangential distortion coefficient
    pub p1: f32,
    /// Tangential distortion coefficient
    pub p2: f32,
}

impl IrParams {
    pub fn validate(&self) -> Result<(), Error> {
        validate_finite(&[
            ("ir.fx", self.fx),
            ("ir.fy", self.fy),
            ("ir.cx", self.cx),
            ("ir.cy", self.cy),
            ("ir.k1", self.k1),
            ("ir.k2", self.k2),
            ("ir.k3", self.k3),
            ("ir.p1", self.p1),
            ("ir.p2", self.p2),
        ])?;
        validate_non_zero(&[("ir.fx", self.fx), ("ir.fy", self.fy)])
    }
}

/// Both parameter sets of one device session, in the layout saved next to captures.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParams {
    pub ir: IrParams,
    pub color: ColorParams,
}

impl CameraParams {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn validate_finite(params: &[(&'static str, f32)]) -> Result<(), Error> {
    match params.iter().find(|(_, value)| !value.is_finite()) {
        Some(&(name, value)) => Err(Error::Calibration { name, value }),
        None => Ok(()),
    }
}

fn validate_non_zero(params: &[(&'static str, f32)]) -> Result<(), Error> {
    match params.iter().find(|(_, value)| *value == 0.0) {
        Some(&(name, value)) => Err(Error::Calibration { name, value }),
        None => Ok(()),
    }
}
