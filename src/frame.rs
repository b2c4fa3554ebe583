use std::fmt::{self, Debug};

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Color,
    Ir,
    Depth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Invalid,
    /// Raw bitstream, layout is defined by the frame source
    Raw,
    /// 4 bytes float per pixel, little endian
    Float,
    /// 4 bytes of B, G, R, and unused per pixel
    BGRX,
    /// 4 bytes of R, G, B, and unused per pixel
    RGBX,
    /// 1 byte of gray per pixel
    Gray,
}

impl FrameFormat {
    pub const fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            FrameFormat::Float | FrameFormat::BGRX | FrameFormat::RGBX => Some(4),
            FrameFormat::Gray => Some(1),
            FrameFormat::Raw | FrameFormat::Invalid => None,
        }
    }

    /// Byte positions of red, green and blue inside a pixel.
    pub const fn rgb_positions(&self) -> Option<[usize; 3]> {
        match self {
            FrameFormat::BGRX => Some([2, 1, 0]),
            FrameFormat::RGBX => Some([0, 1, 2]),
            _ => None,
        }
    }
}

/// A rectangular pixel buffer with the metadata of its capture.
#[derive(Clone)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub format: FrameFormat,
    pub buffer: Vec<u8>,

    pub timestamp: u32,
    pub sequence: u32,
    pub exposure: f32,
    pub gain: f32,
    pub gamma: f32,
    pub status: u32,
}

impl Frame {
    /// Allocate a zeroed frame.
    pub fn new(width: usize, height: usize, bytes_per_pixel: usize) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
            format: FrameFormat::Invalid,
            buffer: vec![0; width * height * bytes_per_pixel],
            timestamp: 0,
            sequence: 0,
            exposure: 0.0,
            gain: 0.0,
            gamma: 0.0,
            status: 0,
        }
    }

    pub fn from_depth(width: usize, height: usize, depth: &[f32]) -> Result<Self, Error> {
        if depth.len() != width * height {
            return Err(Error::InvalidFrame {
                frame: "depth",
                reason: format!(
                    "{} values for a {width}x{height} frame",
                    depth.len()
                ),
            });
        }

        let mut frame = Self::new(width, height, 4);
        frame.format = FrameFormat::Float;
        frame.buffer = depth.iter().flat_map(|z| z.to_le_bytes()).collect();

        Ok(frame)
    }

    pub fn from_pixels(
        width: usize,
        height: usize,
        format: FrameFormat,
        buffer: Vec<u8>,
    ) -> Result<Self, Error> {
        let bytes_per_pixel = format
            .bytes_per_pixel()
            .ok_or(Error::UnsupportedFormat(format))?;

        if buffer.len() != width * height * bytes_per_pixel {
            return Err(Error::InvalidFrame {
                frame: "pixel",
                reason: format!(
                    "{} bytes for a {width}x{height} {format:?} frame",
                    buffer.len()
                ),
            });
        }

        Ok(Self {
            width,
            height,
            format,
            buffer,
            ..Self::new(0, 0, bytes_per_pixel)
        })
    }

    /// Take over the capture metadata of `source`.
    pub fn copy_metadata(&mut self, source: &Frame) {
        self.timestamp = source.timestamp;
        self.sequence = source.sequence;
        self.exposure = source.exposure;
        self.gain = source.gain;
        self.gamma = source.gamma;
        self.status = source.status;
    }

    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Depth value of pixel `index`, the frame has to hold 4 byte floats.
    pub fn depth_at(&self, index: usize) -> f32 {
        let offset = index * 4;

        f32::from_le_bytes([
            self.buffer[offset],
            self.buffer[offset + 1],
            self.buffer[offset + 2],
            self.buffer[offset + 3],
        ])
    }

    pub fn depth_values(&self) -> Vec<f32> {
        self.buffer
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    pub fn pixel(&self, index: usize) -> &[u8] {
        let offset = index * self.bytes_per_pixel;

        &self.buffer[offset..offset + self.bytes_per_pixel]
    }

    /// Red in the low byte, then green, then blue.
    pub fn packed_rgb(&self, index: usize) -> Result<u32, Error> {
        let [r, g, b] = self
            .format
            .rgb_positions()
            .ok_or(Error::UnsupportedFormat(self.format))?;
        let pixel = self.pixel(index);

        Ok(pixel[r] as u32 | (pixel[g] as u32) << 8 | (pixel[b] as u32) << 16)
    }

    /// Convert to an image. Float frames become 16 bit gray holding millimetres.
    pub fn to_image(&self) -> Result<DynamicImage, Error> {
        let (width, height) = (self.width as u32, self.height as u32);
        let invalid = || Error::InvalidFrame {
            frame: "image",
            reason: format!("buffer of {} bytes", self.buffer.len()),
        };

        match self.format {
            FrameFormat::BGRX | FrameFormat::RGBX => {
                let [r, g, b] = self
                    .format
                    .rgb_positions()
                    .ok_or(Error::UnsupportedFormat(self.format))?;
                let rgb = self
                    .buffer
                    .chunks_exact(4)
                    .flat_map(|pixel| [pixel[r], pixel[g], pixel[b]])
                    .collect();

                Ok(DynamicImage::ImageRgb8(
                    RgbImage::from_raw(width, height, rgb).ok_or_else(invalid)?,
                ))
            }
            FrameFormat::Gray => Ok(DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, self.buffer.clone()).ok_or_else(invalid)?,
            )),
            FrameFormat::Float => {
                let millimetres = self
                    .depth_values()
                    .into_iter()
                    .map(|z| {
                        if z.is_nan() {
                            0
                        } else {
                            z.clamp(0.0, u16::MAX as f32) as u16
                        }
                    })
                    .collect();

                Ok(DynamicImage::ImageLuma16(
                    ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(width, height, millimetres)
                        .ok_or_else(invalid)?,
                ))
            }
            FrameFormat::Raw | FrameFormat::Invalid => Err(Error::UnsupportedFormat(self.format)),
        }
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes_per_pixel", &self.bytes_per_pixel)
            .field("buffer_length", &self.buffer.len())
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .field("exposure", &self.exposure)
            .field("gain", &self.gain)
            .field("gamma", &self.gamma)
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgrx_packs_red_into_low_byte() {
        let frame = Frame::from_pixels(1, 1, FrameFormat::BGRX, vec![0x30, 0x20, 0x10, 0]).unwrap();

        assert_eq!(frame.packed_rgb(0).unwrap(), 0x30_20_10);
    }

    #[test]
    fn rgbx_and_bgrx_agree_on_the_same_color() {
        let bgrx = Frame::from_pixels(1, 1, FrameFormat::BGRX, vec![3, 2, 1, 255]).unwrap();
        let rgbx = Frame::from_pixels(1, 1, FrameFormat::RGBX, vec![1, 2, 3, 255]).unwrap();

        assert_eq!(bgrx.packed_rgb(0).unwrap(), rgbx.packed_rgb(0).unwrap());
    }

    #[test]
    fn depth_survives_byte_buffer() {
        let frame = Frame::from_depth(2, 1, &[1234.5, f32::NAN]).unwrap();

        assert_eq!(frame.depth_at(0), 1234.5);
        assert!(frame.depth_at(1).is_nan());
        assert_eq!(frame.buffer.len(), 8);
    }

    #[test]
    fn wrong_depth_length_is_rejected() {
        assert!(matches!(
            Frame::from_depth(2, 2, &[1.0]),
            Err(Error::InvalidFrame { .. })
        ));
    }

    #[test]
    fn float_image_clamps_to_millimetres() {
        let frame = Frame::from_depth(3, 1, &[f32::NAN, -5.0, 1500.7]).unwrap();
        let image = frame.to_image().unwrap().into_luma16();

        assert_eq!(image.as_raw(), &vec![0, 0, 1500]);
    }

    #[test]
    fn bgrx_image_is_rgb() {
        let frame = Frame::from_pixels(1, 1, FrameFormat::BGRX, vec![3, 2, 1, 0]).unwrap();
        let image = frame.to_image().unwrap().into_rgb8();

        assert_eq!(image.as_raw(), &vec![1, 2, 3]);
    }

    #[test]
    fn raw_frames_have_no_image() {
        let mut frame = Frame::new(1, 1, 4);
        frame.format = FrameFormat::Raw;

        assert!(matches!(
            frame.to_image(),
            Err(Error::UnsupportedFormat(FrameFormat::Raw))
        ));
    }
}
