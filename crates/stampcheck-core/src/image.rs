use serde::{Deserialize, Serialize};

/// Borrowed row-major 8-bit grayscale image.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

/// Owned row-major 8-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image filled with a single intensity.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Wrap a raw buffer; `None` if the length does not match the dimensions.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }
}

impl<'a> GrayImageView<'a> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn to_owned_image(&self) -> GrayImage {
        GrayImage {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

/// Axis-aligned pixel region `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl Roi {
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
        }
    }

    /// Region shrunk by `frac` of the width/height on every side.
    pub fn inset(width: usize, height: usize, frac: f32) -> Self {
        let frac = frac.clamp(0.0, 0.5);
        let dx = (width as f32 * frac).floor() as usize;
        let dy = (height as f32 * frac).floor() as usize;
        Self {
            x0: dx,
            y0: dy,
            x1: width.saturating_sub(dx),
            y1: height.saturating_sub(dy),
        }
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }
}

// Out-of-bounds reads replicate the nearest edge pixel.
#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, src.width as i32 - 1);
    let y = y.clamp(0, src.height as i32 - 1);
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample at pixel-center coordinates; 0 for an empty image.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    if src.is_empty() {
        return 0.0;
    }
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(GrayImage::from_raw(3, 2, vec![0; 5]).is_none());
        assert!(GrayImage::from_raw(3, 2, vec![0; 6]).is_some());
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = GrayImage::from_raw(2, 1, vec![0, 100]).unwrap();
        let v = img.view();
        assert_relative_eq!(sample_bilinear(&v, 0.0, 0.0), 0.0);
        assert_relative_eq!(sample_bilinear(&v, 0.5, 0.0), 50.0);
        assert_relative_eq!(sample_bilinear(&v, 1.0, 0.0), 100.0);
    }

    #[test]
    fn bilinear_clamps_outside_the_frame() {
        let img = GrayImage::from_raw(2, 2, vec![10, 20, 30, 40]).unwrap();
        let v = img.view();
        assert_relative_eq!(sample_bilinear(&v, -5.0, -5.0), 10.0);
        assert_relative_eq!(sample_bilinear(&v, 9.0, 9.0), 40.0);
    }

    #[test]
    fn inset_roi_shrinks_each_side() {
        let roi = Roi::inset(100, 50, 0.1);
        assert_eq!(roi, Roi { x0: 10, y0: 5, x1: 90, y1: 45 });
        assert!(Roi::inset(10, 10, 0.5).is_empty());
    }
}
