use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use ndarray::{Array2, Zip};

use crate::geometry::ShoulderBand;

/// Single-channel weight field in [0, 1], stored row-major as (height, width).
///
/// Used both for person segmentation (1 = person) and for blend masks.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Array2<f32>,
}

impl Mask {
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            data: Array2::from_elem((height as usize, width as usize), value.clamp(0.0, 1.0)),
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let data = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            f(x as u32, y as u32).clamp(0.0, 1.0)
        });
        Self { data }
    }

    /// Build from an 8-bit grayscale probability map (255 = 1.0).
    pub fn from_luma(img: &GrayImage) -> Self {
        let (w, h) = img.dimensions();
        Self::from_fn(w, h, |x, y| img.get_pixel(x, y)[0] as f32 / 255.0)
    }

    /// Load a segmentation mask from an image file (converted to grayscale).
    pub fn open(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("reading mask {}", path.display()))?
            .to_luma8();
        Ok(Self::from_luma(&img))
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[[y as usize, x as usize]]
    }

    /// Bilinear resample to `width` x `height`. Segmentation models usually
    /// run at a lower resolution than the photo.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        let (sw, sh) = self.dimensions();
        if sw == 0 || sh == 0 {
            return Self::filled(width, height, 0.0);
        }
        let sx = sw as f32 / width.max(1) as f32;
        let sy = sh as f32 / height.max(1) as f32;
        let max_x = (sw - 1) as f32;
        let max_y = (sh - 1) as f32;

        Self::from_fn(width, height, |x, y| {
            // Pixel-centre alignment between the two grids
            let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, max_x);
            let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, max_y);
            let x0 = fx.floor() as usize;
            let y0 = fy.floor() as usize;
            let x1 = (x0 + 1).min(sw as usize - 1);
            let y1 = (y0 + 1).min(sh as usize - 1);
            let tx = fx - x0 as f32;
            let ty = fy - y0 as f32;
            let top = self.data[[y0, x0]] * (1.0 - tx) + self.data[[y0, x1]] * tx;
            let bottom = self.data[[y1, x0]] * (1.0 - tx) + self.data[[y1, x1]] * tx;
            top * (1.0 - ty) + bottom * ty
        })
    }

    /// Element-wise product. `other` is resampled to this mask's size first.
    pub fn multiply(&self, other: &Mask) -> Self {
        let other = other.resized(self.width(), self.height());
        let mut data = self.data.clone();
        Zip::from(&mut data)
            .and(&other.data)
            .for_each(|a, &b| *a *= b);
        Self { data }
    }

    /// Vertical ramp: 0 above `band.top`, 1 below `band.bottom`, linear in
    /// between.
    pub fn vertical_gradient(width: u32, height: u32, band: &ShoulderBand) -> Self {
        let span = band.bottom - band.top;
        Self::from_fn(width, height, |_, y| {
            let y = y as f32;
            if span <= f32::EPSILON {
                if y >= band.top {
                    1.0
                } else {
                    0.0
                }
            } else {
                (y - band.top) / span
            }
        })
    }
}
