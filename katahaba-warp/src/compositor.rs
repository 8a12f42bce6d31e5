//! Blending of effect stages back onto the photo.
//!
//! Every function here returns a buffer with exactly the extent of its input.
//! When a stage cannot produce an image it hands back the input unchanged and
//! reports `applied = false`.

use image::Pixel;

use crate::error::{Result, WarpError};
use crate::geometry::{RegionGeometry, ShoulderBand};
use crate::mask::Mask;
use crate::warp::{sample_bilinear, warp_image, Buffer, WarpField, WarpPixel};

/// Result of one compositing stage.
#[derive(Clone)]
pub struct Composited<P: WarpPixel> {
    pub image: Buffer<P>,
    pub applied: bool,
}

impl<P: WarpPixel> Composited<P> {
    fn passthrough(image: &Buffer<P>) -> Self {
        Self {
            image: image.clone(),
            applied: false,
        }
    }
}

/// Blend `warped` over `original`. Without a mask the warped buffer wins
/// outright (its falloff is already built in).
pub fn compose<P: WarpPixel>(
    original: &Buffer<P>,
    warped: &Buffer<P>,
    mask: Option<&Mask>,
) -> Buffer<P> {
    if original.dimensions() != warped.dimensions() {
        log::warn!(
            "warped buffer {:?} does not match original {:?}, keeping original",
            warped.dimensions(),
            original.dimensions()
        );
        return original.clone();
    }

    let Some(mask) = mask else {
        return warped.clone();
    };

    let (width, height) = original.dimensions();
    let mask = mask.resized(width, height);
    Buffer::<P>::from_fn(width, height, |x, y| {
        let m = mask.get(x, y);
        let a = original.get_pixel(x, y);
        if m <= 0.0 {
            return *a;
        }
        let b = warped.get_pixel(x, y).channels();
        let mut out = *a;
        for (c, v) in out.channels_mut().iter_mut().enumerate() {
            let value =
                P::channel_to_f32(a.channels()[c]) * (1.0 - m) + P::channel_to_f32(b[c]) * m;
            *v = P::channel_from_f32(value);
        }
        out
    })
}

/// Face slimming: resample through the radial warp field.
pub fn apply_face<P: WarpPixel>(
    image: &Buffer<P>,
    geometry: &RegionGeometry,
    scale: f32,
) -> Composited<P> {
    let field = match WarpField::from_geometry(geometry, scale) {
        Ok(field) => field,
        Err(e) => {
            log::warn!("face stage skipped: {}", e);
            return Composited::passthrough(image);
        }
    };
    if field.is_identity() {
        return Composited::passthrough(image);
    }

    log::debug!(
        "face warp center=({:.1}, {:.1}) radius={:.1} scale={:.3}",
        field.center().x,
        field.center().y,
        field.radius(),
        field.scale()
    );

    let warped = warp_image(image, &field);
    Composited {
        image: compose(image, &warped, None),
        applied: true,
    }
}

/// Stretch horizontally about the image's vertical centre line, keeping the
/// original canvas.
pub fn stretch_horizontal<P: WarpPixel>(image: &Buffer<P>, scale: f32) -> Result<Buffer<P>> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(WarpError::numeric(
            "horizontal stretch",
            format!("scale must be positive, got {}", scale),
        ));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(WarpError::numeric("horizontal stretch", "empty image"));
    }
    if (scale - 1.0).abs() < 1e-6 {
        return Ok(image.clone());
    }

    let cx = width as f32 / 2.0;
    Ok(Buffer::<P>::from_fn(width, height, |x, y| {
        let src_x = cx + (x as f32 + 0.5 - cx) / scale - 0.5;
        sample_bilinear(image, src_x, y as f32)
    }))
}

/// Blend mask for the shoulder stage: person segmentation times a vertical
/// ramp starting at the bottom of the face.
pub fn shoulder_mask(segmentation: &Mask, band: &ShoulderBand, width: u32, height: u32) -> Mask {
    Mask::vertical_gradient(width, height, band).multiply(segmentation)
}

/// Shoulder widening: a horizontally stretched copy blended in where the
/// person is, below the face.
pub fn apply_shoulders<P: WarpPixel>(
    image: &Buffer<P>,
    segmentation: &Mask,
    band: &ShoulderBand,
    scale: f32,
) -> Composited<P> {
    if (scale - 1.0).abs() < 1e-6 {
        return Composited::passthrough(image);
    }
    let stretched = match stretch_horizontal(image, scale) {
        Ok(img) => img,
        Err(e) => {
            log::warn!("shoulder stage skipped: {}", e);
            return Composited::passthrough(image);
        }
    };
    let (width, height) = image.dimensions();
    let mask = shoulder_mask(segmentation, band, width, height);
    Composited {
        image: compose(image, &stretched, Some(&mask)),
        applied: true,
    }
}
