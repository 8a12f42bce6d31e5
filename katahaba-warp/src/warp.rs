//! Radial inverse-warp field.
//!
//! For every destination pixel inside the effect circle we compute the
//! position to sample from in the source image. The scale factor decays to
//! 1.0 at the circle's edge through a raised-cosine falloff, so the warped
//! region blends into the untouched image without a second blend pass.

use std::f32::consts::PI;

use image::{ImageBuffer, Pixel, Rgba};

use crate::error::{Result, WarpError};
use crate::geometry::{Point, RegionGeometry};

/// Pixel buffer with the channel layout of `P`.
pub type Buffer<P> = ImageBuffer<P, Vec<<P as Pixel>::Subpixel>>;

/// RGBA pixels the warp can resample. Channels are blended in `f32` and
/// written back at the buffer's own depth, so 16-bit and float photos keep
/// their precision.
pub trait WarpPixel: Pixel {
    fn channel_to_f32(value: Self::Subpixel) -> f32;
    fn channel_from_f32(value: f32) -> Self::Subpixel;
}

impl WarpPixel for Rgba<u8> {
    fn channel_to_f32(value: u8) -> f32 {
        value as f32
    }

    fn channel_from_f32(value: f32) -> u8 {
        value.round().clamp(0.0, u8::MAX as f32) as u8
    }
}

impl WarpPixel for Rgba<u16> {
    fn channel_to_f32(value: u16) -> f32 {
        value as f32
    }

    fn channel_from_f32(value: f32) -> u16 {
        value.round().clamp(0.0, u16::MAX as f32) as u16
    }
}

// Float photos may carry values outside [0, 1]; keep them.
impl WarpPixel for Rgba<f32> {
    fn channel_to_f32(value: f32) -> f32 {
        value
    }

    fn channel_from_f32(value: f32) -> f32 {
        value
    }
}

/// Below this distance from the centre a pixel maps onto itself.
const MIN_DISTANCE: f32 = 1e-4;
/// Scales this close to 1.0 are treated as a no-op.
const SCALE_EPSILON: f32 = 1e-6;

/// Falloff weight for a normalised distance `t = distance / radius`.
///
/// 1 at the centre, 0 at the boundary, with zero slope at both ends.
pub fn falloff(t: f32) -> f32 {
    if t <= 0.0 {
        1.0
    } else if t >= 1.0 {
        0.0
    } else {
        0.5 * (1.0 + (PI * t).cos())
    }
}

/// Scale actually applied at `distance` from the centre:
/// `lerp(scale, 1.0, 1 - w)`.
pub fn effective_scale(distance: f32, radius: f32, scale: f32) -> f32 {
    if radius <= 0.0 || distance >= radius {
        return 1.0;
    }
    let w = falloff(distance / radius);
    scale + (1.0 - scale) * (1.0 - w)
}

/// Source coordinate for destination `pixel`. Not clamped to the image.
pub fn sample(pixel: Point, center: Point, radius: f32, scale: f32) -> Point {
    let d = pixel - center;
    let distance = d.length();
    if distance >= radius || distance < MIN_DISTANCE || (scale - 1.0).abs() < SCALE_EPSILON {
        return pixel;
    }
    let source_distance = distance / effective_scale(distance, radius, scale);
    Point::new(
        center.x + d.x / distance * source_distance,
        center.y + d.y / distance * source_distance,
    )
}

/// A validated (center, radius, scale) triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpField {
    center: Point,
    radius: f32,
    scale: f32,
}

impl WarpField {
    pub fn new(center: Point, radius: f32, scale: f32) -> Result<Self> {
        if !center.x.is_finite() || !center.y.is_finite() {
            return Err(WarpError::numeric("warp field", "non-finite center"));
        }
        if !radius.is_finite() || radius <= 0.0 {
            return Err(WarpError::numeric(
                "warp field",
                format!("radius must be positive, got {}", radius),
            ));
        }
        if !scale.is_finite() || scale <= 0.0 {
            return Err(WarpError::numeric(
                "warp field",
                format!("scale must be positive, got {}", scale),
            ));
        }
        Ok(Self {
            center,
            radius,
            scale,
        })
    }

    pub fn from_geometry(geometry: &RegionGeometry, scale: f32) -> Result<Self> {
        Self::new(geometry.center, geometry.effect_radius, scale)
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_identity(&self) -> bool {
        (self.scale - 1.0).abs() < SCALE_EPSILON
    }

    pub fn sample(&self, pixel: Point) -> Point {
        sample(pixel, self.center, self.radius, self.scale)
    }

    /// Like [`WarpField::sample`] but clamped to a `width` x `height` image.
    pub fn source_within(&self, pixel: Point, width: u32, height: u32) -> Point {
        let src = self.sample(pixel);
        Point::new(
            src.x.clamp(0.0, width.saturating_sub(1) as f32),
            src.y.clamp(0.0, height.saturating_sub(1) as f32),
        )
    }

    /// Inclusive pixel bounds `(x0, y0, x1, y1)` of the effect circle within
    /// the image, or `None` if they do not overlap.
    fn pixel_bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let max_x = width.checked_sub(1)? as f32;
        let max_y = height.checked_sub(1)? as f32;
        let x0 = (self.center.x - self.radius).floor();
        let y0 = (self.center.y - self.radius).floor();
        let x1 = (self.center.x + self.radius).ceil();
        let y1 = (self.center.y + self.radius).ceil();
        if x1 < 0.0 || y1 < 0.0 || x0 > max_x || y0 > max_y {
            return None;
        }
        Some((
            x0.max(0.0) as u32,
            y0.max(0.0) as u32,
            x1.min(max_x) as u32,
            y1.min(max_y) as u32,
        ))
    }
}

/// Resample `image` through `field`. Returns a new buffer of the same size;
/// only pixels within the effect circle are recomputed.
pub fn warp_image<P: WarpPixel>(image: &Buffer<P>, field: &WarpField) -> Buffer<P> {
    let mut output = image.clone();
    if field.is_identity() {
        return output;
    }
    let (width, height) = image.dimensions();
    let Some((x0, y0, x1, y1)) = field.pixel_bounds(width, height) else {
        return output;
    };

    log::debug!(
        "warping region x={}..={} y={}..={} scale={:.3}",
        x0,
        x1,
        y0,
        y1,
        field.scale
    );

    for y in y0..=y1 {
        for x in x0..=x1 {
            let pixel = Point::new(x as f32, y as f32);
            let src = field.source_within(pixel, width, height);
            if src == pixel {
                continue;
            }
            output.put_pixel(x, y, sample_bilinear(image, src.x, src.y));
        }
    }

    output
}

/// Bilinear sample with edge clamping.
pub fn sample_bilinear<P: WarpPixel>(img: &Buffer<P>, x: f32, y: f32) -> P {
    let (w, h) = img.dimensions();
    let x = x.clamp(0.0, w.saturating_sub(1) as f32);
    let y = y.clamp(0.0, h.saturating_sub(1) as f32);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0).channels();
    let p10 = img.get_pixel(x1, y0).channels();
    let p01 = img.get_pixel(x0, y1).channels();
    let p11 = img.get_pixel(x1, y1).channels();

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let mut out = *img.get_pixel(x0, y0);
    for (c, v) in out.channels_mut().iter_mut().enumerate() {
        let value = P::channel_to_f32(p00[c]) * w00
            + P::channel_to_f32(p10[c]) * w10
            + P::channel_to_f32(p01[c]) * w01
            + P::channel_to_f32(p11[c]) * w11;
        *v = P::channel_from_f32(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn gradient_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[test]
    fn test_falloff_endpoints_are_flat() {
        assert_eq!(falloff(0.0), 1.0);
        assert_eq!(falloff(1.0), 0.0);
        let h = 1e-3;
        assert!((falloff(h) - 1.0).abs() < 1e-4);
        assert!(falloff(1.0 - h) < 1e-4);
        // Monotonically decreasing
        let mut prev = falloff(0.0);
        for i in 1..=100 {
            let w = falloff(i as f32 / 100.0);
            assert!(w <= prev);
            prev = w;
        }
    }

    #[test]
    fn test_identity_at_unit_scale() {
        let center = Point::new(50.0, 40.0);
        for y in 0..80 {
            for x in 0..100 {
                let p = Point::new(x as f32, y as f32);
                assert_eq!(sample(p, center, 30.0, 1.0), p);
            }
        }
    }

    #[test]
    fn test_outside_radius_untouched() {
        let center = Point::new(0.0, 0.0);
        let p = Point::new(30.0, 40.0);
        assert_eq!(sample(p, center, 50.0, 0.65), p);
        assert_eq!(sample(p, center, 10.0, 0.65), p);
    }

    #[test]
    fn test_center_maps_to_itself() {
        let center = Point::new(200.0, 200.0);
        assert_eq!(sample(center, center, 80.0, 0.65), center);
    }

    #[test]
    fn test_boundary_continuity() {
        for radius in [1.0f32, 10.0, 80.0, 500.0] {
            let eps = radius * 1e-4;
            let inside = effective_scale(radius - eps, radius, 0.65);
            let outside = effective_scale(radius + eps, radius, 0.65);
            assert!(
                (inside - outside).abs() < 1e-4,
                "seam at radius {}: {} vs {}",
                radius,
                inside,
                outside
            );
        }
    }

    #[test]
    fn test_shrink_samples_farther_out() {
        let center = Point::new(200.0, 200.0);
        let radius = 80.0;
        let p = Point::new(240.0, 200.0);
        let src = sample(p, center, radius, 0.65);
        assert!(src.distance(center) > p.distance(center));
        // Stays on the same ray
        assert!((src.y - 200.0).abs() < 1e-4);
        assert!(src.x > 240.0);
    }

    #[test]
    fn test_enlarge_samples_closer_in() {
        let center = Point::new(0.0, 0.0);
        let p = Point::new(0.0, 20.0);
        let src = sample(p, center, 80.0, 1.3);
        assert!(src.distance(center) < p.distance(center));
    }

    #[test]
    fn test_displacement_grows_with_intensity() {
        let center = Point::new(100.0, 100.0);
        let radius = 60.0;
        let p = Point::new(100.0 + radius / 4.0, 100.0);
        let mut prev = 0.0;
        for step in 1..=10 {
            let intensity = step as f32 / 10.0;
            let scale = 1.0 - (1.0 - 0.65) * intensity;
            let displacement = sample(p, center, radius, scale).distance(p);
            assert!(displacement > prev);
            prev = displacement;
        }
    }

    #[test]
    fn test_field_rejects_bad_parameters() {
        let c = Point::new(10.0, 10.0);
        assert!(WarpField::new(c, 0.0, 0.65).is_err());
        assert!(WarpField::new(c, 10.0, 0.0).is_err());
        assert!(WarpField::new(c, 10.0, f32::NAN).is_err());
        assert!(WarpField::new(Point::new(f32::INFINITY, 0.0), 10.0, 0.65).is_err());
        assert!(WarpField::new(c, 10.0, 0.65).is_ok());
    }

    #[test]
    fn test_source_is_clamped_to_image() {
        // Centre near the edge: shrink pulls samples from outside the canvas
        let field = WarpField::new(Point::new(2.0, 2.0), 40.0, 0.3).unwrap();
        for y in 0..20 {
            for x in 0..20 {
                let src = field.source_within(Point::new(x as f32, y as f32), 20, 20);
                assert!(src.x >= 0.0 && src.x <= 19.0);
                assert!(src.y >= 0.0 && src.y <= 19.0);
            }
        }
    }

    #[test]
    fn test_warp_image_identity_and_locality() {
        let img = gradient_image(64, 48);

        let identity = WarpField::new(Point::new(32.0, 24.0), 16.0, 1.0).unwrap();
        assert_eq!(warp_image(&img, &identity), img);

        let field = WarpField::new(Point::new(32.0, 24.0), 16.0, 0.65).unwrap();
        let out = warp_image(&img, &field);
        assert_eq!(out.dimensions(), img.dimensions());
        let mut changed = 0;
        for (x, y, px) in out.enumerate_pixels() {
            let d = Point::new(x as f32, y as f32).distance(field.center());
            if d >= 16.0 {
                assert_eq!(px, img.get_pixel(x, y));
            } else if px != img.get_pixel(x, y) {
                changed += 1;
            }
        }
        assert!(changed > 0);
    }

    #[test]
    fn test_warp_image_circle_off_canvas() {
        let img = gradient_image(16, 16);
        let field = WarpField::new(Point::new(-100.0, -100.0), 20.0, 0.65).unwrap();
        assert_eq!(warp_image(&img, &field), img);
    }

    #[test]
    fn test_bilinear_interpolation() {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([100, 0, 0, 255]));
        img.put_pixel(0, 1, Rgba([200, 0, 0, 255]));
        img.put_pixel(1, 1, Rgba([50, 0, 0, 255]));

        assert_eq!(sample_bilinear(&img, 1.0, 0.0)[0], 100);
        // (0+100+200+50)/4 = 87.5
        assert_eq!(sample_bilinear(&img, 0.5, 0.5)[0], 88);
        // Outside samples clamp to the edge
        assert_eq!(sample_bilinear(&img, -5.0, 9.0)[0], 200);
    }

    #[test]
    fn test_bilinear_keeps_16_bit_precision() {
        let img = Buffer::<Rgba<u16>>::from_fn(2, 1, |x, _| {
            Rgba([if x == 0 { 1000 } else { 1003 }, 40001, 0, u16::MAX])
        });
        let p = sample_bilinear(&img, 1.0 / 3.0, 0.0);
        assert_eq!(p, Rgba([1001, 40001, 0, u16::MAX]));
    }
}
