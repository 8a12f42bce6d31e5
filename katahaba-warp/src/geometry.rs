use std::ops::{Add, Sub};

use crate::error::{Result, WarpError};
use crate::settings::WarpSettings;

/// Diameter of the inner guide ring relative to the outer indicator ring.
pub const INNER_RING_RATIO: f32 = 0.6;

/// A point (or displacement) in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(&self, other: Point) -> f32 {
        (*self - other).length()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned box in image pixel coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn midpoint(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Zero area, negative extent or non-finite coordinates.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite();
        !finite || self.width <= 0.0 || self.height <= 0.0
    }

    /// Grow (or shrink) the box about its midpoint by `factor`.
    pub fn expanded(&self, factor: f32) -> Rect {
        let dw = self.width * (factor - 1.0) / 2.0;
        let dh = self.height * (factor - 1.0) / 2.0;
        Rect::new(
            self.x - dw,
            self.y - dh,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Intersection with the `width` x `height` image canvas. A box lying
    /// completely outside collapses to zero size.
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let (w, h) = (width as f32, height as f32);
        let x0 = self.x.clamp(0.0, w);
        let y0 = self.y.clamp(0.0, h);
        let x1 = self.max_x().clamp(0.0, w);
        let y1 = self.max_y().clamp(0.0, h);
        Rect::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }
}

/// User-tunable effect parameters, owned by the effect controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectParams {
    /// Effect strength in [0, 1].
    pub intensity: f32,
    /// Effect radius as a fraction of the face width.
    pub face_effect_radius: f32,
    /// Manual displacement of the effect centre, in pixels.
    pub center_offset: Point,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            intensity: 0.7,
            face_effect_radius: 0.4,
            center_offset: Point::default(),
        }
    }
}

/// Vertical interval below the face where the shoulder gradient ramps up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShoulderBand {
    pub top: f32,
    pub bottom: f32,
}

/// Geometry derived from one face rectangle and one parameter snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionGeometry {
    pub face: Rect,
    pub center: Point,
    pub effect_radius: f32,
    pub shoulder_band: ShoulderBand,
}

/// Derive the effect centre, radius and shoulder band for `face`.
///
/// `face` is expected to be clamped to the image already; a degenerate box
/// yields [`WarpError::InvalidRegion`].
pub fn derive_geometry(
    face: &Rect,
    params: &EffectParams,
    settings: &WarpSettings,
) -> Result<RegionGeometry> {
    if face.is_degenerate() {
        return Err(WarpError::InvalidRegion);
    }

    let center = face.midpoint() + params.center_offset;
    if !center.x.is_finite() || !center.y.is_finite() {
        return Err(WarpError::InvalidRegion);
    }

    // f32::max/min instead of clamp: settings come from user config and
    // clamp panics on inverted bounds.
    let lo = settings.min_radius_factor.min(settings.max_radius_factor);
    let hi = settings.max_radius_factor.max(settings.min_radius_factor);
    let factor = params.face_effect_radius.max(lo).min(hi);
    let effect_radius = face.width * factor;
    if !effect_radius.is_finite() || effect_radius <= 0.0 {
        return Err(WarpError::InvalidRegion);
    }

    let shoulder_band = ShoulderBand {
        top: face.max_y(),
        bottom: face.max_y() + face.height * settings.shoulder_band_factor.max(0.0),
    };

    Ok(RegionGeometry {
        face: *face,
        center,
        effect_radius,
        shoulder_band,
    })
}

/// Range indicator drawn over the photo while the radius slider moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorGeometry {
    pub center: Point,
    pub outer_diameter: f32,
    pub inner_diameter: f32,
}

impl IndicatorGeometry {
    pub fn from_geometry(geometry: &RegionGeometry) -> Self {
        let outer = geometry.effect_radius * 2.0;
        Self {
            center: geometry.center,
            outer_diameter: outer,
            inner_diameter: outer * INNER_RING_RATIO,
        }
    }

    /// Map image coordinates into a view that shows the photo scaled to fit
    /// (aspect preserved, letterboxed and centred).
    pub fn fit_to_view(&self, image_size: (u32, u32), view_size: (f32, f32)) -> Self {
        let (iw, ih) = (image_size.0 as f32, image_size.1 as f32);
        if iw <= 0.0 || ih <= 0.0 {
            return *self;
        }
        let scale = (view_size.0 / iw).min(view_size.1 / ih);
        let offset = Point::new(
            (view_size.0 - iw * scale) / 2.0,
            (view_size.1 - ih * scale) / 2.0,
        );
        Self {
            center: Point::new(
                self.center.x * scale + offset.x,
                self.center.y * scale + offset.y,
            ),
            outer_diameter: self.outer_diameter * scale,
            inner_diameter: self.inner_diameter * scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> WarpSettings {
        WarpSettings::default()
    }

    #[test]
    fn test_center_and_radius() {
        let face = Rect::new(100.0, 100.0, 200.0, 200.0);
        let params = EffectParams {
            intensity: 1.0,
            face_effect_radius: 0.4,
            center_offset: Point::default(),
        };
        let g = derive_geometry(&face, &params, &settings()).unwrap();
        assert_eq!(g.center, Point::new(200.0, 200.0));
        assert!((g.effect_radius - 80.0).abs() < 1e-4);
        assert_eq!(g.shoulder_band.top, 300.0);
        assert_eq!(g.shoulder_band.bottom, 400.0);
    }

    #[test]
    fn test_center_offset_translates() {
        let face = Rect::new(100.0, 100.0, 200.0, 200.0);
        let base = EffectParams::default();
        let shifted = EffectParams {
            center_offset: Point::new(20.0, 0.0),
            ..base
        };
        let a = derive_geometry(&face, &base, &settings()).unwrap();
        let b = derive_geometry(&face, &shifted, &settings()).unwrap();
        assert_eq!(b.center - a.center, Point::new(20.0, 0.0));
        assert_eq!(a.effect_radius, b.effect_radius);
        assert_eq!(a.shoulder_band, b.shoulder_band);
    }

    #[test]
    fn test_radius_factor_is_clamped() {
        let face = Rect::new(0.0, 0.0, 100.0, 100.0);
        let tiny = EffectParams {
            face_effect_radius: 0.0,
            ..EffectParams::default()
        };
        let huge = EffectParams {
            face_effect_radius: 5.0,
            ..EffectParams::default()
        };
        let g = derive_geometry(&face, &tiny, &settings()).unwrap();
        assert!((g.effect_radius - 20.0).abs() < 1e-4);
        let g = derive_geometry(&face, &huge, &settings()).unwrap();
        assert!((g.effect_radius - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_face_is_invalid() {
        let params = EffectParams::default();
        for face in [
            Rect::new(10.0, 10.0, 0.0, 50.0),
            Rect::new(10.0, 10.0, 50.0, 0.0),
            Rect::new(10.0, 10.0, -5.0, 50.0),
            Rect::new(f32::NAN, 10.0, 50.0, 50.0),
        ] {
            assert_eq!(
                derive_geometry(&face, &params, &settings()),
                Err(WarpError::InvalidRegion)
            );
        }
    }

    #[test]
    fn test_clamp_to_image() {
        let r = Rect::new(-20.0, 50.0, 100.0, 100.0).clamp_to(60, 120);
        assert_eq!(r, Rect::new(0.0, 50.0, 60.0, 70.0));

        // Entirely outside collapses to nothing
        let r = Rect::new(500.0, 500.0, 10.0, 10.0).clamp_to(100, 100);
        assert!(r.is_degenerate());
    }

    #[test]
    fn test_expansion_keeps_midpoint() {
        let r = Rect::new(100.0, 100.0, 200.0, 100.0);
        let e = r.expanded(1.2);
        assert!(e.midpoint().distance(r.midpoint()) < 1e-3);
        assert!((e.width - 240.0).abs() < 1e-4);
        assert!((e.height - 120.0).abs() < 1e-4);
    }

    #[test]
    fn test_indicator_fit_to_view() {
        let face = Rect::new(100.0, 100.0, 200.0, 200.0);
        let g = derive_geometry(&face, &EffectParams::default(), &settings()).unwrap();
        let ind = IndicatorGeometry::from_geometry(&g);
        assert!((ind.outer_diameter - 160.0).abs() < 1e-4);
        assert!((ind.inner_diameter - 96.0).abs() < 1e-4);

        // 400x800 photo in a 400x400 view: scale 0.5, pillarboxed by 100 each side
        let v = ind.fit_to_view((400, 800), (400.0, 400.0));
        assert!((v.center.x - 200.0).abs() < 1e-4);
        assert!((v.center.y - 100.0).abs() < 1e-4);
        assert!((v.outer_diameter - 80.0).abs() < 1e-4);
    }
}
