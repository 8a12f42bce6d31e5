/// Tunable constants of the slimming effect.
///
/// Radius factors are fractions of the (expanded) face width, the shoulder
/// band factor is a fraction of the face height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpSettings {
    /// Face scale at full intensity (0.65 = 35% smaller).
    pub base_face_scale: f32,
    /// Horizontal shoulder scale at full intensity (1.25 = 25% wider).
    pub base_shoulder_scale: f32,
    pub min_radius_factor: f32,
    pub max_radius_factor: f32,
    pub shoulder_band_factor: f32,
    /// Growth applied to the detector's face box about its midpoint.
    pub face_expansion: f32,
    pub shoulders_enabled: bool,
}

impl Default for WarpSettings {
    fn default() -> Self {
        Self {
            base_face_scale: 0.65,
            base_shoulder_scale: 1.25,
            min_radius_factor: 0.2,
            max_radius_factor: 0.6,
            shoulder_band_factor: 0.5,
            face_expansion: 1.2,
            shoulders_enabled: false,
        }
    }
}

impl WarpSettings {
    /// Face scale for a given intensity: 1.0 at zero, `base_face_scale` at one.
    pub fn face_scale(&self, intensity: f32) -> f32 {
        let t = intensity.clamp(0.0, 1.0);
        1.0 - (1.0 - self.base_face_scale) * t
    }

    /// Horizontal shoulder scale for a given intensity.
    pub fn shoulder_scale(&self, intensity: f32) -> f32 {
        let t = intensity.clamp(0.0, 1.0);
        1.0 + (self.base_shoulder_scale - 1.0) * t
    }
}
