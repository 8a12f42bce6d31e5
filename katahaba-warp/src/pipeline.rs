use std::sync::Arc;

use image::{ColorType, DynamicImage};

use crate::compositor;
use crate::detect::{FaceDetector, PersonSegmenter};
use crate::error::{Result, WarpError};
use crate::geometry::{derive_geometry, EffectParams, Rect, RegionGeometry};
use crate::mask::Mask;
use crate::settings::WarpSettings;
use crate::warp::{Buffer, WarpPixel};

/// What detection found for one capture. Reused across parameter changes.
#[derive(Debug, Clone)]
pub struct Detected {
    /// Expanded and clamped face box.
    pub face: Rect,
    /// Person segmentation, present when the shoulder stage is enabled.
    pub person_mask: Option<Mask>,
}

/// Output of one render: the image to show/save and whether any effect
/// stage actually ran.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub image: DynamicImage,
    pub applied: bool,
    pub geometry: Option<RegionGeometry>,
}

impl Outcome {
    pub fn unmodified(image: &DynamicImage) -> Self {
        Self {
            image: image.clone(),
            applied: false,
            geometry: None,
        }
    }
}

/// Full pipeline: detect face (and person) → derive geometry → warp → compose
pub struct Pipeline {
    pub detector: Arc<dyn FaceDetector>,
    pub segmenter: Arc<dyn PersonSegmenter>,
    pub settings: WarpSettings,
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        segmenter: Arc<dyn PersonSegmenter>,
        settings: WarpSettings,
    ) -> Self {
        Self {
            detector,
            segmenter,
            settings,
        }
    }

    /// Run the detectors. This is the expensive half of the pipeline and only
    /// runs once per capture.
    pub fn detect(&self, image: &DynamicImage) -> Result<Detected> {
        let raw = self.detector.detect_face(image)?;
        let face = raw
            .expanded(self.settings.face_expansion)
            .clamp_to(image.width(), image.height());
        if face.is_degenerate() {
            return Err(WarpError::InvalidRegion);
        }
        log::debug!("face {:?} expanded and clamped to {:?}", raw, face);

        let person_mask = if self.settings.shoulders_enabled {
            Some(self.segmenter.detect_person_mask(image)?)
        } else {
            None
        };

        Ok(Detected { face, person_mask })
    }

    /// Apply the effect for `params` using earlier detection results. Never
    /// fails: any stage that cannot run leaves its input untouched.
    pub fn render(&self, image: &DynamicImage, detected: &Detected, params: &EffectParams) -> Outcome {
        let geometry = match derive_geometry(&detected.face, params, &self.settings) {
            Ok(g) => g,
            Err(e) => {
                log::warn!("skipping effect: {}", e);
                return Outcome::unmodified(image);
            }
        };

        // Work at the photo's own channel depth so untouched pixels survive
        // the round trip bit for bit.
        let (current, applied) = match image.color() {
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                let (out, applied) =
                    self.run_stages(&image.to_rgba16(), detected, &geometry, params);
                (DynamicImage::ImageRgba16(out), applied)
            }
            ColorType::Rgb32F | ColorType::Rgba32F => {
                let (out, applied) =
                    self.run_stages(&image.to_rgba32f(), detected, &geometry, params);
                (DynamicImage::ImageRgba32F(out), applied)
            }
            _ => {
                let (out, applied) =
                    self.run_stages(&image.to_rgba8(), detected, &geometry, params);
                (DynamicImage::ImageRgba8(out), applied)
            }
        };

        if !applied {
            return Outcome {
                geometry: Some(geometry),
                ..Outcome::unmodified(image)
            };
        }

        Outcome {
            image: restore_color(image, current),
            applied,
            geometry: Some(geometry),
        }
    }

    /// Face stage, then the shoulder stage when a person mask is present.
    fn run_stages<P: WarpPixel>(
        &self,
        buffer: &Buffer<P>,
        detected: &Detected,
        geometry: &RegionGeometry,
        params: &EffectParams,
    ) -> (Buffer<P>, bool) {
        let face_scale = self.settings.face_scale(params.intensity);
        let face = compositor::apply_face(buffer, geometry, face_scale);
        let mut applied = face.applied;
        let mut current = face.image;

        if let Some(mask) = &detected.person_mask {
            let shoulder_scale = self.settings.shoulder_scale(params.intensity);
            let shoulders =
                compositor::apply_shoulders(&current, mask, &geometry.shoulder_band, shoulder_scale);
            applied |= shoulders.applied;
            current = shoulders.image;
        }

        (current, applied)
    }

    /// Detect then render. Detection failures pass the image through.
    pub fn process_image(&self, image: &DynamicImage, params: &EffectParams) -> Outcome {
        match self.detect(image) {
            Ok(detected) => self.render(image, &detected, params),
            Err(e) => {
                log::warn!("detection failed, keeping original: {}", e);
                Outcome::unmodified(image)
            }
        }
    }
}

/// Convert the RGBA working buffer back to the colour model of `original`.
fn restore_color(original: &DynamicImage, out: DynamicImage) -> DynamicImage {
    if out.color() == original.color() {
        return out;
    }
    match original.color() {
        ColorType::Rgb8 => DynamicImage::ImageRgb8(out.to_rgb8()),
        ColorType::L8 => DynamicImage::ImageLuma8(out.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(out.to_luma_alpha8()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(out.to_rgb16()),
        ColorType::L16 => DynamicImage::ImageLuma16(out.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(out.to_luma_alpha16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(out.to_rgb32f()),
        _ => out,
    }
}

/// What the effect controller drives: detection once per capture, then any
/// number of renders against that detection.
pub trait Processor: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Detected>;
    fn render(&self, image: &DynamicImage, detected: &Detected, params: &EffectParams) -> Outcome;
    fn settings(&self) -> &WarpSettings;
}

impl Processor for Pipeline {
    fn detect(&self, image: &DynamicImage) -> Result<Detected> {
        Pipeline::detect(self, image)
    }

    fn render(&self, image: &DynamicImage, detected: &Detected, params: &EffectParams) -> Outcome {
        Pipeline::render(self, image, detected, params)
    }

    fn settings(&self) -> &WarpSettings {
        &self.settings
    }
}
