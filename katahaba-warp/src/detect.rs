use image::DynamicImage;

use crate::error::{Result, WarpError};
use crate::geometry::Rect;
use crate::mask::Mask;

/// Candidate face returned by a multi-face detector backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub score: f32,
}

/// Pluggable face detection backend.
///
/// The image handed in is already orientation-normalised by the capture
/// layer; the returned rectangle is in its pixel coordinates.
pub trait FaceDetector: Send + Sync {
    fn detect_face(&self, image: &DynamicImage) -> Result<Rect>;
}

/// Pluggable person segmentation backend. The mask may be at any
/// resolution; it is resampled to the photo's size before use.
pub trait PersonSegmenter: Send + Sync {
    fn detect_person_mask(&self, image: &DynamicImage) -> Result<Mask>;
}

/// Reduce detector candidates to the single face the effect targets:
/// highest score, larger area on ties. Degenerate boxes are ignored.
pub fn primary_face(detections: &[Detection]) -> Option<Rect> {
    detections
        .iter()
        .filter(|d| !d.rect.is_degenerate() && d.score.is_finite())
        .max_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then(a.rect.area().total_cmp(&b.rect.area()))
        })
        .map(|d| d.rect)
}

/// Detector that reports a face rectangle known ahead of time, e.g. from the
/// command line or a sidecar file. `None` means "no face".
#[derive(Debug, Clone, Default)]
pub struct StaticFaceDetector {
    face: Option<Rect>,
}

impl StaticFaceDetector {
    pub fn new(face: Option<Rect>) -> Self {
        Self { face }
    }

    /// Pick the primary face out of a list of candidates.
    pub fn from_detections(detections: &[Detection]) -> Self {
        Self::new(primary_face(detections))
    }
}

impl FaceDetector for StaticFaceDetector {
    fn detect_face(&self, _image: &DynamicImage) -> Result<Rect> {
        self.face.ok_or(WarpError::NoFaceDetected)
    }
}

/// Segmenter backed by a precomputed mask. Without one, the whole frame is
/// treated as person.
#[derive(Debug, Clone, Default)]
pub struct StaticSegmenter {
    mask: Option<Mask>,
}

impl StaticSegmenter {
    pub fn new(mask: Mask) -> Self {
        Self { mask: Some(mask) }
    }

    pub fn whole_frame() -> Self {
        Self { mask: None }
    }
}

impl PersonSegmenter for StaticSegmenter {
    fn detect_person_mask(&self, image: &DynamicImage) -> Result<Mask> {
        match &self.mask {
            Some(mask) if mask.width() == 0 || mask.height() == 0 => Err(
                WarpError::SegmentationFailed("segmentation mask is empty".to_string()),
            ),
            Some(mask) => Ok(mask.clone()),
            None => Ok(Mask::filled(image.width(), image.height(), 1.0)),
        }
    }
}
