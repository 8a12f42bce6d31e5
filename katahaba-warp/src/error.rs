use thiserror::Error;

/// Failures the warp engine can hit. None of these escape the effect
/// controller; they only decide whether the effect was applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WarpError {
    #[error("face region is empty or degenerate")]
    InvalidRegion,

    #[error("no face detected in image")]
    NoFaceDetected,

    #[error("face detection failed: {0}")]
    DetectionFailed(String),

    #[error("person segmentation failed: {0}")]
    SegmentationFailed(String),

    #[error("numeric failure in {stage}: {reason}")]
    NumericFailure {
        stage: &'static str,
        reason: String,
    },
}

impl WarpError {
    pub(crate) fn numeric(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::NumericFailure {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WarpError>;
