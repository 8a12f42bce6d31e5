pub mod compositor;
pub mod controller;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod pipeline;
pub mod settings;
pub mod warp;

// Re-export commonly used types
pub use controller::{ControllerEvent, EffectController, EffectState};
pub use detect::{FaceDetector, PersonSegmenter, StaticFaceDetector, StaticSegmenter};
pub use error::WarpError;
pub use geometry::{EffectParams, IndicatorGeometry, Point, Rect, RegionGeometry};
pub use mask::Mask;
pub use pipeline::{Detected, Outcome, Pipeline, Processor};
pub use settings::WarpSettings;
pub use warp::WarpField;
