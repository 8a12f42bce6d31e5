pub mod config;
pub mod storage;

// Re-export warp engine types for convenience
pub use katahaba_warp::{
    compositor, controller, detect, geometry, mask, pipeline, warp, ControllerEvent,
    EffectController, EffectParams, EffectState, IndicatorGeometry, Mask, Pipeline, Point, Rect,
    StaticFaceDetector, StaticSegmenter, WarpSettings,
};
