use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use katahaba_warp::detect::{FaceDetector, PersonSegmenter};
use katahaba_warp::geometry::derive_geometry;
use katahaba_warp::{
    EffectParams, Mask, Pipeline, Point, Rect, StaticFaceDetector, StaticSegmenter, WarpError,
    WarpField, WarpSettings,
};

struct BrokenDetector;

impl FaceDetector for BrokenDetector {
    fn detect_face(&self, _image: &DynamicImage) -> katahaba_warp::error::Result<Rect> {
        Err(WarpError::DetectionFailed("model not loaded".to_string()))
    }
}

struct BrokenSegmenter;

impl PersonSegmenter for BrokenSegmenter {
    fn detect_person_mask(&self, _image: &DynamicImage) -> katahaba_warp::error::Result<Mask> {
        Err(WarpError::SegmentationFailed("no person".to_string()))
    }
}

fn selfie(w: u32, h: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
        let checker = if ((x / 10) + (y / 10)) % 2 == 0 { 230 } else { 20 };
        Rgb([checker, (x % 256) as u8, (y % 256) as u8])
    }))
}

fn unexpanded() -> WarpSettings {
    WarpSettings {
        face_expansion: 1.0,
        ..WarpSettings::default()
    }
}

fn pipeline_with(face: Option<Rect>, settings: WarpSettings) -> Pipeline {
    Pipeline::new(
        Arc::new(StaticFaceDetector::new(face)),
        Arc::new(StaticSegmenter::whole_frame()),
        settings,
    )
}

#[test]
fn test_concrete_face_scenario() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let face = Rect::new(100.0, 100.0, 200.0, 200.0);
    let settings = unexpanded();
    let params = EffectParams {
        intensity: 1.0,
        ..EffectParams::default()
    };

    let scale = settings.face_scale(params.intensity);
    assert!((scale - 0.65).abs() < 1e-6);

    let geometry = derive_geometry(&face, &params, &settings)?;
    assert_eq!(geometry.center, Point::new(200.0, 200.0));

    let field = WarpField::from_geometry(&geometry, scale)?;
    let center = field.sample(Point::new(200.0, 200.0));
    assert_eq!(center.distance(geometry.center), 0.0);

    let half = Point::new(200.0 + geometry.effect_radius / 2.0, 200.0);
    let src = field.sample(half);
    assert!(src.distance(geometry.center) > half.distance(geometry.center));

    let pipeline = pipeline_with(Some(face), settings);
    let img = selfie(400, 400);
    let out = pipeline.process_image(&img, &params);
    assert!(out.applied);
    assert_eq!(out.geometry, Some(geometry));
    assert_eq!((out.image.width(), out.image.height()), (400, 400));
    assert_ne!(out.image.as_bytes(), img.as_bytes());
    Ok(())
}

#[test]
fn test_zero_intensity_is_identity() -> Result<()> {
    let img = selfie(200, 160);
    let pipeline = pipeline_with(Some(Rect::new(50.0, 30.0, 80.0, 80.0)), WarpSettings::default());
    let params = EffectParams {
        intensity: 0.0,
        ..EffectParams::default()
    };
    let out = pipeline.process_image(&img, &params);
    assert!(!out.applied);
    assert_eq!(out.image.as_bytes(), img.as_bytes());
    Ok(())
}

#[test]
fn test_no_face_passes_original_through() -> Result<()> {
    let img = selfie(120, 90);
    let pipeline = pipeline_with(None, WarpSettings::default());
    let out = pipeline.process_image(&img, &EffectParams::default());
    assert!(!out.applied);
    assert_eq!(out.image.color(), img.color());
    assert_eq!(out.image.as_bytes(), img.as_bytes());
    assert!(matches!(
        pipeline.detect(&img),
        Err(WarpError::NoFaceDetected)
    ));
    Ok(())
}

#[test]
fn test_detector_errors_degrade_gracefully() -> Result<()> {
    let img = selfie(120, 90);

    let pipeline = Pipeline::new(
        Arc::new(BrokenDetector),
        Arc::new(StaticSegmenter::whole_frame()),
        WarpSettings::default(),
    );
    let out = pipeline.process_image(&img, &EffectParams::default());
    assert!(!out.applied);
    assert_eq!(out.image.as_bytes(), img.as_bytes());

    let pipeline = Pipeline::new(
        Arc::new(StaticFaceDetector::new(Some(Rect::new(30.0, 20.0, 40.0, 40.0)))),
        Arc::new(BrokenSegmenter),
        WarpSettings {
            shoulders_enabled: true,
            ..WarpSettings::default()
        },
    );
    let out = pipeline.process_image(&img, &EffectParams::default());
    assert!(!out.applied);
    assert_eq!(out.image.as_bytes(), img.as_bytes());
    Ok(())
}

#[test]
fn test_shoulders_keep_extent() -> Result<()> {
    let img = selfie(160, 240);
    let settings = WarpSettings {
        shoulders_enabled: true,
        ..WarpSettings::default()
    };
    let pipeline = Pipeline::new(
        Arc::new(StaticFaceDetector::new(Some(Rect::new(50.0, 30.0, 60.0, 60.0)))),
        // Low resolution segmentation, as a model would produce
        Arc::new(StaticSegmenter::new(Mask::filled(16, 24, 1.0))),
        settings,
    );
    let params = EffectParams {
        intensity: 1.0,
        ..EffectParams::default()
    };
    let out = pipeline.process_image(&img, &params);
    assert!(out.applied);
    assert_eq!((out.image.width(), out.image.height()), (160, 240));

    // Bottom rows lie fully inside the shoulder band, so they differ from
    // the input; the top row is above the face and far from the warp.
    let before = img.to_rgb8();
    let after = out.image.to_rgb8();
    assert_eq!(after.get_pixel(5, 0), before.get_pixel(5, 0));
    assert_ne!(after.get_pixel(5, 239), before.get_pixel(5, 239));
    Ok(())
}

#[test]
fn test_center_offset_translates_field() -> Result<()> {
    let face = Rect::new(100.0, 100.0, 200.0, 200.0);
    let settings = unexpanded();
    let base = EffectParams {
        intensity: 1.0,
        ..EffectParams::default()
    };
    let offset = Point::new(20.0, 0.0);
    let moved = EffectParams {
        center_offset: offset,
        ..base
    };
    let scale = settings.face_scale(1.0);

    let a = derive_geometry(&face, &base, &settings)?;
    let b = derive_geometry(&face, &moved, &settings)?;
    assert_eq!(b.center, a.center + offset);

    let fa = WarpField::from_geometry(&a, scale)?;
    let fb = WarpField::from_geometry(&b, scale)?;
    for (dx, dy) in [(10.0, 0.0), (-25.0, 30.0), (0.0, -60.0), (70.0, 70.0)] {
        let p = a.center + Point::new(dx, dy);
        let expected = fa.sample(p) + offset;
        let actual = fb.sample(p + offset);
        assert!(
            actual.distance(expected) < 1e-3,
            "offset field mismatch at ({}, {})",
            dx,
            dy
        );
    }
    Ok(())
}

#[test]
fn test_degenerate_face_skips_warp() -> Result<()> {
    let img = selfie(64, 64);
    let pipeline = pipeline_with(Some(Rect::new(10.0, 10.0, 0.0, 30.0)), WarpSettings::default());
    assert!(matches!(pipeline.detect(&img), Err(WarpError::InvalidRegion)));
    let out = pipeline.process_image(&img, &EffectParams::default());
    assert!(!out.applied);
    assert_eq!(out.image.as_bytes(), img.as_bytes());
    Ok(())
}
