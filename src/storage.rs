use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Path for a new photo in `dir`, unique per call.
pub fn photo_path(dir: &Path, format: &str) -> PathBuf {
    dir.join(format!("katahaba-{}.{}", uuid::Uuid::new_v4(), format))
}

/// Persist the final image. The encoder is picked from the file extension.
///
/// `expected` is the size of the original capture; saving a buffer of any
/// other size is refused.
pub fn save_photo(image: &DynamicImage, path: &Path, expected: (u32, u32)) -> Result<()> {
    let actual = (image.width(), image.height());
    if actual != expected {
        anyhow::bail!(
            "refusing to save {}x{} image, capture was {}x{}",
            actual.0,
            actual.1,
            expected.0,
            expected.1
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Save into `dir` under a fresh name and return where it went.
pub fn save_to_dir(image: &DynamicImage, dir: &Path, format: &str, expected: (u32, u32)) -> Result<PathBuf> {
    let path = photo_path(dir, format);
    save_photo(image, &path, expected)?;
    Ok(path)
}
