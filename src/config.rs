use anyhow::{Context, Result};
use katahaba_warp::{EffectParams, Point, WarpSettings};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(path) = option_env!("KATAHABA_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    directories::ProjectDirs::from("", "", "katahaba")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("katahaba.toml"))
});

/// Where saved photos go when neither the CLI nor the config names a place.
pub static PHOTO_DIR: Lazy<PathBuf> = Lazy::new(|| {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.picture_dir().map(|p| p.join("Katahaba")))
        .unwrap_or_else(|| PathBuf::from("katahaba-photos"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub intensity: f32,
    pub face_effect_radius: f32,
    pub output_dir: Option<PathBuf>,
    /// File extension of saved photos; decides the encoder.
    pub format: String,
    pub warp: WarpConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    pub base_face_scale: f32,
    pub base_shoulder_scale: f32,
    pub min_radius_factor: f32,
    pub max_radius_factor: f32,
    pub shoulder_band_factor: f32,
    pub face_expansion: f32,
    pub shoulders_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        let params = EffectParams::default();
        Self {
            intensity: params.intensity,
            face_effect_radius: params.face_effect_radius,
            output_dir: None,
            format: "png".to_string(),
            warp: WarpConfig::default(),
        }
    }
}

impl Default for WarpConfig {
    fn default() -> Self {
        let s = WarpSettings::default();
        Self {
            base_face_scale: s.base_face_scale,
            base_shoulder_scale: s.base_shoulder_scale,
            min_radius_factor: s.min_radius_factor,
            max_radius_factor: s.max_radius_factor,
            shoulder_band_factor: s.shoulder_band_factor,
            face_expansion: s.face_expansion,
            shoulders_enabled: s.shoulders_enabled,
        }
    }
}

impl Config {
    pub fn warp_settings(&self) -> WarpSettings {
        WarpSettings {
            base_face_scale: self.warp.base_face_scale,
            base_shoulder_scale: self.warp.base_shoulder_scale,
            min_radius_factor: self.warp.min_radius_factor,
            max_radius_factor: self.warp.max_radius_factor,
            shoulder_band_factor: self.warp.shoulder_band_factor,
            face_expansion: self.warp.face_expansion,
            shoulders_enabled: self.warp.shoulders_enabled,
        }
    }

    pub fn effect_params(&self) -> EffectParams {
        EffectParams {
            intensity: self.intensity,
            face_effect_radius: self.face_effect_radius,
            center_offset: Point::default(),
        }
    }

    pub fn photo_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(PHOTO_DIR.as_path())
    }

    /// Read the config at `path`. A file that does not exist yet means
    /// defaults; anything else that goes wrong is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading config at {}", path.display()))
            }
        };
        let cfg: Self =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validated().with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, text).with_context(|| format!("writing config to {}", path.display()))
    }

    /// Reject settings the warp cannot use; pull a stray intensity back
    /// into range.
    fn validated(mut self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.intensity) {
            let clamped = if self.intensity.is_nan() {
                EffectParams::default().intensity
            } else {
                self.intensity.clamp(0.0, 1.0)
            };
            log::warn!("intensity {} out of range, using {}", self.intensity, clamped);
            self.intensity = clamped;
        }
        let w = &self.warp;
        if !(w.min_radius_factor > 0.0 && w.min_radius_factor <= w.max_radius_factor) {
            anyhow::bail!(
                "radius factors must satisfy 0 < min <= max, got {}..{}",
                w.min_radius_factor,
                w.max_radius_factor
            );
        }
        if !(w.face_expansion > 0.0) {
            anyhow::bail!("face_expansion must be positive, got {}", w.face_expansion);
        }
        if !(w.base_face_scale > 0.0 && w.base_shoulder_scale > 0.0) {
            anyhow::bail!("base scales must be positive");
        }
        Ok(self)
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load(path.unwrap_or(CONFIG_PATH.as_path()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    cfg.store(path.unwrap_or(CONFIG_PATH.as_path()))
}
