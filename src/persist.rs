//! Calibration files: the binary noise profile plus a TOML file of the
//! levels that calibration derived, stored next to it.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::dsp::calibration::CalibratedLevels;
use crate::dsp::NoiseProfile;

/// `<config dir>/tonebank/noise_profile.bin`, when the platform has one.
pub fn default_profile_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tonebank").join("noise_profile.bin"))
}

pub fn save_profile(path: &Path, profile: &NoiseProfile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, profile.to_bytes())
        .with_context(|| format!("Failed to write noise profile: {}", path.display()))?;
    log::info!("Saved noise profile to {}", path.display());
    Ok(())
}

pub fn load_profile(path: &Path) -> Result<NoiseProfile> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read noise profile: {}", path.display()))?;
    let profile = NoiseProfile::from_bytes(&bytes)
        .with_context(|| format!("Invalid noise profile: {}", path.display()))?;
    log::info!("Loaded noise profile from {}", path.display());
    Ok(profile)
}

/// `noise_profile.bin` -> `noise_profile.toml`.
pub fn levels_path(profile_path: &Path) -> PathBuf {
    profile_path.with_extension("toml")
}

pub fn save_levels(path: &Path, levels: &CalibratedLevels) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string(levels).context("Failed to serialize calibrated levels")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write calibrated levels: {}", path.display()))?;
    log::info!("Saved calibrated levels to {}", path.display());
    Ok(())
}

pub fn load_levels(path: &Path) -> Result<CalibratedLevels> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibrated levels: {}", path.display()))?;
    let levels = toml::from_str(&content)
        .with_context(|| format!("Invalid calibrated levels: {}", path.display()))?;
    log::info!("Loaded calibrated levels from {}", path.display());
    Ok(levels)
}
