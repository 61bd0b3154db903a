//! Compression level to codec parameter mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

impl CompressionLevel {
    pub const ALL: [CompressionLevel; 3] = [Self::Low, Self::Medium, Self::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::Medium
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(CompressionLevel::Low),
            "medium" => Ok(CompressionLevel::Medium),
            "high" => Ok(CompressionLevel::High),
            other => Err(format!("unknown compression level {:?}", other)),
        }
    }
}

/// What the codec is asked to do for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecParameters {
    /// Level the parameters were derived from.
    pub level: CompressionLevel,
    /// Image quality factor in (0, 1].
    pub image_quality: f32,
    /// Resample target; `None` keeps image resolution.
    pub target_dpi: Option<u32>,
}

impl CodecParameters {
    /// JPEG quality on the 1..=100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        (self.image_quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Expected `compressed / original` ratio for estimated results.
    pub fn expected_ratio(&self) -> f64 {
        expected_ratio_for(self.level)
    }
}

pub fn parameters_for(level: CompressionLevel) -> CodecParameters {
    let (image_quality, target_dpi) = match level {
        CompressionLevel::Low => (0.70, None),
        CompressionLevel::Medium => (0.50, Some(150)),
        CompressionLevel::High => (0.30, Some(96)),
    };
    CodecParameters {
        level,
        image_quality,
        target_dpi,
    }
}

pub fn expected_ratio_for(level: CompressionLevel) -> f64 {
    match level {
        CompressionLevel::Low => 0.70,
        CompressionLevel::Medium => 0.50,
        CompressionLevel::High => 0.30,
    }
}

/// Size the simulated path reports for `original_size` bytes.
pub fn expected_compressed_size(original_size: u64, level: CompressionLevel) -> u64 {
    (original_size as f64 * expected_ratio_for(level)).round() as u64
}

/// `round((1 - compressed / original) * 100)`. Negative when the output grew.
pub fn reduction_percent(original_size: u64, compressed_size: u64) -> i64 {
    if original_size == 0 {
        return 0;
    }
    let ratio = compressed_size as f64 / original_size as f64;
    ((1.0 - ratio) * 100.0).round() as i64
}
