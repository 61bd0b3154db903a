use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::CodecKind;
use crate::policy::CompressionLevel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub codec: Codec,
    #[serde(default)]
    pub simulated: Simulated,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Codec {
    /// The simulated codec is only ever used when named here or on the
    /// command line.
    pub kind: CodecKind,
    pub default_level: CompressionLevel,
}

impl Default for Codec {
    fn default() -> Self {
        Self {
            kind: CodecKind::Lopdf,
            default_level: CompressionLevel::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Simulated {
    pub tick_ms: u64,
    pub step_percent: u32,
}

impl Default for Simulated {
    fn default() -> Self {
        Self {
            tick_ms: 120,
            step_percent: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
