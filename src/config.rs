//! Generator configuration.
//!
//! Every field has a default, so a config file only needs the keys it changes. None of these
//! knobs change the encoding algorithm; they are policy (default level, margins, timing).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::encoder::EncodeOptions;
use crate::error::{QrError, Result};
use crate::qrcode::{QrCodeEcc, Version};

/// Largest accepted `quiet_zone`, in modules.
pub const MAX_QUIET_ZONE: u32 = 64;
/// Largest accepted `pixels_per_module`.
pub const MAX_PIXELS_PER_MODULE: u32 = 256;
/// Largest accepted `target_width`, in pixels.
pub const MAX_TARGET_WIDTH: u32 = 16_384;

/// Settings for the pipeline and the generation controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Requested error correction level; lowered automatically if the text does not fit.
    pub error_correction: QrCodeEcc,
    /// Raise the level while the data still fits the chosen version.
    pub boost_error_correction: bool,
    /// Smallest version to use (1–40).
    pub min_version: u8,
    /// Light margin around the symbol, in modules.
    pub quiet_zone: u32,
    /// Fixed scale. When absent the scale is derived from `target_width`.
    pub pixels_per_module: Option<u32>,
    /// Desired image width in pixels, used when `pixels_per_module` is absent.
    pub target_width: u32,
    /// Quiet period after the last input change before generating.
    pub debounce_ms: u64,
    /// Color used before the caller picks one, and when a picked one cannot be parsed.
    pub dark_color: String,
    pub light_color: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            error_correction: QrCodeEcc::Medium,
            boost_error_correction: false,
            min_version: 1,
            quiet_zone: 4,
            pixels_per_module: None,
            target_width: 256,
            debounce_ms: 300,
            dark_color: "#000000".to_string(),
            light_color: "#ADFF2F".to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Parses a JSON document and validates it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks ranges that serde cannot express.
    ///
    /// The upper bounds keep the image side, `(177 + 2 * quiet_zone) * pixels_per_module` at
    /// version 40, well inside `u32`.
    pub fn validate(&self) -> Result<()> {
        if Version::try_new(self.min_version).is_none() {
            let msg = format!("min_version {} is outside 1..=40", self.min_version);
            return Err(QrError::Config(msg));
        }
        if self.quiet_zone > MAX_QUIET_ZONE {
            let msg = format!("quiet_zone {} exceeds {}", self.quiet_zone, MAX_QUIET_ZONE);
            return Err(QrError::Config(msg));
        }
        match self.pixels_per_module {
            Some(0) => {
                return Err(QrError::Config("pixels_per_module must be at least 1".into()));
            }
            Some(n) if n > MAX_PIXELS_PER_MODULE => {
                let msg = format!("pixels_per_module {} exceeds {}", n, MAX_PIXELS_PER_MODULE);
                return Err(QrError::Config(msg));
            }
            _ => {}
        }
        if self.pixels_per_module.is_none() && self.target_width == 0 {
            return Err(QrError::Config("target_width must be at least 1".into()));
        }
        if self.target_width > MAX_TARGET_WIDTH {
            let msg = format!("target_width {} exceeds {}", self.target_width, MAX_TARGET_WIDTH);
            return Err(QrError::Config(msg));
        }
        crate::color::parse_hex(&self.dark_color)
            .and(crate::color::parse_hex(&self.light_color))
            .map_err(|e| QrError::Config(format!("default color: {}", e)))?;
        Ok(())
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions {
            ecl: self.error_correction,
            min_version: Version::try_new(self.min_version).unwrap_or(Version::MIN),
            boost_ecl: self.boost_error_correction,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Scale for a symbol of `side` modules.
    pub fn pixels_per_module_for(&self, side: usize) -> u32 {
        self.pixels_per_module.unwrap_or_else(|| {
            crate::render::pixels_per_module_for(side, self.quiet_zone, self.target_width)
        })
    }
}
