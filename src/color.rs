//! Color strings and the named color presets.
//!
//! Rendering never looks at strings; callers resolve them here first.

use image::Rgba;

use crate::error::{QrError, Result};

/// A named foreground/background pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub dark: &'static str,
    pub light: &'static str,
}

pub static PRESETS: [Preset; 6] = [
    Preset { name: "Classic", dark: "#000000", light: "#ffffff" },
    Preset { name: "Ocean", dark: "#1e3a8a", light: "#dbeafe" },
    Preset { name: "Forest", dark: "#166534", light: "#dcfce7" },
    Preset { name: "Sunset", dark: "#dc2626", light: "#fef2f2" },
    Preset { name: "Purple", dark: "#7c3aed", light: "#f3e8ff" },
    Preset { name: "Amber", dark: "#d97706", light: "#fef3c7" },
];

/// Looks a preset up by name, ignoring case.
pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// Parses `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa` (the `#` is optional).
///
/// # Errors
///
/// [`QrError::InvalidColor`] for anything else.
pub fn parse_hex(value: &str) -> Result<Rgba<u8>> {
    let invalid = || QrError::InvalidColor(value.to_owned());
    let hex = value.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).map_err(|_| invalid());
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    match hex.len() {
        3 | 4 => {
            let mut out = [255u8; 4];
            for (i, c) in out.iter_mut().enumerate().take(hex.len()) {
                *c = nibble(i)? * 0x11;
            }
            Ok(Rgba(out))
        }
        6 | 8 => {
            let mut out = [255u8; 4];
            for (i, c) in out.iter_mut().enumerate().take(hex.len() / 2) {
                *c = byte(i * 2)?;
            }
            Ok(Rgba(out))
        }
        _ => Err(invalid()),
    }
}

/// Parses `value`, falling back to `fallback` with a warning when it is not a valid color.
pub fn resolve_or(value: &str, fallback: Rgba<u8>) -> Rgba<u8> {
    match parse_hex(value) {
        Ok(color) => color,
        Err(e) => {
            tracing::warn!(error = %e, "Unusable color, using fallback");
            fallback
        }
    }
}

/// Formats a color as `#rrggbb`, appending alpha only when it is not opaque.
pub fn to_hex(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 255 {
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
    }
}
