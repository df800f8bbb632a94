#![forbid(unsafe_code)]
/// QR code value types and the finished symbol.
///
/// This module holds the small types every pipeline stage agrees on ([`Version`], [`QrCodeEcc`],
/// [`Mask`]) and [`QrCode`], the immutable grid of dark and light modules the matrix builder
/// hands to the renderers.
use serde::{Deserialize, Serialize};

use crate::encoder::{self, EncodeOptions};
use crate::error::Result;
use crate::matrix;
use crate::segment::QrSegment;

/// A QR Code symbol, representing a square grid of dark and light modules.
///
/// Covers QR Code Model 2, versions 1 to 40, all four error correction levels. Instances are
/// immutable after creation and own their modules, so nothing aliases between two generations.
///
/// # Example
///
/// ```rust
/// use qrforge::qrcode::{QrCode, QrCodeEcc};
///
/// let qr = QrCode::encode_text("Hello, World!", QrCodeEcc::Medium).unwrap();
/// assert_eq!(qr.size(), qr.version().size());
/// println!("Version: {}", qr.version().value());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrCode {
    version: Version,
    ecl: QrCodeEcc,
    mask: Mask,
    /// Row-major, `true` = dark. Length is `size * size`.
    modules: Vec<bool>,
}

impl QrCode {
    /// Encodes a text string into a QR code at the given error correction level.
    ///
    /// Segments the text, picks the smallest version that holds it and builds the masked grid.
    ///
    /// # Errors
    ///
    /// [`QrError::EmptyInput`](crate::QrError::EmptyInput) for blank text,
    /// [`QrError::CapacityExceeded`](crate::QrError::CapacityExceeded) when even version 40 at
    /// level Low cannot hold it.
    pub fn encode_text(text: &str, ecl: QrCodeEcc) -> Result<QrCode> {
        Self::encode_text_with(text, &EncodeOptions { ecl, ..EncodeOptions::default() })
    }

    /// Same as [`encode_text`](Self::encode_text) with control over version range and boosting.
    pub fn encode_text_with(text: &str, opts: &EncodeOptions) -> Result<QrCode> {
        let encoded = encoder::encode_text(text, opts)?;
        matrix::build(encoded.version, encoded.ecl, &encoded.codewords)
    }

    /// Encodes already built segments.
    pub fn encode_segments(segs: &[QrSegment], opts: &EncodeOptions) -> Result<QrCode> {
        let encoded = encoder::encode(segs, opts)?;
        matrix::build(encoded.version, encoded.ecl, &encoded.codewords)
    }

    pub(crate) fn from_modules(
        version: Version,
        ecl: QrCodeEcc,
        mask: Mask,
        modules: Vec<bool>,
    ) -> Self {
        debug_assert_eq!(modules.len(), version.size() * version.size());
        Self { version, ecl, mask, modules }
    }

    /// Returns this QR Code's version, in the range [1, 40].
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns this QR Code's size, in the range [21, 177].
    pub fn size(&self) -> usize {
        self.version.size()
    }

    /// Returns this QR Code's error correction level.
    pub fn error_correction_level(&self) -> QrCodeEcc {
        self.ecl
    }

    /// Returns the mask that was applied, in the range [0, 7].
    pub fn mask(&self) -> Mask {
        self.mask
    }

    /// Returns the color of the module at the given coordinates.
    ///
    /// Returns `true` for dark modules and `false` for light modules. Coordinates outside the
    /// symbol return `false`, so callers can sample the quiet zone with negative offsets.
    ///
    /// # Arguments
    ///
    /// * `x` - X-coordinate (0 is left).
    /// * `y` - Y-coordinate (0 is top).
    pub fn get_module(&self, x: i32, y: i32) -> bool {
        let size = self.size() as i32;
        let range = 0..size;
        range.contains(&x) && range.contains(&y) && self.modules[(y * size + x) as usize]
    }
}

/// Error correction level for a QR code.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QrCodeEcc {
    /// Tolerates ~7% erroneous codewords.
    #[serde(alias = "L")]
    Low,
    /// Tolerates ~15% erroneous codewords.
    #[default]
    #[serde(alias = "M")]
    Medium,
    /// Tolerates ~25% erroneous codewords.
    #[serde(alias = "Q")]
    Quartile,
    /// Tolerates ~30% erroneous codewords.
    #[serde(alias = "H")]
    High,
}

impl QrCodeEcc {
    /// Row index into the per-level capacity tables.
    pub(crate) fn ordinal(self) -> usize {
        use QrCodeEcc::*;
        match self {
            Low => 0,
            Medium => 1,
            Quartile => 2,
            High => 3,
        }
    }

    /// Returns the 2-bit value written into the format information.
    pub(crate) fn format_bits(self) -> u8 {
        use QrCodeEcc::*;
        match self {
            Low => 1,
            Medium => 0,
            Quartile => 3,
            High => 2,
        }
    }

    /// The next more permissive level, `None` for Low.
    pub fn lower(self) -> Option<QrCodeEcc> {
        use QrCodeEcc::*;
        match self {
            Low => None,
            Medium => Some(Low),
            Quartile => Some(Medium),
            High => Some(Quartile),
        }
    }

    /// Single-letter name as printed in the standard (L, M, Q, H).
    pub fn letter(self) -> char {
        use QrCodeEcc::*;
        match self {
            Low => 'L',
            Medium => 'M',
            Quartile => 'Q',
            High => 'H',
        }
    }
}

/// A QR code version (1–40).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Version(u8);

impl Version {
    /// The minimum version number supported in the QR Code Model 2 standard.
    pub const MIN: Version = Version(1);

    /// The maximum version number supported in the QR Code Model 2 standard.
    pub const MAX: Version = Version(40);

    /// Creates a version object from the given number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [1, 40].
    pub const fn new(ver: u8) -> Self {
        assert!(
            Version::MIN.value() <= ver && ver <= Version::MAX.value(),
            "Version number out of range"
        );
        Self(ver)
    }

    /// Checked constructor for values coming from configuration.
    pub const fn try_new(ver: u8) -> Option<Self> {
        if Version::MIN.value() <= ver && ver <= Version::MAX.value() {
            Some(Self(ver))
        } else {
            None
        }
    }

    /// Returns the value, which is in the range [1, 40].
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Side length in modules, `4 * version + 17`.
    pub const fn size(self) -> usize {
        (self.0 as usize) * 4 + 17
    }

    /// Iterates this version and every larger one up to [`Version::MAX`].
    pub fn up_to_max(self) -> impl Iterator<Item = Version> {
        (self.0..=Version::MAX.0).map(Version)
    }
}

/// A mask pattern (0–7).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct Mask(u8);

impl Mask {
    /// Creates a mask object from the given number.
    ///
    /// # Panics
    ///
    /// Panics if the number is outside the range [0, 7].
    pub const fn new(mask: u8) -> Self {
        assert!(mask <= 7, "Mask value out of range");
        Self(mask)
    }

    /// Returns the value, which is in the range [0, 7].
    pub const fn value(self) -> u8 {
        self.0
    }

    /// All eight masks in id order.
    pub fn all() -> impl Iterator<Item = Mask> {
        (0u8..8).map(Mask)
    }

    /// Whether this mask flips the module at column `x`, row `y`.
    pub fn inverts(self, x: usize, y: usize) -> bool {
        match self.0 {
            0 => (x + y) % 2 == 0,
            1 => y % 2 == 0,
            2 => x % 3 == 0,
            3 => (x + y) % 3 == 0,
            4 => (x / 3 + y / 2) % 2 == 0,
            5 => (x * y) % 2 + (x * y) % 3 == 0,
            6 => ((x * y) % 2 + (x * y) % 3) % 2 == 0,
            7 => ((x + y) % 2 + (x * y) % 3) % 2 == 0,
            _ => unreachable!(),
        }
    }
}
