//! Turning a finished [`QrCode`] into pixels, SVG or terminal text.

use image::{ImageBuffer, Pixel, Rgba, RgbaImage};

use crate::error::Result;
use crate::qrcode::{Mask, QrCode, QrCodeEcc, Version};

/// A raster of a symbol plus the facts about how it was produced.
///
/// Every generation creates a new one; nothing is drawn into a shared surface.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedQr {
    pub image: RgbaImage,
    pub version: Version,
    pub ecl: QrCodeEcc,
    pub mask: Mask,
    pub quiet_zone: u32,
    pub pixels_per_module: u32,
}

impl RenderedQr {
    /// Rasterizes `qr` with two RGBA colors.
    pub fn new(
        qr: &QrCode,
        dark: Rgba<u8>,
        light: Rgba<u8>,
        quiet_zone: u32,
        pixels_per_module: u32,
    ) -> Self {
        let pixels_per_module = pixels_per_module.max(1);
        Self {
            image: to_image(qr, dark, light, quiet_zone, pixels_per_module),
            version: qr.version(),
            ecl: qr.error_correction_level(),
            mask: qr.mask(),
            quiet_zone,
            pixels_per_module,
        }
    }

    /// Width (= height) in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Encodes the image as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        crate::export::encode_png(&self.image)
    }
}

/// Rasterizes a QR code: every module becomes a `pixels_per_module` square of `dark` or
/// `light`, inside a `quiet_zone`-module border of `light`.
///
/// Plain block fill, no smoothing. The output is `(size + 2 * quiet_zone) * pixels_per_module`
/// pixels on each side. A scale of 0 is treated as 1.
///
/// # Example
///
/// ```
/// use image::Luma;
/// use qrforge::qrcode::{QrCode, QrCodeEcc};
/// use qrforge::render::to_image;
///
/// let qr = QrCode::encode_text("Hello, world!", QrCodeEcc::Low).unwrap();
/// let img = to_image(&qr, Luma([0u8]), Luma([255u8]), 4, 1);
/// assert_eq!(img.dimensions(), (29, 29));
/// ```
pub fn to_image<P: Pixel>(
    qr: &QrCode,
    dark: P,
    light: P,
    quiet_zone: u32,
    pixels_per_module: u32,
) -> ImageBuffer<P, Vec<P::Subpixel>> {
    let scale = pixels_per_module.max(1);
    let side = (qr.size() as u32 + 2 * quiet_zone) * scale;
    let border = quiet_zone as i32;
    ImageBuffer::from_fn(side, side, |x, y| {
        let qr_x = (x / scale) as i32 - border;
        let qr_y = (y / scale) as i32 - border;
        if qr.get_module(qr_x, qr_y) {
            dark
        } else {
            light
        }
    })
}

/// Largest whole scale that keeps the image within `target_width`, never below 1.
pub fn pixels_per_module_for(side: usize, quiet_zone: u32, target_width: u32) -> u32 {
    let modules = side as u32 + 2 * quiet_zone;
    (target_width / modules).max(1)
}

// Returns a string of SVG code for an image depicting
// the given QR Code, with the given number of border modules.
// Colors are written verbatim into the fill attributes.
// The string always uses Unix newlines (\n), regardless of the platform.
pub fn to_svg_string(qr: &QrCode, border: u32, dark: &str, light: &str) -> String {
    let mut result = String::new();
    result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
    result += "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" ";
    result += "\"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n";
    let dimension = qr.size() as u32 + 2 * border;
    result += &format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" \
         viewBox=\"0 0 {0} {0}\" stroke=\"none\">\n",
        dimension
    );
    result += &format!(
        "\t<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n",
        escape_attr(light)
    );
    result += "\t<path d=\"";
    let mut first = true;
    for y in 0..qr.size() as i32 {
        for x in 0..qr.size() as i32 {
            if qr.get_module(x, y) {
                if !first {
                    result += " ";
                }
                first = false;
                result += &format!("M{},{}h1v1h-1z", x + border as i32, y + border as i32);
            }
        }
    }
    result += &format!("\" fill=\"{}\"/>\n", escape_attr(dark));
    result += "</svg>\n";
    result
}

/// Renders the symbol with full-block characters, two per module so it looks square.
pub fn to_text_art(qr: &QrCode, border: u32) -> String {
    let border = border as i32;
    let mut out = String::new();
    for y in -border..qr.size() as i32 + border {
        for x in -border..qr.size() as i32 + border {
            let c = if qr.get_module(x, y) { '█' } else { ' ' };
            out.push(c);
            out.push(c);
        }
        out.push('\n');
    }
    out
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}
