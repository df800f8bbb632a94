//! PNG export and file naming.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};

use crate::error::Result;

/// Filename for an export made at `millis` since the Unix epoch.
pub fn export_filename_at(millis: i64) -> String {
    format!("qr-code-{}.png", millis)
}

/// Filename for an export made now, `qr-code-<unix-epoch-millis>.png`.
pub fn export_filename() -> String {
    export_filename_at(chrono::Utc::now().timestamp_millis())
}

/// Encodes an image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Writes `image` as a PNG under `directory` using [`export_filename`].
///
/// The directory is created if it does not exist. Returns the full path written.
pub fn save_png(image: &RgbaImage, directory: impl AsRef<Path>) -> Result<PathBuf> {
    let directory = directory.as_ref();
    if !directory.exists() {
        fs::create_dir_all(directory)?;
    }
    let path = directory.join(export_filename());
    fs::write(&path, encode_png(image)?)?;
    tracing::info!(path = %path.display(), "Saved QR code image");
    Ok(path)
}
