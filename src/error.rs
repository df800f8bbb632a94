//! Error taxonomy shared by every stage of the generator.

/// Unified error type for the qrforge crate.
///
/// Ways to handle [`QrError::CapacityExceeded`]:
///
/// - Shorten the text, or change it to fit a cheaper segment mode (e.g. uppercase for
///   alphanumeric).
/// - Propagate it upward; the controller keeps the last good image on screen.
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("Input text is empty")]
    EmptyInput,

    #[error("{}", capacity_message(.data_bits, .capacity_bits))]
    CapacityExceeded {
        /// Bits the payload needs, `None` when a segment is too long for its count indicator.
        data_bits: Option<usize>,
        /// Data capacity of the largest symbol tried.
        capacity_bits: usize,
    },

    #[error("Internal encoding fault: {0}")]
    Internal(String),

    #[error("Invalid color value: {0:?}")]
    InvalidColor(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn capacity_message(data_bits: &Option<usize>, capacity_bits: &usize) -> String {
    match data_bits {
        Some(n) => format!("Data length = {} bits, Max capacity = {} bits", n, capacity_bits),
        None => format!("Segment too long, Max capacity = {} bits", capacity_bits),
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, QrError>;
