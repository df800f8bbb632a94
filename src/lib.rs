//! # qrforge
//!
//! A Rust library for turning text into QR code images, with a debounced controller for
//! interactive front ends.
//!
//! `qrforge` encodes text into QR Code Model 2 symbols (versions 1 to 40, four error correction
//! levels), picking numeric, alphanumeric and byte segments so the symbol stays small. Symbols
//! are rasterized with any two colors into in-memory images, which can be exported as PNG.
//!
//! ## Features
//!
//! - Mixed-mode segmentation of arbitrary UTF-8 text.
//! - Reed–Solomon error correction, all eight masks scored, lowest penalty wins.
//! - Two-color raster, SVG and terminal rendering.
//! - Named color presets and lenient color parsing.
//! - A generation controller that waits for input to settle and never shows a stale result.
//!
//! ## Example
//!
//! Encode and render once:
//!
//! ```rust
//! use image::Rgba;
//! use qrforge::{QrCode, QrCodeEcc, RenderedQr};
//!
//! let qr = QrCode::encode_text("https://example.com", QrCodeEcc::Medium).unwrap();
//! let rendered = RenderedQr::new(&qr, Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), 4, 8);
//! assert_eq!(rendered.width(), (qr.size() as u32 + 8) * 8);
//! let png = rendered.to_png().unwrap();
//! assert!(!png.is_empty());
//! ```
//!
//! Drive generations from a UI:
//!
//! ```rust,no_run
//! use qrforge::{GenerationController, GeneratorConfig};
//!
//! # async fn run() {
//! let controller = GenerationController::from_config(GeneratorConfig::default());
//! let mut updates = controller.subscribe();
//! controller.set_text("Hello");
//! controller.apply_preset("Ocean");
//! let snapshot = updates.wait_for(|s| s.completed > 0).await.unwrap().clone();
//! if let Some(image) = snapshot.image {
//!     println!("{}x{}", image.width(), image.width());
//! }
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`qrcode`]: The finished symbol and the version, level and mask types.
//! - [`segment`]: Splitting text into encoding segments.
//! - [`encoder`]: Version selection, padding and error correction.
//! - [`matrix`]: Module placement and mask selection.
//! - [`render`]: Raster, SVG and text output.
//! - [`color`]: Color parsing and presets.
//! - [`export`]: PNG bytes and file export.
//! - [`controller`]: Debounced generation.
//! - [`config`]: Generator settings.

pub mod color;
pub mod config;
pub mod controller;
pub mod encoder;
pub mod error;
pub mod export;
pub mod matrix;
pub mod qrcode;
pub mod render;
pub mod segment;

pub use config::GeneratorConfig;
pub use controller::{
    GenerationController, GenerationRequest, Phase, Pipeline, QrPipeline, Snapshot,
};
pub use encoder::EncodeOptions;
pub use error::{QrError, Result};
pub use qrcode::{Mask, QrCode, QrCodeEcc, Version};
pub use render::RenderedQr;
pub use segment::QrSegment;
