use image::{DynamicImage, Rgba};
use qrforge::color;
use qrforge::{
    EncodeOptions, GenerationRequest, GeneratorConfig, Pipeline, QrCode, QrCodeEcc, QrError,
    QrPipeline, RenderedQr, Version,
};

fn decode(rendered: &RenderedQr) -> (usize, String) {
    let grey = DynamicImage::ImageRgba8(rendered.image.clone()).to_luma8();
    let (w, h) = (grey.width() as usize, grey.height() as usize);
    let mut img =
        rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| grey[(x as u32, y as u32)].0[0]);
    let grids = img.detect_grids();
    assert_eq!(grids.len(), 1, "expected exactly one symbol");
    let (meta, content) = grids[0].decode().expect("symbol should decode");
    (meta.version.0, content)
}

fn render(text: &str, ecl: QrCodeEcc, dark: &str, light: &str) -> (QrCode, RenderedQr) {
    let qr = QrCode::encode_text(text, ecl).unwrap();
    let dark = color::parse_hex(dark).unwrap();
    let light = color::parse_hex(light).unwrap();
    let rendered = RenderedQr::new(&qr, dark, light, 4, 4);
    (qr, rendered)
}

#[test]
fn url_round_trips_black_on_white() {
    let (qr, rendered) = render("https://example.com", QrCodeEcc::Medium, "#000000", "#ffffff");
    let (version, content) = decode(&rendered);
    assert_eq!(content, "https://example.com");
    assert_eq!(version, qr.version().value() as usize);
    assert_eq!(qr.error_correction_level(), QrCodeEcc::Medium);
}

#[test]
fn default_colors_round_trip() {
    let config = GeneratorConfig::default();
    let (dark, light) = (&config.dark_color, &config.light_color);
    let (_, rendered) = render("Hello, World!", QrCodeEcc::Medium, dark, light);
    assert_eq!(*rendered.image.get_pixel(0, 0), Rgba([0xad, 0xff, 0x2f, 255]));
    assert_eq!(decode(&rendered).1, "Hello, World!");
}

#[test]
fn every_level_round_trips() {
    for ecl in [QrCodeEcc::Low, QrCodeEcc::Medium, QrCodeEcc::Quartile, QrCodeEcc::High] {
        let (qr, rendered) = render("ERROR CORRECTION 0123", ecl, "#000000", "#ffffff");
        assert_eq!(qr.error_correction_level(), ecl);
        assert_eq!(decode(&rendered).1, "ERROR CORRECTION 0123");
    }
}

#[test]
fn mixed_modes_and_unicode_round_trip() {
    let texts = [
        "0123456789012345678901234567890123456789",
        "HELLO WORLD 12345 hello world",
        "order 31415926535897932384626 shipped",
        "héllo wörld ✓ 日本語",
    ];
    for text in texts {
        let (_, rendered) = render(text, QrCodeEcc::Medium, "#1e3a8a", "#dbeafe");
        assert_eq!(decode(&rendered).1, text);
    }
}

#[test]
fn larger_versions_round_trip() {
    let text: String = (0..400).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let (qr, rendered) = render(&text, QrCodeEcc::Medium, "#000000", "#ffffff");
    // Version 7 and up carry version information blocks.
    assert!(qr.version().value() >= 7);
    let (version, content) = decode(&rendered);
    assert_eq!(content, text);
    assert_eq!(version, qr.version().value() as usize);
}

#[test]
fn pipeline_output_decodes() {
    let pipeline = QrPipeline::new(GeneratorConfig::default());
    let request = GenerationRequest {
        text: "https://example.com/path?q=1".to_string(),
        dark_color: "#7c3aed".to_string(),
        light_color: "#f3e8ff".to_string(),
    };
    let rendered = pipeline.generate(&request).unwrap();
    assert_eq!(decode(&rendered).1, request.text);
}

#[test]
fn identical_inputs_give_identical_png() {
    let pipeline = QrPipeline::new(GeneratorConfig::default());
    let request = GenerationRequest {
        text: "same every time".to_string(),
        dark_color: "#000000".to_string(),
        light_color: "#ADFF2F".to_string(),
    };
    let first = pipeline.generate(&request).unwrap().to_png().unwrap();
    let second = pipeline.generate(&request).unwrap().to_png().unwrap();
    assert_eq!(first, second);
}

#[test]
fn side_length_follows_version() {
    for len in [1, 10, 50, 120, 300, 800, 1500, 2900] {
        let text = "z".repeat(len);
        let qr = QrCode::encode_text(&text, QrCodeEcc::Low).unwrap();
        assert_eq!(qr.size(), 4 * qr.version().value() as usize + 17);
        let rendered = RenderedQr::new(&qr, Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), 4, 2);
        assert_eq!(rendered.width(), (qr.size() as u32 + 8) * 2);
    }
}

#[test]
fn byte_capacity_boundary() {
    let fits = QrCode::encode_text(&"a".repeat(2953), QrCodeEcc::Medium).unwrap();
    assert_eq!(fits.version(), Version::MAX);
    assert_eq!(fits.error_correction_level(), QrCodeEcc::Low);

    let err = QrCode::encode_text(&"a".repeat(2954), QrCodeEcc::Medium).unwrap_err();
    assert!(matches!(err, QrError::CapacityExceeded { .. }));
}

#[test]
fn mixed_text_capacity_boundary() {
    // Byte length 2953 with a digit run that is worth its own segment only at small versions.
    let fits = format!("{}123456{}", "a".repeat(1000), "a".repeat(1947));
    let qr = QrCode::encode_text(&fits, QrCodeEcc::Medium).unwrap();
    assert_eq!(qr.version(), Version::MAX);
    assert_eq!(qr.error_correction_level(), QrCodeEcc::Low);

    let too_long = format!("{}123456{}", "a".repeat(1000), "a".repeat(1948));
    let err = QrCode::encode_text(&too_long, QrCodeEcc::Medium).unwrap_err();
    assert!(matches!(err, QrError::CapacityExceeded { .. }), "{}", err);

    // Cheaper modes still pack more characters than 2953 when the text allows it.
    let compact = format!("{}9876543210{}", "Z".repeat(2000), "é".repeat(472));
    assert_eq!(compact.len(), 2954);
    assert!(QrCode::encode_text(&compact, QrCodeEcc::Medium).is_ok());
}

#[test]
fn mixed_text_near_capacity_round_trips() {
    let text = format!("{}2025{}", "Ab-".repeat(300), "x".repeat(1000));
    let qr = QrCode::encode_text(&text, QrCodeEcc::Low).unwrap();
    let rendered = RenderedQr::new(&qr, Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), 4, 3);
    assert_eq!(decode(&rendered).1, text);
}

#[test]
fn blank_text_is_rejected() {
    for text in ["", " ", "\t\n"] {
        assert!(matches!(QrCode::encode_text(text, QrCodeEcc::Low), Err(QrError::EmptyInput)));
    }
}

#[test]
fn min_version_is_honored() {
    let opts = EncodeOptions { min_version: Version::new(5), ..EncodeOptions::default() };
    let qr = QrCode::encode_text_with("hi", &opts).unwrap();
    assert_eq!(qr.version(), Version::new(5));
    let (_, content) = {
        let rendered = RenderedQr::new(&qr, Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), 4, 4);
        decode(&rendered)
    };
    assert_eq!(content, "hi");
}
