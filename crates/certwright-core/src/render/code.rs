//! Code - 検証用 QR コードの生成と右上への合成
//!
//! コード画像は一時ファイルとして書き出し、読み戻して合成した直後に削除します。

use image::{GrayImage, ImageFormat, Luma, RgbaImage};
use qrcode::{Color, EcLevel, QrCode};
use std::path::Path;

use crate::domain::{CertError, Identifier};

/// Light modules around the symbol, in modules.
const QUIET_ZONE: u32 = 4;

/// Deterministic verification URL for an identifier.
pub fn verification_url(base_url: &str, id: &Identifier) -> String {
    format!("{base_url}{id}")
}

/// Render `data` as a square QR code of `size_px` pixels.
pub fn render_code(data: &str, size_px: u32) -> Result<GrayImage, CertError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| CertError::CodeGeneration(e.to_string()))?;

    let modules = code.width() as u32;
    let total = modules + 2 * QUIET_ZONE;
    let module_px = (size_px / total).max(1);
    let drawn = module_px * total;
    let canvas_px = size_px.max(drawn);
    let offset = (canvas_px - drawn) / 2 + QUIET_ZONE * module_px;

    let mut img = GrayImage::from_pixel(canvas_px, canvas_px, Luma([255]));
    for (i, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let mx = i as u32 % modules;
        let my = i as u32 / modules;
        for dy in 0..module_px {
            for dx in 0..module_px {
                img.put_pixel(
                    offset + mx * module_px + dx,
                    offset + my * module_px + dy,
                    Luma([0]),
                );
            }
        }
    }
    Ok(img)
}

/// Composite `code` onto the top-right corner of `canvas`, inset by `margin_px`.
///
/// The code passes through a transient PNG in `scratch_dir` which is removed
/// before returning.
pub fn overlay_code(
    canvas: &mut RgbaImage,
    code: &GrayImage,
    id: &Identifier,
    margin_px: u32,
    scratch_dir: &Path,
) -> Result<(), CertError> {
    let transient = tempfile::Builder::new()
        .prefix(&format!("{id}_qr"))
        .suffix(".png")
        .tempfile_in(scratch_dir)
        .map_err(|e| CertError::storage("create verification code file", e))?;

    code.save_with_format(transient.path(), ImageFormat::Png)
        .map_err(|e| CertError::CodeGeneration(format!("write code image: {e}")))?;
    let code = image::open(transient.path())
        .map_err(|e| CertError::CodeGeneration(format!("load code image: {e}")))?
        .to_rgba8();
    transient
        .close()
        .map_err(|e| CertError::storage("remove verification code file", e))?;

    let x = canvas.width() as i64 - code.width() as i64 - margin_px as i64;
    image::imageops::overlay(canvas, &code, x, margin_px as i64);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn id() -> Identifier {
        Identifier::parse("ST001").unwrap()
    }

    #[test]
    fn url_is_base_plus_identifier() {
        assert_eq!(
            verification_url("https://example.org/verify#", &id()),
            "https://example.org/verify#ST001"
        );
    }

    #[test]
    fn code_has_requested_size_and_quiet_zone() {
        let code = render_code("https://example.org/verify#ST001", 600).unwrap();
        assert_eq!(code.dimensions(), (600, 600));
        // 四隅は quiet zone なので白
        assert_eq!(code.get_pixel(0, 0), &Luma([255]));
        assert_eq!(code.get_pixel(599, 599), &Luma([255]));
        assert!(code.pixels().any(|p| p[0] == 0));
    }

    #[test]
    fn tiny_sizes_still_render_every_module() {
        let code = render_code("x", 5).unwrap();
        assert!(code.width() >= 21 + 2 * QUIET_ZONE);
    }

    #[test]
    fn overlay_lands_in_top_right_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let mut canvas = RgbaImage::from_pixel(800, 600, Rgba([255, 255, 255, 255]));
        let code = render_code("https://example.org/verify#ST001", 200).unwrap();

        overlay_code(&mut canvas, &code, &id(), 20, scratch.path()).unwrap();

        let dark_inside = (580..780)
            .flat_map(|x| (20..220).map(move |y| (x, y)))
            .any(|(x, y)| canvas.get_pixel(x, y)[0] == 0);
        assert!(dark_inside);

        let dark_outside = canvas
            .enumerate_pixels()
            .filter(|(x, y, _)| !(580..780).contains(x) || !(20..220).contains(y))
            .any(|(_, _, p)| p[0] == 0);
        assert!(!dark_outside);

        let leftovers = std::fs::read_dir(scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
