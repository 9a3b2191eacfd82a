//! Text - 幅予算に収まるフォントサイズの計算と描画
//!
//! 最大サイズで測り、予算を超えたら `max_width / measured` を一度だけ掛けて
//! 測り直す（反復収束ではない）。グリフの送り幅はサイズにほぼ線形なので
//! 一回の補正で足ります。

use ab_glyph::{Font, FontVec, GlyphId, PxScale, ScaleFont, point};
use image::{Rgba, RgbaImage};

/// Keeps the corrected width a hair under the budget so float error cannot
/// round it back over.
const FIT_SLACK_PX: f32 = 0.01;

/// Anything that can report the advance width of a string at a pixel size.
pub trait TextMeasure {
    fn advance_width(&self, text: &str, px: f32) -> f32;
}

impl TextMeasure for FontVec {
    fn advance_width(&self, text: &str, px: f32) -> f32 {
        let scaled = self.as_scaled(PxScale::from(px));
        let mut width = 0.0;
        let mut prev: Option<GlyphId> = None;
        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                width += scaled.kern(prev, id);
            }
            width += scaled.h_advance(id);
            prev = Some(id);
        }
        width
    }
}

/// Result of fitting a string into a width budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextFit {
    /// Final font size in pixels.
    pub px: f32,
    /// Measured width at `px`, rounded up.
    pub width: u32,
    /// `floor(available_width × fraction)`.
    pub max_width: u32,
}

impl TextFit {
    /// Left edge that centres the text in `available_width`.
    pub fn origin_x(&self, available_width: u32) -> u32 {
        available_width.saturating_sub(self.width) / 2
    }
}

pub fn fit_text(
    measure: &impl TextMeasure,
    text: &str,
    available_width: u32,
    max_px: f32,
    width_fraction: f32,
) -> TextFit {
    let max_width = (available_width as f32 * width_fraction).floor().max(0.0) as u32;
    let mut px = max_px;
    let mut raw = measure.advance_width(text, px);

    if raw.ceil() as u32 > max_width && raw > 0.0 {
        let factor = (max_width as f32 - FIT_SLACK_PX).max(0.0) / raw;
        px *= factor;
        raw = measure.advance_width(text, px);
    }

    TextFit {
        px,
        width: raw.max(0.0).ceil() as u32,
        max_width,
    }
}

/// Draw `text` with its baseline at `baseline_y`, starting at `origin_x`.
pub fn draw_text(
    canvas: &mut RgbaImage,
    font: &FontVec,
    text: &str,
    px: f32,
    origin_x: f32,
    baseline_y: f32,
    color: Rgba<u8>,
) {
    let scale = PxScale::from(px);
    let scaled = font.as_scaled(scale);
    let (width, height) = canvas.dimensions();

    let mut caret = origin_x;
    let mut prev: Option<GlyphId> = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            caret += scaled.kern(prev, id);
        }
        let glyph = id.with_scale_and_position(scale, point(caret, baseline_y));
        caret += scaled.h_advance(id);
        prev = Some(id);

        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let x = bounds.min.x as i64 + gx as i64;
            let y = bounds.min.y as i64 + gy as i64;
            if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
                return;
            }
            blend(canvas.get_pixel_mut(x as u32, y as u32), color, coverage);
        });
    }
}

fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0) * (src[3] as f32 / 255.0);
    for channel in 0..3 {
        let mixed = src[channel] as f32 * alpha + dst[channel] as f32 * (1.0 - alpha);
        dst[channel] = mixed.round().clamp(0.0, 255.0) as u8;
    }
    let out_alpha = alpha * 255.0 + dst[3] as f32 * (1.0 - alpha);
    dst[3] = out_alpha.round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
pub(crate) mod testing {
    use ab_glyph::FontVec;
    use std::path::PathBuf;

    /// DejaVu Serif Condensed Bold, shipped under `testdata/`.
    pub(crate) fn font_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata/DejaVuSerifCondensed-Bold.ttf")
    }

    pub(crate) fn font() -> FontVec {
        FontVec::try_from_vec(std::fs::read(font_path()).unwrap()).unwrap()
    }
}
