//! Document - ラスタ画像を余白ゼロの 1 ページ文書に包む
//!
//! 中間 JPEG を書いて読み戻し、ページ全体を覆うように配置します。
//! 成果物の配置は呼び出し側の責任です（ここではバイト列を返すだけ）。

use image::{DynamicImage, ImageFormat, RgbaImage};
use printpdf::{Image as PdfImage, ImageTransform, Mm, PdfDocument};
use std::io::BufWriter;
use std::path::Path;

use crate::domain::CertError;

const MM_PER_INCH: f32 = 25.4;

/// Physical page size in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_mm: f32,
    pub height_mm: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width_mm: 210.0,
        height_mm: 297.0,
    };
}

#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    page: PageSize,
    dpi: f32,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new(PageSize::A4)
    }
}

impl DocumentAssembler {
    pub fn new(page: PageSize) -> Self {
        Self { page, dpi: 300.0 }
    }

    pub fn page(&self) -> PageSize {
        self.page
    }

    /// Scale factors that stretch a `width × height` pixel image over the page.
    pub fn cover_scale(&self, width: u32, height: u32) -> (f32, f32) {
        let natural_w = width as f32 / self.dpi * MM_PER_INCH;
        let natural_h = height as f32 / self.dpi * MM_PER_INCH;
        (self.page.width_mm / natural_w, self.page.height_mm / natural_h)
    }

    pub fn assemble(
        &self,
        image: &RgbaImage,
        title: &str,
        scratch_dir: &Path,
    ) -> Result<Vec<u8>, CertError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CertError::Assembly("empty raster image".into()));
        }

        let intermediate = tempfile::Builder::new()
            .prefix(&format!("{title}_final"))
            .suffix(".jpg")
            .tempfile_in(scratch_dir)
            .map_err(|e| CertError::storage("create intermediate raster", e))?;
        DynamicImage::ImageRgba8(image.clone())
            .to_rgb8()
            .save_with_format(intermediate.path(), ImageFormat::Jpeg)
            .map_err(|e| CertError::Render(format!("encode intermediate raster: {e}")))?;
        let raster = image::open(intermediate.path())
            .map_err(|e| CertError::Render(format!("decode intermediate raster: {e}")))?;
        intermediate
            .close()
            .map_err(|e| CertError::storage("remove intermediate raster", e))?;

        let (doc, page, layer) = PdfDocument::new(
            title,
            Mm(self.page.width_mm),
            Mm(self.page.height_mm),
            "certificate",
        );
        let layer = doc.get_page(page).get_layer(layer);

        let (scale_x, scale_y) = self.cover_scale(raster.width(), raster.height());
        PdfImage::from_dynamic_image(&raster).add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(Mm(0.0)),
                translate_y: Some(Mm(0.0)),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                dpi: Some(self.dpi),
                ..Default::default()
            },
        );

        let mut writer = BufWriter::new(Vec::new());
        doc.save(&mut writer)
            .map_err(|e| CertError::Assembly(e.to_string()))?;
        writer
            .into_inner()
            .map_err(|e| CertError::Assembly(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn cover_scale_fills_a4_exactly() {
        let assembler = DocumentAssembler::default();
        // 300dpi の A4 は 2480 × 3508 px
        let (sx, sy) = assembler.cover_scale(2480, 3508);
        assert!((sx - 1.0).abs() < 0.01);
        assert!((sy - 1.0).abs() < 0.01);

        let (sx, sy) = assembler.cover_scale(1240, 3508);
        assert!((sx - 2.0).abs() < 0.01);
        assert!((sy - 1.0).abs() < 0.01);
    }

    #[test]
    fn assembles_single_page_pdf_and_removes_raster() {
        let scratch = tempfile::tempdir().unwrap();
        let image = RgbaImage::from_pixel(42, 60, Rgba([200, 10, 10, 255]));

        let bytes = DocumentAssembler::default()
            .assemble(&image, "ST001", scratch.path())
            .unwrap();

        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn rejects_empty_images() {
        let scratch = tempfile::tempdir().unwrap();
        let err = DocumentAssembler::default()
            .assemble(&RgbaImage::new(0, 0), "ST001", scratch.path())
            .unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::Assembly);
    }
}
