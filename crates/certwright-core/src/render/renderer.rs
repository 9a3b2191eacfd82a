//! Renderer - テンプレートに氏名と検証コードを焼き込む
//!
//! テンプレートとフォントはリクエストごとに読み込みます。読めない/壊れている
//! 場合はそのリクエストだけが型付きエラーで失敗し、プロセスは生き続けます。

use ab_glyph::FontVec;
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::code::{overlay_code, render_code, verification_url};
use super::text::{draw_text, fit_text};
use crate::domain::{CertError, GenerationRequest};

/// Layout knobs for one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub max_font_px: f32,
    pub width_fraction: f32,
    /// Baseline of the name, in template pixels.
    pub baseline_y: f32,
    pub text_color: [u8; 4],
    pub code_size_px: u32,
    pub code_margin_px: u32,
    pub verify_base_url: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_font_px: 150.0,
            width_fraction: 0.93,
            baseline_y: 3000.0,
            text_color: [255, 0, 0, 255],
            code_size_px: 600,
            code_margin_px: 90,
            verify_base_url: "https://cpcglobal.org/verify#".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificateRenderer {
    template_path: PathBuf,
    font_path: PathBuf,
    options: RenderOptions,
}

impl CertificateRenderer {
    pub fn new(
        template_path: impl Into<PathBuf>,
        font_path: impl Into<PathBuf>,
        options: RenderOptions,
    ) -> Self {
        Self {
            template_path: template_path.into(),
            font_path: font_path.into(),
            options,
        }
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    pub fn font_path(&self) -> &Path {
        &self.font_path
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render the certificate raster for `request`.
    ///
    /// Blocking: call from `spawn_blocking`. Transient files go to `scratch_dir`.
    pub fn render(
        &self,
        request: &GenerationRequest,
        scratch_dir: &Path,
    ) -> Result<RgbaImage, CertError> {
        let mut canvas = self.load_template()?;
        let font = self.load_font()?;

        let canvas_width = canvas.width();
        let fit = fit_text(
            &font,
            &request.display_name,
            canvas_width,
            self.options.max_font_px,
            self.options.width_fraction,
        );
        tracing::debug!(
            id = %request.id,
            px = fit.px,
            width = fit.width,
            max_width = fit.max_width,
            "fitted display name"
        );
        draw_text(
            &mut canvas,
            &font,
            &request.display_name,
            fit.px,
            fit.origin_x(canvas_width) as f32,
            self.options.baseline_y,
            Rgba(self.options.text_color),
        );

        let url = verification_url(&self.options.verify_base_url, &request.id);
        let code = render_code(&url, self.options.code_size_px)?;
        overlay_code(
            &mut canvas,
            &code,
            &request.id,
            self.options.code_margin_px,
            scratch_dir,
        )?;

        Ok(canvas)
    }

    fn load_template(&self) -> Result<RgbaImage, CertError> {
        let bytes = std::fs::read(&self.template_path).map_err(|e| {
            CertError::Asset(format!("template {}: {e}", self.template_path.display()))
        })?;
        let template = image::load_from_memory(&bytes).map_err(|e| {
            CertError::Render(format!("decode template {}: {e}", self.template_path.display()))
        })?;
        Ok(template.to_rgba8())
    }

    fn load_font(&self) -> Result<FontVec, CertError> {
        let bytes = std::fs::read(&self.font_path)
            .map_err(|e| CertError::Asset(format!("font {}: {e}", self.font_path.display())))?;
        FontVec::try_from_vec(bytes)
            .map_err(|e| CertError::Asset(format!("font {}: {e}", self.font_path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, Identifier};
    use crate::render::DocumentAssembler;
    use crate::render::text::testing;
    use image::ImageFormat;

    fn request() -> GenerationRequest {
        GenerationRequest::new(Identifier::parse("ST001").unwrap(), "Jane Doe")
    }

    fn write_template(dir: &Path) -> PathBuf {
        let path = dir.join("template.png");
        RgbaImage::from_pixel(64, 64, Rgba([255, 255, 255, 255]))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();
        path
    }

    #[test]
    fn defaults_match_production_layout() {
        let options = RenderOptions::default();
        assert_eq!(options.max_font_px, 150.0);
        assert_eq!(options.width_fraction, 0.93);
        assert_eq!(options.baseline_y, 3000.0);
        assert_eq!(options.code_size_px, 600);
        assert_eq!(options.code_margin_px, 90);
    }

    #[test]
    fn missing_template_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CertificateRenderer::new(
            dir.path().join("nope.jpg"),
            dir.path().join("font.ttf"),
            RenderOptions::default(),
        );
        let err = renderer.render(&request(), dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Asset);
    }

    #[test]
    fn undecodable_template_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.jpg");
        std::fs::write(&template, b"definitely not an image").unwrap();
        let renderer = CertificateRenderer::new(
            template,
            dir.path().join("font.ttf"),
            RenderOptions::default(),
        );
        let err = renderer.render(&request(), dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
    }

    #[test]
    fn missing_font_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = CertificateRenderer::new(
            write_template(dir.path()),
            dir.path().join("font.ttf"),
            RenderOptions::default(),
        );
        let err = renderer.render(&request(), dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Asset);
        assert!(err.to_string().contains("font"));
    }

    #[test]
    fn unparsable_font_is_an_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("font.ttf");
        std::fs::write(&font, b"not a font").unwrap();
        let renderer =
            CertificateRenderer::new(write_template(dir.path()), font, RenderOptions::default());
        let err = renderer.render(&request(), dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Asset);
    }

    fn small_layout() -> RenderOptions {
        RenderOptions {
            max_font_px: 60.0,
            baseline_y: 250.0,
            code_size_px: 90,
            code_margin_px: 10,
            ..RenderOptions::default()
        }
    }

    #[test]
    fn renders_name_and_code_then_assembles_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.jpg");
        RgbaImage::from_pixel(400, 300, Rgba([255, 255, 255, 255]))
            .save_with_format(&template, ImageFormat::Png)
            .unwrap();
        let scratch = dir.path().join("scratch");
        std::fs::create_dir(&scratch).unwrap();

        let renderer =
            CertificateRenderer::new(&template, testing::font_path(), small_layout());
        let request = GenerationRequest::new(
            Identifier::parse("ST001").unwrap(),
            "Maximilian Alexander Fitzgerald-Montgomery",
        );
        let canvas = renderer.render(&request, &scratch).unwrap();
        assert_eq!(canvas.dimensions(), (400, 300));

        // 名前は赤で下段に、コードは右上に黒で入る
        let red_rows: Vec<u32> = canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 200 && p[1] < 80 && p[2] < 80)
            .map(|(_, y, _)| y)
            .collect();
        assert!(!red_rows.is_empty());
        assert!(red_rows.iter().all(|y| *y > 150));
        let dark_top_right = (0..90)
            .flat_map(|dy| (0..90).map(move |dx| (300 + dx, 10 + dy)))
            .filter(|&(x, y)| canvas.get_pixel(x, y)[0] < 50)
            .count();
        assert!(dark_top_right > 0);
        assert_eq!(canvas.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);

        let pdf = DocumentAssembler::default()
            .assemble(&canvas, request.id.as_str(), &scratch)
            .unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        assert!(pdf.len() > 1000);
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }
}
