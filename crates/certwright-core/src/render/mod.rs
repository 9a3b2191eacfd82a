//! Render - 証明書の描画と文書化
//!
//! - **text**: 幅予算に収まるフォントサイズ計算（単発補正）
//! - **code**: 検証 URL の QR コード生成と合成
//! - **document**: ラスタ → A4 1 ページ
//! - **renderer / pipeline**: 上記をつないで ArtifactStore に置く

pub mod code;
pub mod document;
pub mod pipeline;
pub mod renderer;
pub mod text;

pub use self::document::{DocumentAssembler, PageSize};
pub use self::pipeline::CertificatePipeline;
pub use self::renderer::{CertificateRenderer, RenderOptions};
pub use self::text::{TextFit, TextMeasure, fit_text};
