//! certwright-core
//!
//! Core building blocks for on-demand certificate issuing.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, artifact, record, state, events, errors）
//! - **ports**: 抽象化レイヤー（ArtifactStore, AuditTrail, RecordLookup, Clock, など）
//! - **impls**: 実装（LocalArtifactStore, RecordBook）
//! - **render**: 描画と文書化（テキスト、QR コード、A4 ページ）
//! - **app**: アプリケーションロジック（coordinator, downloads, eviction, scheduler, service）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod render;
