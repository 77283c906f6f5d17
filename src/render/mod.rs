//! Document rendering: layout planning plus the PDF backend.
//!
//! ```text
//! DocumentModel ──▶ layout::LayoutEngine ──▶ LayoutPlan ──▶ pdf::PdfWriter ──▶ bytes
//!                        ▲                                       │
//!                        └──────── FontCoverage ◀────────────────┘
//! ```
//!
//! The writer registers fonts first; whether a Unicode face loaded decides
//! the coverage the plan is composed for. Composition and painting are CPU
//! bound and run on the blocking pool via [`render`].

pub mod layout;
pub mod pdf;
pub mod qr;
pub mod text;

pub use layout::{
    DocumentModel, FontCoverage, GridConfig, GridCursor, LayoutConfig, LayoutEngine, LayoutPlan,
    Screenshot, SectionBlock,
};
pub use pdf::FontPaths;

use crate::error::{SopError, StageWarning};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the caller learns about the produced layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSummary {
    pub page_count: usize,
    /// Headings of pages opened with one, in page order.
    pub headings: Vec<String>,
    pub cover_badge: String,
    /// Whether text was set in a Unicode font (false: sanitised Latin-1).
    pub unicode_text: bool,
}

/// A rendered PDF.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub summary: LayoutSummary,
    pub warnings: Vec<StageWarning>,
}

/// Compose and paint `model` synchronously.
pub fn render_document(
    model: &DocumentModel,
    layout: &LayoutConfig,
    fonts: &FontPaths,
) -> Result<RenderedDocument, SopError> {
    let mut writer = pdf::PdfWriter::new(&model.title, layout.page_width, layout.page_height, fonts)?;
    let coverage = writer.coverage();

    let plan = LayoutEngine::new(layout.clone(), coverage).compose(model);
    debug!(pages = plan.page_count(), "Layout composed");
    writer.paint(&plan);

    let (bytes, warnings) = writer.finish()?;
    Ok(RenderedDocument {
        bytes,
        summary: LayoutSummary {
            page_count: plan.page_count(),
            headings: plan.headings(),
            cover_badge: plan.cover_badge,
            unicode_text: coverage.unicode_text,
        },
        warnings,
    })
}

/// [`render_document`] on tokio's blocking pool.
pub async fn render(
    model: DocumentModel,
    layout: LayoutConfig,
    fonts: FontPaths,
) -> Result<RenderedDocument, SopError> {
    tokio::task::spawn_blocking(move || render_document(&model, &layout, &fonts))
        .await
        .map_err(|e| SopError::Internal(format!("render task panicked: {e}")))?
}
