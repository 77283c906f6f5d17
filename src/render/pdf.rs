//! printpdf backend: paints a [`LayoutPlan`] onto A4 pages.
//!
//! Layout works top-down in millimetres; PDF user space is bottom-up, so
//! every y coordinate is flipped against the page height here and nowhere
//! else.

use crate::error::{SopError, StageWarning};
use crate::render::layout::{Element, FontCoverage, FontRole, LayoutPlan, Rgb};
use image::{DynamicImage, GenericImageView};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Polygon,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolution images are embedded at before scaling into their box.
const IMAGE_DPI: f32 = 300.0;

/// Font files to try before falling back to the built-in faces.
#[derive(Debug, Clone, Default)]
pub struct FontPaths {
    pub unicode: Option<PathBuf>,
    pub mono: Option<PathBuf>,
}

struct FontSet {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    mono: IndirectFontRef,
    coverage: FontCoverage,
}

impl FontSet {
    fn get(&self, role: FontRole) -> &IndirectFontRef {
        match role {
            FontRole::Regular => &self.regular,
            FontRole::Bold => &self.bold,
            FontRole::Italic => &self.italic,
            FontRole::Mono => &self.mono,
        }
    }
}

/// A document under construction. Not `Send`; build and finish it on one thread.
pub struct PdfWriter {
    doc: PdfDocumentReference,
    fonts: FontSet,
    width: f32,
    height: f32,
    first_page_used: bool,
    first_page: (printpdf::PdfPageIndex, printpdf::PdfLayerIndex),
    warnings: Vec<StageWarning>,
}

fn render_err(what: &str, e: impl std::fmt::Display) -> SopError {
    SopError::Render {
        detail: format!("{what}: {e}"),
    }
}

fn builtin(doc: &PdfDocumentReference, font: BuiltinFont) -> Result<IndirectFontRef, SopError> {
    doc.add_builtin_font(font)
        .map_err(|e| render_err("PDF font error", e))
}

fn external(doc: &PdfDocumentReference, path: &Path) -> Result<IndirectFontRef, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    doc.add_external_font(file).map_err(|e| e.to_string())
}

impl PdfWriter {
    /// Start a document and register fonts.
    ///
    /// A configured font that cannot be loaded produces
    /// [`StageWarning::FontFallback`] and the built-in face for that role.
    pub fn new(title: &str, width: f32, height: f32, paths: &FontPaths) -> Result<Self, SopError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(width), Mm(height), "Layer 1");
        let mut warnings = Vec::new();

        let unicode = paths.unicode.as_ref().and_then(|p| match external(&doc, p) {
            Ok(font) => Some(font),
            Err(detail) => {
                warn!("Unicode font {} unusable, using built-in fonts: {}", p.display(), detail);
                warnings.push(StageWarning::FontFallback {
                    path: p.clone(),
                    detail,
                });
                None
            }
        });
        let mono = paths.mono.as_ref().and_then(|p| match external(&doc, p) {
            Ok(font) => Some(font),
            Err(detail) => {
                warn!("Mono font {} unusable, using Courier: {}", p.display(), detail);
                warnings.push(StageWarning::FontFallback {
                    path: p.clone(),
                    detail,
                });
                None
            }
        });

        let coverage = FontCoverage {
            unicode_text: unicode.is_some(),
            unicode_mono: mono.is_some(),
        };
        let fonts = match unicode {
            Some(font) => FontSet {
                regular: font.clone(),
                bold: font.clone(),
                italic: font,
                mono: match mono {
                    Some(m) => m,
                    None => builtin(&doc, BuiltinFont::Courier)?,
                },
                coverage,
            },
            None => FontSet {
                regular: builtin(&doc, BuiltinFont::Helvetica)?,
                bold: builtin(&doc, BuiltinFont::HelveticaBold)?,
                italic: builtin(&doc, BuiltinFont::HelveticaOblique)?,
                mono: match mono {
                    Some(m) => m,
                    None => builtin(&doc, BuiltinFont::Courier)?,
                },
                coverage,
            },
        };
        debug!(?coverage, "PDF fonts registered");

        Ok(Self {
            doc,
            fonts,
            width,
            height,
            first_page_used: false,
            first_page: (page, layer),
            warnings,
        })
    }

    /// What the registered fonts can encode; the layout must be composed for it.
    pub fn coverage(&self) -> FontCoverage {
        self.fonts.coverage
    }

    fn next_layer(&mut self) -> PdfLayerReference {
        let (page, layer) = if self.first_page_used {
            self.doc
                .add_page(Mm(self.width), Mm(self.height), "Layer 1")
        } else {
            self.first_page_used = true;
            self.first_page
        };
        self.doc.get_page(page).get_layer(layer)
    }

    /// Paint every page of the plan.
    pub fn paint(&mut self, plan: &LayoutPlan) {
        for page in &plan.pages {
            let layer = self.next_layer();
            for element in &page.elements {
                self.paint_element(&layer, element);
            }
        }
    }

    fn paint_element(&mut self, layer: &PdfLayerReference, element: &Element) {
        match element {
            Element::Text {
                x,
                y,
                size,
                role,
                color,
                text,
            } => {
                layer.set_fill_color(pdf_color(*color));
                layer.use_text(
                    text.as_str(),
                    *size,
                    Mm(*x),
                    Mm(self.height - y),
                    self.fonts.get(*role),
                );
            }
            Element::Rect { x, y, w, h, color } => {
                layer.set_fill_color(pdf_color(*color));
                let top = self.height - y;
                let bottom = top - h;
                let ring = vec![
                    (Point::new(Mm(*x), Mm(bottom)), false),
                    (Point::new(Mm(x + w), Mm(bottom)), false),
                    (Point::new(Mm(x + w), Mm(top)), false),
                    (Point::new(Mm(*x), Mm(top)), false),
                ];
                layer.add_polygon(Polygon {
                    rings: vec![ring],
                    mode: PaintMode::Fill,
                    winding_order: WindingOrder::NonZero,
                });
            }
            Element::Image { path, x, y, w, h } => match image::open(path) {
                Ok(img) => self.paint_image(layer, img, *x, *y, *w, *h),
                Err(e) => {
                    warn!("Skipping image {}: {}", path.display(), e);
                    self.warnings.push(StageWarning::LayoutImage {
                        path: path.clone(),
                        detail: e.to_string(),
                    });
                }
            },
        }
    }

    fn paint_image(
        &self,
        layer: &PdfLayerReference,
        img: DynamicImage,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) {
        let (px_w, px_h) = img.dimensions();
        if px_w == 0 || px_h == 0 {
            return;
        }
        let natural_w = px_w as f32 / IMAGE_DPI * 25.4;
        let natural_h = px_h as f32 / IMAGE_DPI * 25.4;
        let scale = (w / natural_w).min(h / natural_h);
        let draw_w = natural_w * scale;
        let draw_h = natural_h * scale;
        let left = x + (w - draw_w) / 2.0;
        let top = y + (h - draw_h) / 2.0;

        // Alpha channels are not embedded reliably; flatten to RGB.
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        Image::from_dynamic_image(&rgb).add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(left)),
                translate_y: Some(Mm(self.height - top - draw_h)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
    }

    /// Serialise the document. Returns the bytes and the warnings collected
    /// while loading fonts and painting.
    pub fn finish(self) -> Result<(Vec<u8>, Vec<StageWarning>), SopError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc
            .save(&mut buf)
            .map_err(|e| render_err("PDF save error", e))?;
        let bytes = buf
            .into_inner()
            .map_err(|e| render_err("PDF buffer error", e))?;
        Ok((bytes, self.warnings))
    }
}

fn pdf_color(c: Rgb) -> Color {
    Color::Rgb(printpdf::Rgb::new(
        c.0 as f32 / 255.0,
        c.1 as f32 / 255.0,
        c.2 as f32 / 255.0,
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::layout::PagePlan;

    fn text(s: &str) -> Element {
        Element::Text {
            x: 20.0,
            y: 30.0,
            size: 11.0,
            role: FontRole::Regular,
            color: Rgb(0, 0, 0),
            text: s.into(),
        }
    }

    #[test]
    fn missing_font_falls_back_with_warning() {
        let paths = FontPaths {
            unicode: Some(PathBuf::from("/nonexistent/DejaVuSans.ttf")),
            mono: None,
        };
        let writer = PdfWriter::new("t", 210.0, 297.0, &paths).unwrap();
        assert_eq!(writer.coverage(), FontCoverage::CONSTRAINED);
        let (_, warnings) = writer.finish().unwrap();
        assert!(matches!(warnings[0], StageWarning::FontFallback { .. }));
    }

    #[test]
    fn paints_pages_and_produces_pdf_bytes() {
        let mut writer = PdfWriter::new("t", 210.0, 297.0, &FontPaths::default()).unwrap();
        let plan = LayoutPlan {
            pages: vec![
                PagePlan {
                    heading: None,
                    elements: vec![
                        text("cover"),
                        Element::Rect {
                            x: 0.0,
                            y: 100.0,
                            w: 210.0,
                            h: 5.0,
                            color: Rgb(34, 197, 94),
                        },
                    ],
                },
                PagePlan {
                    heading: Some("Procedure".into()),
                    elements: vec![text("Step 1: go")],
                },
            ],
            cover_badge: "AUDIT STATUS: APPROVED".into(),
        };
        writer.paint(&plan);
        let (bytes, warnings) = writer.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn unreadable_image_leaves_empty_cell_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("frame.jpg");
        std::fs::write(&bogus, b"not a jpeg").unwrap();

        let good = dir.path().join("ok.png");
        image::RgbImage::from_pixel(32, 18, image::Rgb([200, 10, 10]))
            .save(&good)
            .unwrap();

        let mut writer = PdfWriter::new("t", 210.0, 297.0, &FontPaths::default()).unwrap();
        let cell = |path: PathBuf| Element::Image {
            path,
            x: 15.0,
            y: 40.0,
            w: 57.0,
            h: 34.0,
        };
        writer.paint(&LayoutPlan {
            pages: vec![PagePlan {
                heading: None,
                elements: vec![cell(bogus), cell(good)],
            }],
            cover_badge: String::new(),
        });
        let (bytes, warnings) = writer.finish().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], StageWarning::LayoutImage { .. }));
    }
}
