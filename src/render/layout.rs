//! Page composition.
//!
//! [`LayoutEngine::compose`] turns a [`DocumentModel`] into a [`LayoutPlan`]:
//! a list of pages, each a list of absolutely positioned [`Element`]s. The
//! plan is pure data (millimetres, origin at the top-left corner) so page
//! breaks, grid wrapping and font fallback are testable without a PDF
//! backend; [`crate::render::pdf`] only paints it.
//!
//! Composition order is fixed:
//!
//! ```text
//! cover ─▶ leading sections (one page each, flowing) ─▶ screenshot grid ─▶ trailing sections
//! ```

use crate::audit::AuditVerdict;
use crate::render::text::{sanitize_latin1, split_monospace, wrap, wrap_preformatted};
use crate::schedule::format_timestamp;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const PT_TO_MM: f32 = 0.3528;
/// Space kept below the top margin for the running header.
const HEADER_ROOM: f32 = 5.0;

/// RGB colour, 0–255 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

const INK: Rgb = Rgb(50, 50, 50);
const TITLE_INK: Rgb = Rgb(30, 30, 30);
const MUTED: Rgb = Rgb(100, 100, 100);
const FAINT: Rgb = Rgb(150, 150, 150);
const FOOTER: Rgb = Rgb(128, 128, 128);
const ACCENT: Rgb = Rgb(79, 70, 229);
const PASS_STRIPE: Rgb = Rgb(34, 197, 94);
const FAIL_STRIPE: Rgb = Rgb(239, 68, 68);
const PASS_BADGE_BG: Rgb = Rgb(220, 252, 231);
const PASS_BADGE_FG: Rgb = Rgb(22, 163, 74);
const FAIL_BADGE_BG: Rgb = Rgb(254, 226, 226);
const FAIL_BADGE_FG: Rgb = Rgb(220, 38, 38);
const WARN_BG: Rgb = Rgb(254, 243, 199);
const WARN_FG: Rgb = Rgb(180, 83, 9);

/// Which font a text element is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FontRole {
    Regular,
    Bold,
    Italic,
    Mono,
}

impl FontRole {
    /// Average advance width as a fraction of the font size.
    fn width_factor(self) -> f32 {
        match self {
            FontRole::Regular | FontRole::Italic => 0.5,
            FontRole::Bold => 0.55,
            FontRole::Mono => 0.6,
        }
    }
}

/// Which roles can carry arbitrary Unicode. Roles that cannot are fed
/// [`sanitize_latin1`]-ed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontCoverage {
    pub unicode_text: bool,
    pub unicode_mono: bool,
}

impl FontCoverage {
    pub const CONSTRAINED: FontCoverage = FontCoverage {
        unicode_text: false,
        unicode_mono: false,
    };

    fn is_unicode(&self, role: FontRole) -> bool {
        match role {
            FontRole::Mono => self.unicode_mono,
            _ => self.unicode_text,
        }
    }
}

/// A positioned drawing instruction. Coordinates in mm from the top-left.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Element {
    /// `y` is the text baseline.
    Text {
        x: f32,
        y: f32,
        size: f32,
        role: FontRole,
        color: Rgb,
        text: String,
    },
    /// Filled rectangle; `y` is the top edge.
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Rgb,
    },
    /// Image fitted inside the box, aspect ratio preserved; `y` is the top edge.
    Image {
        path: PathBuf,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    },
}

/// One output page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PagePlan {
    /// Heading the page was opened with, if any.
    pub heading: Option<String>,
    pub elements: Vec<Element>,
}

/// The composed document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayoutPlan {
    pub pages: Vec<PagePlan>,
    /// Text of the audit badge printed on the cover.
    pub cover_badge: String,
}

impl LayoutPlan {
    pub fn headings(&self) -> Vec<String> {
        self.pages.iter().filter_map(|p| p.heading.clone()).collect()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All text on a page, in drawing order. Handy for assertions.
    pub fn page_text(&self, index: usize) -> Vec<&str> {
        self.pages
            .get(index)
            .map(|p| {
                p.elements
                    .iter()
                    .filter_map(|e| match e {
                        Element::Text { text, .. } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A titled block of prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionBlock {
    pub title: String,
    pub body: String,
}

/// A captured frame and the instant it was taken at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    pub path: PathBuf,
    pub at: f64,
}

/// Everything the layout engine needs to compose a document.
#[derive(Debug, Clone)]
pub struct DocumentModel {
    pub title: String,
    pub subtitle: String,
    pub verdict: AuditVerdict,
    pub generated_on: String,
    pub qr_code: Option<PathBuf>,
    pub sections: Vec<SectionBlock>,
    pub screenshots: Vec<Screenshot>,
    pub trailing: Vec<SectionBlock>,
}

/// Screenshot grid geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub columns: usize,
    pub max_rows: usize,
    pub cell_width: f32,
    pub cell_height: f32,
    pub gap: f32,
    pub caption_height: f32,
    pub title: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 3,
            max_rows: 5,
            cell_width: 57.0,
            cell_height: 34.0,
            gap: 4.0,
            caption_height: 6.0,
            title: "Video Screenshots".to_string(),
        }
    }
}

impl GridConfig {
    fn row_pitch(&self) -> f32 {
        self.cell_height + self.caption_height + self.gap
    }
}

/// Page geometry and typography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub page_width: f32,
    pub page_height: f32,
    pub margin_left: f32,
    pub margin_right: f32,
    pub margin_top: f32,
    pub margin_bottom: f32,
    pub body_size: f32,
    pub body_line: f32,
    pub mono_size: f32,
    pub mono_line: f32,
    pub heading_size: f32,
    pub running_header: String,
    pub branding: String,
    pub grid: GridConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_width: 210.0,
            page_height: 297.0,
            margin_left: 15.0,
            margin_right: 15.0,
            margin_top: 20.0,
            margin_bottom: 20.0,
            body_size: 11.0,
            body_line: 6.0,
            mono_size: 9.0,
            mono_line: 4.6,
            heading_size: 16.0,
            running_header: "video2sop SOP".to_string(),
            branding: "Generated by video2sop".to_string(),
            grid: GridConfig::default(),
        }
    }
}

impl LayoutConfig {
    pub fn content_width(&self) -> f32 {
        self.page_width - self.margin_left - self.margin_right
    }

    /// Height taken by a page heading (title + rule + spacing).
    fn heading_block(&self) -> f32 {
        self.heading_size * PT_TO_MM + 9.0
    }

    /// Check that the grid fits horizontally and vertically on one page.
    pub fn validate(&self) -> Result<(), String> {
        let g = &self.grid;
        if g.columns == 0 || g.max_rows == 0 {
            return Err("grid columns and rows must be ≥ 1".into());
        }
        let needed_w = g.columns as f32 * g.cell_width + (g.columns as f32 - 1.0) * g.gap;
        if needed_w > self.content_width() + 0.01 {
            return Err(format!(
                "grid needs {needed_w:.1}mm but only {:.1}mm are available",
                self.content_width()
            ));
        }
        let needed_h = HEADER_ROOM + self.heading_block() + g.max_rows as f32 * g.row_pitch();
        let avail_h = self.page_height - self.margin_top - self.margin_bottom;
        if needed_h > avail_h + 0.01 {
            return Err(format!(
                "{} grid rows need {needed_h:.1}mm but only {avail_h:.1}mm are available",
                g.max_rows
            ));
        }
        if self.body_line <= 0.0 || self.mono_line <= 0.0 {
            return Err("line heights must be positive".into());
        }
        Ok(())
    }
}

/// Grid placement cursor: (page, column, row).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridCursor {
    pub page: usize,
    pub column: usize,
    pub row: usize,
}

impl GridCursor {
    /// Move to the next cell; returns `true` when a new page must be opened
    /// before placing at the new position.
    fn advance(&mut self, columns: usize, max_rows: usize) -> bool {
        self.column += 1;
        if self.column == columns {
            self.column = 0;
            self.row += 1;
        }
        if self.row == max_rows {
            self.page += 1;
            self.row = 0;
            self.column = 0;
            return true;
        }
        false
    }
}

/// Composes documents into page plans.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
    coverage: FontCoverage,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig, coverage: FontCoverage) -> Self {
        Self { config, coverage }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn compose(&self, doc: &DocumentModel) -> LayoutPlan {
        let mut c = Composer {
            engine: self,
            pages: Vec::new(),
            y: 0.0,
        };

        let cover_badge = c.cover(doc);

        let mut banner = (!doc.verdict.passed()).then(|| {
            format!(
                "WARNING: This document failed automated compliance checks: {}",
                doc.verdict.reason
            )
        });

        for section in doc.sections.iter().filter(|s| !s.body.trim().is_empty()) {
            c.section(section, banner.take());
        }
        if !doc.screenshots.is_empty() {
            c.grid(&doc.screenshots, banner.take());
        }
        for section in doc.trailing.iter().filter(|s| !s.body.trim().is_empty()) {
            c.section(section, banner.take());
        }
        if let Some(text) = banner.take() {
            // Nothing but the cover was produced; keep the warning visible.
            c.new_page(None);
            c.banner(&text);
        }

        c.decorate();
        LayoutPlan {
            pages: c.pages,
            cover_badge,
        }
    }

    fn prepare(&self, role: FontRole, text: &str) -> String {
        if self.coverage.is_unicode(role) {
            text.to_string()
        } else {
            sanitize_latin1(text)
        }
    }

    fn text_width(&self, text: &str, size: f32, role: FontRole) -> f32 {
        text.chars().count() as f32 * size * PT_TO_MM * role.width_factor()
    }

    fn chars_per_line(&self, width: f32, size: f32, role: FontRole) -> usize {
        (width / (size * PT_TO_MM * role.width_factor())).floor().max(1.0) as usize
    }
}

struct Composer<'a> {
    engine: &'a LayoutEngine,
    pages: Vec<PagePlan>,
    /// Top of the free area on the current page, mm from the top edge.
    y: f32,
}

impl Composer<'_> {
    fn cfg(&self) -> &LayoutConfig {
        &self.engine.config
    }

    fn page(&mut self) -> &mut PagePlan {
        if self.pages.is_empty() {
            self.pages.push(PagePlan::default());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn push(&mut self, element: Element) {
        self.page().elements.push(element);
    }

    fn bottom(&self) -> f32 {
        self.cfg().page_height - self.cfg().margin_bottom
    }

    fn new_page(&mut self, heading: Option<&str>) {
        self.pages.push(PagePlan {
            heading: heading.map(str::to_string),
            elements: Vec::new(),
        });
        self.y = self.cfg().margin_top + HEADER_ROOM;
        if let Some(h) = heading {
            self.heading(h);
        }
    }

    fn heading(&mut self, title: &str) {
        let cfg = self.cfg().clone();
        let text = self.engine.prepare(FontRole::Bold, title);
        let baseline = self.y + cfg.heading_size * PT_TO_MM;
        self.push(Element::Text {
            x: cfg.margin_left,
            y: baseline,
            size: cfg.heading_size,
            role: FontRole::Bold,
            color: ACCENT,
            text,
        });
        self.push(Element::Rect {
            x: cfg.margin_left,
            y: baseline + 2.5,
            w: cfg.content_width(),
            h: 0.4,
            color: ACCENT,
        });
        self.y += cfg.heading_block();
    }

    fn centered(&mut self, y: f32, size: f32, role: FontRole, color: Rgb, text: &str) {
        let text = self.engine.prepare(role, text);
        let w = self.engine.text_width(&text, size, role);
        let x = ((self.cfg().page_width - w) / 2.0).max(self.cfg().margin_left);
        self.push(Element::Text {
            x,
            y,
            size,
            role,
            color,
            text,
        });
    }

    /// Lay out the cover page; returns the badge text.
    fn cover(&mut self, doc: &DocumentModel) -> String {
        let cfg = self.cfg().clone();
        self.pages.push(PagePlan {
            heading: None,
            elements: Vec::new(),
        });
        let passed = doc.verdict.passed();

        self.push(Element::Rect {
            x: 0.0,
            y: 100.0,
            w: cfg.page_width,
            h: 5.0,
            color: if passed { PASS_STRIPE } else { FAIL_STRIPE },
        });

        // Title, at most three lines.
        let mut y = 120.0;
        let title_size = 28.0;
        let per_line = self
            .engine
            .chars_per_line(cfg.content_width(), title_size, FontRole::Bold);
        for line in wrap(&doc.title, per_line).into_iter().take(3) {
            self.centered(y, title_size, FontRole::Bold, TITLE_INK, &line);
            y += 13.0;
        }

        y += 6.0;
        self.centered(y, 14.0, FontRole::Regular, MUTED, &doc.subtitle);

        // Badge.
        y += 16.0;
        let badge = if passed {
            "AUDIT STATUS: APPROVED"
        } else {
            "AUDIT STATUS: DRAFT REJECTED"
        };
        let (bg, fg) = if passed {
            (PASS_BADGE_BG, PASS_BADGE_FG)
        } else {
            (FAIL_BADGE_BG, FAIL_BADGE_FG)
        };
        let badge_w = self.engine.text_width(badge, 12.0, FontRole::Bold) + 20.0;
        self.push(Element::Rect {
            x: (cfg.page_width - badge_w) / 2.0,
            y: y - 8.0,
            w: badge_w,
            h: 12.0,
            color: bg,
        });
        self.centered(y, 12.0, FontRole::Bold, fg, badge);

        if !passed && !doc.verdict.reason.is_empty() {
            y += 5.0;
            let reason = format!("Reason: {}", doc.verdict.reason);
            let per_line = self
                .engine
                .chars_per_line(cfg.content_width(), 10.0, FontRole::Italic);
            for line in wrap(&reason, per_line).into_iter().take(4) {
                y += 6.0;
                self.centered(y, 10.0, FontRole::Italic, FAIL_BADGE_FG, &line);
            }
        }

        y += 15.0;
        self.centered(
            y,
            12.0,
            FontRole::Regular,
            Rgb(80, 80, 80),
            &format!("Generated on: {}", doc.generated_on),
        );

        if let Some(ref qr) = doc.qr_code {
            let size = 35.0;
            let top = (y + 8.0).min(cfg.page_height - 50.0 - size);
            self.push(Element::Image {
                path: qr.clone(),
                x: (cfg.page_width - size) / 2.0,
                y: top,
                w: size,
                h: size,
            });
        }

        self.centered(
            cfg.page_height - 40.0,
            10.0,
            FontRole::Italic,
            FAINT,
            &cfg.branding,
        );

        badge.to_string()
    }

    fn banner(&mut self, message: &str) {
        let cfg = self.cfg().clone();
        let size = 11.0;
        let line_h = cfg.body_line;
        let per_line =
            self.engine
                .chars_per_line(cfg.content_width() - 6.0, size, FontRole::Bold);
        let text = self.engine.prepare(FontRole::Bold, message);
        let lines = wrap(&text, per_line);
        let h = lines.len() as f32 * line_h + 4.0;
        self.push(Element::Rect {
            x: cfg.margin_left,
            y: self.y,
            w: cfg.content_width(),
            h,
            color: WARN_BG,
        });
        let mut baseline = self.y + 2.0 + line_h * 0.75;
        for line in lines {
            self.push(Element::Text {
                x: cfg.margin_left + 3.0,
                y: baseline,
                size,
                role: FontRole::Bold,
                color: WARN_FG,
                text: line,
            });
            baseline += line_h;
        }
        self.y += h + 5.0;
    }

    /// Emit wrapped lines, opening continuation pages as needed.
    fn flow(&mut self, lines: Vec<String>, size: f32, line_h: f32, role: FontRole) {
        let x = self.cfg().margin_left;
        for line in lines {
            if self.y + line_h > self.bottom() {
                self.new_page(None);
            }
            let baseline = self.y + line_h * 0.75;
            if !line.is_empty() {
                self.push(Element::Text {
                    x,
                    y: baseline,
                    size,
                    role,
                    color: INK,
                    text: line,
                });
            }
            self.y += line_h;
        }
    }

    fn body(&mut self, text: &str) {
        let cfg = self.cfg().clone();
        let width = cfg.content_width();
        let text_lines = |engine: &LayoutEngine, t: &str| {
            let t = engine.prepare(FontRole::Regular, t);
            wrap(&t, engine.chars_per_line(width, cfg.body_size, FontRole::Regular))
        };
        match split_monospace(text) {
            Some(split) => {
                let mono = self.engine.prepare(FontRole::Mono, split.monospace);
                let per_line = self
                    .engine
                    .chars_per_line(width, cfg.mono_size, FontRole::Mono);
                self.flow(
                    wrap_preformatted(&mono, per_line),
                    cfg.mono_size,
                    cfg.mono_line,
                    FontRole::Mono,
                );
                if !split.normal.trim().is_empty() {
                    self.y += 2.0;
                    let lines = text_lines(self.engine, split.normal);
                    self.flow(lines, cfg.body_size, cfg.body_line, FontRole::Regular);
                }
            }
            None => {
                let lines = text_lines(self.engine, text);
                self.flow(lines, cfg.body_size, cfg.body_line, FontRole::Regular);
            }
        }
    }

    fn section(&mut self, section: &SectionBlock, banner: Option<String>) {
        self.new_page(None);
        if let Some(b) = banner {
            self.banner(&b);
        }
        self.page().heading = Some(section.title.clone());
        self.heading(&section.title);
        self.body(&section.body);
    }

    fn grid(&mut self, shots: &[Screenshot], banner: Option<String>) {
        let cfg = self.cfg().clone();
        let g = cfg.grid.clone();
        let continued = format!("{} (continued)", g.title);

        self.new_page(None);
        if let Some(b) = banner {
            self.banner(&b);
            // The banner eats into the first grid page; move on if rows no longer fit.
            if self.y + cfg.heading_block() + g.max_rows as f32 * g.row_pitch() > self.bottom() {
                self.new_page(None);
            }
        }
        self.page().heading = Some(g.title.clone());
        self.heading(&g.title);

        let mut cursor = GridCursor::default();
        let mut origin = self.y;
        for (i, shot) in shots.iter().enumerate() {
            let x = cfg.margin_left + cursor.column as f32 * (g.cell_width + g.gap);
            let y = origin + cursor.row as f32 * g.row_pitch();
            self.push(Element::Image {
                path: shot.path.clone(),
                x,
                y,
                w: g.cell_width,
                h: g.cell_height,
            });
            let caption = format!("Screenshot at {}", format_timestamp(shot.at));
            let cap_w = self.engine.text_width(&caption, 8.0, FontRole::Italic);
            self.push(Element::Text {
                x: x + ((g.cell_width - cap_w) / 2.0).max(0.0),
                y: y + g.cell_height + g.caption_height * 0.7,
                size: 8.0,
                role: FontRole::Italic,
                color: MUTED,
                text: caption,
            });

            let more = i + 1 < shots.len();
            if cursor.advance(g.columns, g.max_rows) && more {
                self.new_page(Some(&continued));
                origin = self.y;
            }
        }
        self.y = origin + (cursor.row as f32 + 1.0) * g.row_pitch();
    }

    /// Running header on every page after the cover, `Page n/N` on all pages.
    fn decorate(&mut self) {
        let cfg = self.cfg().clone();
        let total = self.pages.len();
        let header = self.engine.prepare(FontRole::Bold, &cfg.running_header);
        let header_w = self.engine.text_width(&header, 10.0, FontRole::Bold);
        for (i, page) in self.pages.iter_mut().enumerate() {
            if i > 0 {
                page.elements.push(Element::Text {
                    x: cfg.page_width - cfg.margin_right - header_w,
                    y: cfg.margin_top - 5.0,
                    size: 10.0,
                    role: FontRole::Bold,
                    color: MUTED,
                    text: header.clone(),
                });
            }
            let footer = format!("Page {}/{}", i + 1, total);
            let w = self.engine.text_width(&footer, 8.0, FontRole::Italic);
            page.elements.push(Element::Text {
                x: (cfg.page_width - w) / 2.0,
                y: cfg.page_height - 10.0,
                size: 8.0,
                role: FontRole::Italic,
                color: FOOTER,
                text: footer,
            });
        }
    }
}
