//! Minimal PDF 1.4 writer for A4 documents.
//!
//! Coordinates are millimetres from the top-left corner of the page, the way
//! a document is laid out on paper. Text uses the three built-in Helvetica
//! faces with WinAnsi encoding, so no font program is embedded.
//!
//! ```rust,ignore
//! let mut pdf = PdfBuilder::new();
//! pdf.font(Font::Bold, 18.0).text_centered(20.0, "GOODS CONSIGNMENT NOTE");
//! pdf.color([41, 128, 185]).fill_rect(14.0, 30.0, 182.0, 8.0);
//! let bytes = pdf.build();
//! ```

use std::fmt::Write as _;

use qrcode::types::{Color, QrError};
use qrcode::QrCode;

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 14.0;
pub const CONTENT_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;
/// Rows that would cross this line start a new page.
pub const PAGE_BREAK_MM: f32 = 280.0;

const PT_PER_MM: f32 = 72.0 / 25.4;

pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];
pub const WHITE: Rgb = [255, 255, 255];
pub const GREY: Rgb = [110, 110, 110];
const GRID: Rgb = [200, 200, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
            Font::Italic => "Helvetica-Oblique",
        }
    }
}

const FONTS: [Font; 3] = [Font::Regular, Font::Bold, Font::Italic];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

fn x_pt(mm: f32) -> f32 {
    mm * PT_PER_MM
}

fn y_pt(mm_from_top: f32) -> f32 {
    (PAGE_HEIGHT_MM - mm_from_top) * PT_PER_MM
}

fn rgb_operands(c: Rgb) -> String {
    format!(
        "{:.3} {:.3} {:.3}",
        f32::from(c[0]) / 255.0,
        f32::from(c[1]) / 255.0,
        f32::from(c[2]) / 255.0
    )
}

/// Page-content builder. Every drawing call appends to the current page.
pub struct PdfBuilder {
    pages: Vec<String>,
    font: Font,
    size: f32,
    color: Rgb,
    stroke: Rgb,
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            pages: vec![String::with_capacity(4096)],
            font: Font::Regular,
            size: 10.0,
            color: BLACK,
            stroke: GRID,
        }
    }

    fn page(&mut self) -> &mut String {
        if self.pages.is_empty() {
            self.pages.push(String::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn font(&mut self, font: Font, size: f32) -> &mut Self {
        self.font = font;
        self.size = size;
        self
    }

    /// Colour for text and filled shapes.
    pub fn color(&mut self, rgb: Rgb) -> &mut Self {
        self.color = rgb;
        self
    }

    /// Colour for outlines and lines.
    pub fn stroke_color(&mut self, rgb: Rgb) -> &mut Self {
        self.stroke = rgb;
        self
    }

    pub fn new_page(&mut self) -> &mut Self {
        self.pages.push(String::with_capacity(4096));
        self
    }

    // -----------------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------------

    /// Width of `s` in millimetres at the current font and size.
    pub fn text_width(&self, s: &str) -> f32 {
        let units: u32 = s.chars().map(glyph_width).sum();
        units as f32 * self.size / 1000.0 / PT_PER_MM
    }

    /// Draw `s` with its baseline at `y` and its left edge at `x`.
    pub fn text(&mut self, x: f32, y: f32, s: &str) -> &mut Self {
        let op = format!(
            "{} rg BT /{} {:.1} Tf {:.2} {:.2} Td ({}) Tj ET\n",
            rgb_operands(self.color),
            self.font.resource(),
            self.size,
            x_pt(x),
            y_pt(y),
            escape(&encode_winansi(s))
        );
        self.page().push_str(&op);
        self
    }

    pub fn text_centered(&mut self, y: f32, s: &str) -> &mut Self {
        let x = (PAGE_WIDTH_MM - self.text_width(s)) / 2.0;
        self.text(x, y, s)
    }

    /// Draw `s` ending at `right`.
    pub fn text_right(&mut self, right: f32, y: f32, s: &str) -> &mut Self {
        let x = right - self.text_width(s);
        self.text(x, y, s)
    }

    /// Shorten `s` with a trailing "..." until it fits `max_width`.
    pub fn fit(&self, s: &str, max_width: f32) -> String {
        if self.text_width(s) <= max_width {
            return s.to_string();
        }
        let mut chars: Vec<char> = s.chars().collect();
        while !chars.is_empty() {
            chars.pop();
            let candidate: String = chars.iter().collect::<String>() + "...";
            if self.text_width(&candidate) <= max_width {
                return candidate;
            }
        }
        String::new()
    }

    // -----------------------------------------------------------------------
    // Shapes
    // -----------------------------------------------------------------------

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32) -> &mut Self {
        let op = format!(
            "{} rg {:.2} {:.2} {:.2} {:.2} re f\n",
            rgb_operands(self.color),
            x_pt(x),
            y_pt(y + h),
            w * PT_PER_MM,
            h * PT_PER_MM
        );
        self.page().push_str(&op);
        self
    }

    /// QR code of `data` as a `size` mm square with its top-left corner at
    /// (`x`, `y`), one filled rectangle per dark module in the current colour.
    pub fn qr_code(
        &mut self,
        x: f32,
        y: f32,
        size: f32,
        data: &str,
    ) -> Result<&mut Self, QrError> {
        let code = QrCode::new(data.as_bytes())?;
        let width = code.width();
        let module = size / width as f32;
        for (i, color) in code.to_colors().into_iter().enumerate() {
            if color == Color::Dark {
                let (col, row) = (i % width, i / width);
                self.fill_rect(x + col as f32 * module, y + row as f32 * module, module, module);
            }
        }
        Ok(self)
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32) -> &mut Self {
        let op = format!(
            "{} RG 0.5 w {:.2} {:.2} {:.2} {:.2} re S\n",
            rgb_operands(self.stroke),
            x_pt(x),
            y_pt(y + h),
            w * PT_PER_MM,
            h * PT_PER_MM
        );
        self.page().push_str(&op);
        self
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> &mut Self {
        let op = format!(
            "{} RG 0.5 w {:.2} {:.2} m {:.2} {:.2} l S\n",
            rgb_operands(self.stroke),
            x_pt(x1),
            y_pt(y1),
            x_pt(x2),
            y_pt(y2)
        );
        self.page().push_str(&op);
        self
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    /// Draw a grid table starting at `y` and return the y below it. Rows that
    /// would cross the page-break line continue on a new page under a
    /// repeated header.
    pub fn table(&mut self, y: f32, table: &Table) -> f32 {
        const ROW_H: f32 = 7.0;
        const PAD: f32 = 1.8;
        const BASELINE: f32 = 4.8;

        let widths = self.column_widths(table);
        let mut y = y;

        let draw_row = |pdf: &mut Self, y: f32, cells: &[String], fill: Option<Rgb>, bold: bool| {
            let mut x = MARGIN_MM;
            for (i, w) in widths.iter().enumerate() {
                if let Some(bg) = fill {
                    pdf.color(bg).fill_rect(x, y, *w, ROW_H);
                }
                pdf.stroke_color(GRID).stroke_rect(x, y, *w, ROW_H);
                let font = if bold { Font::Bold } else { Font::Regular };
                pdf.font(font, 9.0)
                    .color(if fill.is_some() { WHITE } else { BLACK });
                let raw = cells.get(i).map(String::as_str).unwrap_or("");
                let shown = pdf.fit(raw, w - 2.0 * PAD);
                match table.align.get(i).copied().unwrap_or(Align::Left) {
                    Align::Left => pdf.text(x + PAD, y + BASELINE, &shown),
                    Align::Right => pdf.text_right(x + w - PAD, y + BASELINE, &shown),
                };
                x += w;
            }
        };

        draw_row(self, y, &table.headers, Some(table.head_color), true);
        y += ROW_H;

        for row in &table.rows {
            if y + ROW_H > PAGE_BREAK_MM {
                self.new_page();
                y = MARGIN_MM;
                draw_row(self, y, &table.headers, Some(table.head_color), true);
                y += ROW_H;
            }
            draw_row(self, y, row, None, false);
            y += ROW_H;
        }

        if let Some(footer) = &table.footer {
            if y + ROW_H > PAGE_BREAK_MM {
                self.new_page();
                y = MARGIN_MM;
            }
            draw_row(self, y, footer, Some(table.foot_color), true);
            y += ROW_H;
        }

        self.color(BLACK);
        y
    }

    /// Column widths proportional to the widest content of each column,
    /// stretched to the content width, never narrower than 14mm.
    fn column_widths(&mut self, table: &Table) -> Vec<f32> {
        let cols = table.headers.len().max(1);
        let (font, size) = (self.font, self.size);
        self.font(Font::Bold, 9.0);

        let mut natural = vec![0.0f32; cols];
        let all_rows = std::iter::once(&table.headers)
            .chain(table.rows.iter())
            .chain(table.footer.iter());
        for row in all_rows {
            for (i, cell) in row.iter().take(cols).enumerate() {
                natural[i] = natural[i].max(self.text_width(cell) + 4.0);
            }
        }
        self.font(font, size);

        let clamped: Vec<f32> = natural.iter().map(|w| w.clamp(14.0, 70.0)).collect();
        let total: f32 = clamped.iter().sum();
        clamped
            .iter()
            .map(|w| w / total * CONTENT_WIDTH_MM)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    /// Serialise the document: catalog, page tree, fonts, one page object
    /// and content stream per page, then the cross-reference table.
    pub fn build(self) -> Vec<u8> {
        let mut objects: Vec<String> = Vec::new();
        let page_count = self.pages.len();
        let first_page_obj = 3 + FONTS.len();

        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids: Vec<String> = (0..page_count)
            .map(|i| format!("{} 0 R", first_page_obj + 2 * i))
            .collect();
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        ));
        for font in FONTS {
            objects.push(format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                font.base_font()
            ));
        }
        let font_refs: Vec<String> = FONTS
            .iter()
            .enumerate()
            .map(|(i, f)| format!("/{} {} 0 R", f.resource(), 3 + i))
            .collect();

        for (i, content) in self.pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Resources << /Font << {} >> >> /Contents {} 0 R >>",
                x_pt(PAGE_WIDTH_MM),
                PAGE_HEIGHT_MM * PT_PER_MM,
                font_refs.join(" "),
                first_page_obj + 2 * i + 1
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}endstream",
                content.len(),
                content
            ));
        }

        let mut out: Vec<u8> = Vec::with_capacity(8192);
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            out.extend_from_slice(body.as_bytes());
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_at = out.len();
        let mut xref = String::new();
        let _ = write!(xref, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for off in &offsets {
            let _ = write!(xref, "{off:010} 00000 n \n");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        );
        out.extend_from_slice(xref.as_bytes());
        out
    }
}

/// Grid table contents and styling.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub footer: Option<Vec<String>>,
    pub align: Vec<Align>,
    pub head_color: Rgb,
    pub foot_color: Rgb,
}

// ---------------------------------------------------------------------------
// WinAnsi text encoding
// ---------------------------------------------------------------------------

/// Latin-1 characters map to their own code point; anything else becomes `?`.
fn encode_winansi(text: &str) -> String {
    text.chars()
        .map(|ch| match ch as u32 {
            0x20..=0x7E | 0xA0..=0xFF => ch,
            _ => '?',
        })
        .collect()
}

/// Escape the PDF string delimiters, then render Latin-1 characters above
/// 0x7F as octal escapes so the stream stays ASCII.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c if (c as u32) > 0x7E => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Helvetica advance widths (1/1000 em) for printable ASCII.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // space../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :;<=>?@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [\]^_`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {|}~
];

fn glyph_width(ch: char) -> u32 {
    let code = ch as u32;
    if (0x20..=0x7E).contains(&code) {
        u32::from(HELVETICA_WIDTHS[(code - 0x20) as usize])
    } else {
        556
    }
}
