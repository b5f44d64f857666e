//! Report rendering.
//!
//! Reports are assembled once as a format-neutral [`Report`] and then
//! rendered either to a PDF document or to an XLSX workbook.

pub mod excel;
pub mod pdf;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::format;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Pdf,
    Excel,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Excel => "xlsx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Excel => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            other => Err(AppError::validation(format!(
                "unknown export format '{other}' (expected pdf or excel)"
            ))),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Excel => "excel",
        })
    }
}

/// One value in a report. Money and numbers stay numeric in spreadsheets.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Money(f64),
    Number(f64),
    Int(i64),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Cell::Text(_))
    }

    /// Printed form used in PDF documents.
    pub fn display(&self) -> String {
        match self {
            Cell::Text(s) => s.clone(),
            Cell::Money(v) => format::format_rupees(*v),
            Cell::Number(v) => format!("{v:.2}"),
            Cell::Int(v) => v.to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// Label/value pairs under a heading.
    Summary {
        heading: String,
        rows: Vec<(String, Cell)>,
    },
    Table {
        heading: Option<String>,
        headers: Vec<String>,
        rows: Vec<Vec<Cell>>,
        footer: Option<Vec<Cell>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    /// Download name without extension, e.g. `gc-notes-2026-10-19`.
    pub file_stem: String,
    /// Worksheet name; at most 31 characters.
    pub sheet_name: String,
    pub header_lines: Vec<String>,
    pub sections: Vec<Section>,
    /// Spreadsheet column widths in characters, left to right.
    pub column_widths: Vec<f64>,
    /// Table header and footer fill colours in PDF output.
    pub palette: (pdf::Rgb, pdf::Rgb),
}

pub const BLUE_PALETTE: (pdf::Rgb, pdf::Rgb) = ([41, 128, 185], [52, 152, 219]);
pub const RED_PALETTE: (pdf::Rgb, pdf::Rgb) = ([231, 76, 60], [192, 57, 43]);
pub const GREEN_PALETTE: (pdf::Rgb, pdf::Rgb) = ([46, 204, 113], [39, 174, 96]);

impl Report {
    pub fn new(title: impl Into<String>, sheet_name: impl Into<String>, file_stem: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            file_stem: file_stem.into(),
            sheet_name: sheet_name.into(),
            header_lines: Vec::new(),
            sections: Vec::new(),
            column_widths: Vec::new(),
            palette: BLUE_PALETTE,
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.header_lines.push(line.into());
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn widths(mut self, widths: &[f64]) -> Self {
        self.column_widths = widths.to_vec();
        self
    }

    pub fn palette(mut self, palette: (pdf::Rgb, pdf::Rgb)) -> Self {
        self.palette = palette;
        self
    }
}

/// A rendered file ready to be written to disk or sent as a download.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn render(report: &Report, fmt: ExportFormat) -> AppResult<ExportedFile> {
    let bytes = match fmt {
        ExportFormat::Pdf => render_pdf(report),
        ExportFormat::Excel => excel::workbook_bytes(report)?,
    };
    debug!(report = %report.file_stem, format = %fmt, size = bytes.len(), "report rendered");
    Ok(ExportedFile {
        file_name: format!("{}.{}", report.file_stem, fmt.extension()),
        content_type: fmt.content_type(),
        bytes,
    })
}

/// Title, header lines, then each section in order. Summaries print as
/// label/value lines; tables use the grid layout.
fn render_pdf(report: &Report) -> Vec<u8> {
    use pdf::{Align, Font, PdfBuilder, Table, BLACK, MARGIN_MM, PAGE_BREAK_MM};

    let mut doc = PdfBuilder::new();
    doc.font(Font::Bold, 16.0).color(BLACK).text(MARGIN_MM, 20.0, &report.title);
    let mut y = 28.0;
    doc.font(Font::Regular, 10.0);
    for line in &report.header_lines {
        doc.text(MARGIN_MM, y, line);
        y += 6.0;
    }
    y += 4.0;

    for section in &report.sections {
        match section {
            Section::Summary { heading, rows } => {
                if y + 8.0 + 6.0 * rows.len() as f32 > PAGE_BREAK_MM {
                    doc.new_page();
                    y = MARGIN_MM + 6.0;
                }
                doc.font(Font::Bold, 12.0).text(MARGIN_MM, y, heading);
                y += 7.0;
                doc.font(Font::Regular, 10.0);
                for (label, value) in rows {
                    doc.text(MARGIN_MM, y, &format!("{label}: {}", value.display()));
                    y += 6.0;
                }
                y += 4.0;
            }
            Section::Table {
                heading,
                headers,
                rows,
                footer,
            } => {
                if y + 21.0 > PAGE_BREAK_MM {
                    doc.new_page();
                    y = MARGIN_MM + 6.0;
                }
                if let Some(heading) = heading {
                    doc.font(Font::Bold, 12.0).text(MARGIN_MM, y, heading);
                    y += 4.0;
                }
                let align = headers
                    .iter()
                    .enumerate()
                    .map(|(i, _)| {
                        let numeric = rows
                            .first()
                            .and_then(|r| r.get(i))
                            .map(Cell::is_numeric)
                            .unwrap_or(false);
                        if numeric {
                            Align::Right
                        } else {
                            Align::Left
                        }
                    })
                    .collect();
                let table = Table {
                    headers: headers.clone(),
                    rows: rows.iter().map(|r| r.iter().map(Cell::display).collect()).collect(),
                    footer: footer
                        .as_ref()
                        .map(|f| f.iter().map(Cell::display).collect()),
                    align,
                    head_color: report.palette.0,
                    foot_color: report.palette.1,
                };
                y = doc.table(y, &table) + 8.0;
            }
        }
    }

    doc.build()
}
