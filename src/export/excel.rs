//! XLSX rendering with `rust_xlsxwriter`.

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use super::{Cell, Report, Section};
use crate::error::AppResult;

const MONEY_FORMAT: &str = "#,##0.00";

struct Styles {
    bold: Format,
    money: Format,
    bold_money: Format,
    number: Format,
}

impl Styles {
    fn new() -> Self {
        Self {
            bold: Format::new().set_bold(),
            money: Format::new().set_num_format(MONEY_FORMAT),
            bold_money: Format::new().set_bold().set_num_format(MONEY_FORMAT),
            number: Format::new().set_num_format("0.00"),
        }
    }
}

/// One worksheet named after the report: title, header lines, a blank row,
/// then each section followed by a blank row.
pub fn workbook_bytes(report: &Report) -> AppResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let styles = Styles::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(&report.sheet_name)?;
    for (col, width) in report.column_widths.iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }

    sheet.write_string_with_format(0, 0, &report.title, &styles.bold)?;
    let mut row: u32 = 1;
    for line in &report.header_lines {
        sheet.write_string(row, 0, line)?;
        row += 1;
    }
    row += 1;

    for section in &report.sections {
        match section {
            Section::Summary { heading, rows } => {
                sheet.write_string_with_format(row, 0, heading, &styles.bold)?;
                row += 1;
                for (label, value) in rows {
                    sheet.write_string(row, 0, label)?;
                    write_cell(sheet, row, 1, value, &styles, false)?;
                    row += 1;
                }
            }
            Section::Table {
                heading,
                headers,
                rows,
                footer,
            } => {
                if let Some(heading) = heading {
                    sheet.write_string_with_format(row, 0, heading, &styles.bold)?;
                    row += 1;
                }
                for (col, header) in headers.iter().enumerate() {
                    sheet.write_string_with_format(row, col as u16, header, &styles.bold)?;
                }
                row += 1;
                for cells in rows {
                    for (col, cell) in cells.iter().enumerate() {
                        write_cell(sheet, row, col as u16, cell, &styles, false)?;
                    }
                    row += 1;
                }
                if let Some(cells) = footer {
                    for (col, cell) in cells.iter().enumerate() {
                        write_cell(sheet, row, col as u16, cell, &styles, true)?;
                    }
                    row += 1;
                }
            }
        }
        row += 1;
    }

    Ok(workbook.save_to_buffer()?)
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &Cell,
    styles: &Styles,
    bold: bool,
) -> AppResult<()> {
    match cell {
        Cell::Text(s) if s.is_empty() => {}
        Cell::Text(s) if bold => {
            sheet.write_string_with_format(row, col, s, &styles.bold)?;
        }
        Cell::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
        Cell::Money(v) => {
            let fmt = if bold { &styles.bold_money } else { &styles.money };
            sheet.write_number_with_format(row, col, *v, fmt)?;
        }
        Cell::Number(v) => {
            sheet.write_number_with_format(row, col, *v, &styles.number)?;
        }
        Cell::Int(v) if bold => {
            sheet.write_number_with_format(row, col, *v as f64, &styles.bold)?;
        }
        Cell::Int(v) => {
            sheet.write_number(row, col, *v as f64)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::sample_report;
    use std::io::Read;

    fn sheet_xml(bytes: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("xlsx is a zip");
        let mut xml = String::new();
        archive
            .by_name("xl/worksheets/sheet1.xml")
            .expect("sheet1")
            .read_to_string(&mut xml)
            .expect("read sheet");
        xml
    }

    #[test]
    fn test_workbook_has_named_sheet_and_numbers() {
        let bytes = workbook_bytes(&sample_report()).expect("workbook");
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(&bytes[..])).expect("zip");
        let mut wb = String::new();
        archive
            .by_name("xl/workbook.xml")
            .expect("workbook.xml")
            .read_to_string(&mut wb)
            .expect("read");
        assert!(wb.contains(r#"name="ToPay""#));

        let xml = sheet_xml(&bytes);
        assert!(xml.contains("<v>3900</v>"));
        assert!(xml.contains("<v>7800</v>"));
        assert!(xml.contains("<col "));
    }

    #[test]
    fn test_invalid_sheet_name_is_an_export_error() {
        let mut report = sample_report();
        report.sheet_name = "Bad/Name".into();
        let err = workbook_bytes(&report).expect_err("invalid name");
        assert!(matches!(err, crate::error::AppError::Export(_)));
    }
}
