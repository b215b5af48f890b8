//! Save the in-memory model as `.xlsx` using umya-spreadsheet.
//!
//! When the workbook came from a file, that file is reopened and edited:
//! sheets created in memory replace any sheet of the same name, loaded sheets
//! only receive the cells touched since loading, and everything else (styles,
//! widths, defined names, comments, validation) is written back as read.

use anyhow::{anyhow, Context, Result};
use chrono::Datelike;
use std::path::Path;
use tracing::{debug, info};
use umya_spreadsheet::{
    reader, writer, HorizontalAlignmentValues, Spreadsheet, Style, VerticalAlignmentValues,
    Worksheet,
};

use super::package::{self, SheetLayout};
use super::{Cell, CellStyle, CellValue, HAlign, Sheet, Workbook};
use crate::utils::column_letter;

/// Date cells without an explicit number format are written with this one
const DEFAULT_DATE_FORMAT: &str = "dd/mm/yyyy";

/// Write every sheet, in order, to `path`
pub fn save<P: AsRef<Path>>(workbook: &Workbook, path: P) -> Result<()> {
    let path = path.as_ref();

    let mut book = match workbook.source() {
        Some(source) => reader::xlsx::read(source)
            .map_err(|e| anyhow!("Failed to reopen {}: {}", source.display(), e))?,
        None => umya_spreadsheet::new_file_empty_worksheet(),
    };

    for sheet in workbook.sheets() {
        if sheet.is_fresh() {
            if book.get_sheet_by_name(&sheet.name).is_some() {
                book.remove_sheet_by_name(&sheet.name)
                    .map_err(|e| anyhow!("Failed to replace sheet '{}': {}", sheet.name, e))?;
            }
            let worksheet = book
                .new_sheet(&sheet.name)
                .map_err(|e| anyhow!("Failed to create sheet '{}': {}", sheet.name, e))?;
            write_fresh_sheet(sheet, worksheet);
        } else {
            let worksheet = book
                .get_sheet_by_name_mut(&sheet.name)
                .with_context(|| format!("Sheet '{}' is missing from the source file", sheet.name))?;
            write_edits(sheet, worksheet);
        }
    }

    drop_removed_sheets(workbook, &mut book)?;
    order_sheets(workbook, &mut book);

    writer::xlsx::write(&book, path)
        .map_err(|e| anyhow!("Failed to save XLSX file {}: {}", path.display(), e))?;

    let layouts: Vec<(String, SheetLayout)> = workbook
        .sheets()
        .iter()
        .map(|sheet| (sheet.name.clone(), SheetLayout::of(sheet)))
        .filter(|(_, layout)| !layout.is_empty())
        .collect();
    package::patch(path, &layouts)?;

    info!("Workbook saved: {:?}", path);
    Ok(())
}

fn write_fresh_sheet(sheet: &Sheet, worksheet: &mut Worksheet) {
    for range in sheet.merged() {
        worksheet.add_merge_cells(range.to_string());
    }

    let mut written = 0usize;
    for (row, col, cell) in sheet.cells() {
        write_cell(worksheet, row, col, cell);
        written += 1;
    }

    for (col, width) in sheet.column_widths() {
        worksheet
            .get_column_dimension_mut(&column_letter(col))
            .set_width(width);
    }

    debug!("Sheet '{}': {} cell(s) written", sheet.name, written);
}

fn write_edits(sheet: &Sheet, worksheet: &mut Worksheet) {
    let mut written = 0usize;
    for (row, col, cell) in sheet.edited_cells() {
        write_cell(worksheet, row, col, cell);
        written += 1;
    }

    for (col, width) in sheet.column_widths() {
        worksheet
            .get_column_dimension_mut(&column_letter(col))
            .set_width(width);
    }

    debug!("Sheet '{}': {} edited cell(s) written", sheet.name, written);
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, cell: &Cell) {
    let coordinate = format!("{}{}", column_letter(col), row);

    if cell.value.is_none() && cell.style.is_default() {
        worksheet.remove_cell(coordinate.as_str());
        return;
    }

    let target = worksheet.get_cell_mut(coordinate.as_str());
    match &cell.value {
        None => {
            target.set_value_string("");
        }
        Some(CellValue::Text(s)) => {
            target.set_value_string(s.as_str());
        }
        Some(CellValue::Number(n)) => {
            target.set_value_number(*n);
        }
        Some(CellValue::Bool(b)) => {
            target.set_value_bool(*b);
        }
        // A formula keeps the date independent of the 1900/1904 date system
        Some(CellValue::Date(dt)) => {
            target.set_formula(format!("DATE({},{},{})", dt.year(), dt.month(), dt.day()));
        }
        Some(CellValue::Formula(f)) => {
            target.set_formula(f.strip_prefix('=').unwrap_or(f.as_str()));
        }
        Some(CellValue::Error(e)) => {
            target.set_value_string(e.as_str());
        }
    }

    let is_date = matches!(cell.value, Some(CellValue::Date(_)));
    if !cell.style.is_default() || is_date {
        let mut style = build_style(&cell.style);
        if is_date && cell.style.number_format.is_none() {
            style
                .get_number_format_mut()
                .set_format_code(DEFAULT_DATE_FORMAT);
        }
        target.set_style(style);
    }
}

fn build_style(cell_style: &CellStyle) -> Style {
    let mut style = Style::default();

    if let Some(num_format) = &cell_style.number_format {
        style
            .get_number_format_mut()
            .set_format_code(num_format.as_str());
    }

    let font = style.get_font_mut();
    if cell_style.bold {
        font.set_bold(true);
    }
    if cell_style.italic {
        font.set_italic(true);
    }
    if let Some(size) = cell_style.font_size {
        font.set_size(size);
    }
    if let Some(color) = cell_style.font_color {
        font.get_color_mut().set_argb(argb(color));
    }

    if let Some(fill) = cell_style.fill {
        style.set_background_color(argb(fill));
    }

    let alignment = style.get_alignment_mut();
    match cell_style.align {
        Some(HAlign::Left) => alignment.set_horizontal(HorizontalAlignmentValues::Left),
        Some(HAlign::Center) => alignment.set_horizontal(HorizontalAlignmentValues::Center),
        Some(HAlign::Right) => alignment.set_horizontal(HorizontalAlignmentValues::Right),
        None => {}
    }
    if cell_style.vertical_center {
        alignment.set_vertical(VerticalAlignmentValues::Center);
    }

    style
}

fn argb(rgb: u32) -> String {
    format!("FF{:06X}", rgb & 0x00FF_FFFF)
}

/// Delete sheets the model no longer has
fn drop_removed_sheets(workbook: &Workbook, book: &mut Spreadsheet) -> Result<()> {
    let stale: Vec<String> = book
        .get_sheet_collection()
        .iter()
        .map(|ws| ws.get_name().to_string())
        .filter(|name| !workbook.has_sheet(name))
        .collect();

    for name in stale {
        book.remove_sheet_by_name(&name)
            .map_err(|e| anyhow!("Failed to remove sheet '{}': {}", name, e))?;
    }
    Ok(())
}

/// Put the book's sheets in the model's order
fn order_sheets(workbook: &Workbook, book: &mut Spreadsheet) {
    let position = |name: &str| {
        workbook
            .sheet_names()
            .iter()
            .position(|n| *n == name)
            .unwrap_or(usize::MAX)
    };
    book.get_sheet_collection_mut()
        .sort_by_key(|ws| position(ws.get_name()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::{reader as model_reader, CellRange, RowGroup};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load_keeps_values_and_formulas() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.xlsx");

        let mut wb = Workbook::new();
        let mut sheet = Sheet::new("Vendas");
        sheet.set_value(1, 1, "Data");
        sheet.set_value(2, 5, 1500.0);
        let date = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        sheet.set_value(2, 6, date);
        sheet.set_formula(3, 5, "SUM(E2:E2)");
        sheet.merge(CellRange {
            first_row: 1,
            first_col: 1,
            last_row: 1,
            last_col: 3,
        });
        sheet.set_column_width(3, 22.0);
        sheet.set_freeze_panes(4, 4);
        sheet.group_rows(RowGroup {
            first: 5,
            last: 6,
            collapsed: false,
        });
        sheet.set_value(5, 1, "grouped");
        wb.push_sheet(sheet);

        save(&wb, &path).unwrap();
        let loaded = model_reader::load(&path).unwrap();

        assert_eq!(loaded.sheet_names(), vec!["Vendas"]);
        let vendas = loaded.sheet("Vendas").unwrap();
        assert_eq!(vendas.value(1, 1), Some(&CellValue::Text("Data".to_string())));
        assert_eq!(vendas.value(2, 5), Some(&CellValue::Number(1500.0)));
        assert_eq!(
            vendas.value(2, 6),
            Some(&CellValue::Formula("=DATE(2024,1,15)".to_string()))
        );
        assert_eq!(
            vendas.value(3, 5),
            Some(&CellValue::Formula("=SUM(E2:E2)".to_string()))
        );

        let xml = package::read_sheet_xml(&path, "Vendas").unwrap();
        assert!(xml.contains(r#"topLeftCell="D4""#));
        assert!(xml.contains(r#"outlineLevel="1""#));
    }

    #[test]
    fn test_save_over_source_edits_only_touched_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("source.xlsx");

        let mut wb = Workbook::new();
        let mut vendas = Sheet::new("Vendas");
        vendas.set_value(1, 1, "Data");
        vendas.set_value(2, 5, 1500.0);
        wb.push_sheet(vendas);
        let mut folha = Sheet::new("Folha");
        folha.set_value(1, 1, "Competência");
        wb.push_sheet(folha);
        save(&wb, &path).unwrap();

        let mut loaded = model_reader::load(&path).unwrap();
        assert_eq!(loaded.source(), Some(path.as_path()));
        loaded.sheet_mut("Vendas").unwrap().set_value(2, 5, 99.0);
        loaded.remove_sheet("Folha");
        loaded.insert_sheet(0, "DRE").set_value(1, 3, "DRE");
        save(&loaded, &path).unwrap();

        let reread = model_reader::load(&path).unwrap();
        assert_eq!(reread.sheet_names(), vec!["DRE", "Vendas"]);
        let vendas = reread.sheet("Vendas").unwrap();
        assert_eq!(vendas.value(1, 1), Some(&CellValue::Text("Data".to_string())));
        assert_eq!(vendas.value(2, 5), Some(&CellValue::Number(99.0)));
    }

    #[test]
    fn test_argb_pads_color() {
        assert_eq!(argb(0x1F4E78), "FF1F4E78");
        assert_eq!(argb(0xFF), "FF0000FF");
    }
}
