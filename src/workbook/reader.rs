//! Load an `.xlsx` file into the in-memory model using calamine.

use anyhow::{Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{CellValue, Sheet, Workbook};
use crate::dates;

/// Read every sheet of the workbook: cached values first, then formulas on top
pub fn load<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let path = path.as_ref();
    info!("Loading workbook: {:?}", path);

    let mut excel: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open Excel file {}", path.display()))?;

    let mut workbook = Workbook::from_source(path);
    for name in excel.sheet_names() {
        let mut sheet = Sheet::new(name.as_str());

        let range = excel
            .worksheet_range(&name)
            .with_context(|| format!("Failed to read worksheet '{}'", name))?;
        let (start_row, start_col) = range.start().unwrap_or((0, 0));

        for (row, col, data) in range.used_cells() {
            let row = start_row + row as u32 + 1;
            let col = (start_col as usize + col + 1) as u16;
            if let Some(value) = cell_value(data) {
                sheet.set_value(row, col, value);
            }
        }

        match excel.worksheet_formula(&name) {
            Ok(formulas) => {
                let (start_row, start_col) = formulas.start().unwrap_or((0, 0));
                for (row, col, formula) in formulas.used_cells() {
                    if formula.is_empty() {
                        continue;
                    }
                    let row = start_row + row as u32 + 1;
                    let col = (start_col as usize + col + 1) as u16;
                    sheet.set_formula(row, col, formula.as_str());
                }
            }
            Err(e) => warn!("Could not read formulas of sheet '{}': {}", name, e),
        }

        sheet.mark_loaded();
        debug!("Sheet '{}' loaded up to row {}", name, sheet.max_row());
        workbook.push_sheet(sheet);
    }

    info!("Loaded {} sheet(s)", workbook.sheets().len());
    Ok(workbook)
}

/// Map a calamine cell to the model
fn cell_value(data: &Data) -> Option<CellValue> {
    match data {
        Data::Empty => None,
        Data::String(s) => Some(CellValue::Text(s.clone())),
        Data::Float(f) => Some(CellValue::Number(*f)),
        Data::Int(i) => Some(CellValue::Number(*i as f64)),
        Data::Bool(b) => Some(CellValue::Bool(*b)),
        Data::Error(e) => Some(CellValue::Error(e.to_string())),
        // as_datetime accounts for workbooks on the 1904 date system
        Data::DateTime(dt) if dt.is_datetime() => Some(
            dt.as_datetime()
                .map(CellValue::Date)
                .unwrap_or(CellValue::Number(dt.as_f64())),
        ),
        Data::DateTime(dt) => Some(CellValue::Number(dt.as_f64())),
        Data::DateTimeIso(s) => Some(
            dates::parse_iso_datetime(s)
                .map(CellValue::Date)
                .unwrap_or_else(|| CellValue::Text(s.clone())),
        ),
        Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use chrono::NaiveDate;

    #[test]
    fn test_cell_value_maps_scalars() {
        assert_eq!(cell_value(&Data::Empty), None);
        assert_eq!(
            cell_value(&Data::String("Frete".to_string())),
            Some(CellValue::Text("Frete".to_string()))
        );
        assert_eq!(cell_value(&Data::Int(7)), Some(CellValue::Number(7.0)));
        assert_eq!(cell_value(&Data::Bool(true)), Some(CellValue::Bool(true)));
    }

    #[test]
    fn test_cell_value_reads_both_date_systems() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        let serial_1900 = ExcelDateTime::new(45306.0, ExcelDateTimeType::DateTime, false);
        assert_eq!(
            cell_value(&Data::DateTime(serial_1900)),
            Some(CellValue::Date(expected))
        );

        let serial_1904 = ExcelDateTime::new(43844.0, ExcelDateTimeType::DateTime, true);
        assert_eq!(
            cell_value(&Data::DateTime(serial_1904)),
            Some(CellValue::Date(expected))
        );
    }

    #[test]
    fn test_cell_value_keeps_durations_numeric() {
        let duration = ExcelDateTime::new(1.5, ExcelDateTimeType::TimeDelta, false);
        assert_eq!(
            cell_value(&Data::DateTime(duration)),
            Some(CellValue::Number(1.5))
        );
    }

    #[test]
    fn test_cell_value_parses_iso_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-03-02T00:00:00".to_string())),
            Some(CellValue::Date(expected))
        );
    }
}
