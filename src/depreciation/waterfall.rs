//! Depreciation waterfall table written into the `Investimentos` sheet
//!
//! Layout, right of the source data:
//!
//! ```text
//! E1      TOTAL D&A          J1.. =SUM(J6:J<n>)
//! E3      WATERFALL DE DEPRECIAÇÃO
//! E5..I5  headers            J5 start month, K5.. =EDATE(J5,1)
//! E6..    one row per asset  J6.. =IF(AND(J5>=start,J5<end),I6,0)
//! ```
//!
//! Row 1 is what the `D&A` line of the report references.

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use super::{AssetSchedule, DepreciationSchedule};
use crate::utils::column_letter;
use crate::workbook::{CellStyle, CellValue, HAlign, Sheet};

/// Column of the first month of the waterfall (`J`)
pub const FIRST_MONTH_COLUMN: u16 = 10;
/// Row holding the per-month D&A totals
pub const TOTAL_ROW: u32 = 1;

const TITLE_ROW: u32 = 3;
const HEADER_ROW: u32 = 5;
const FIRST_ASSET_ROW: u32 = 6;
const FIRST_COLUMN: u16 = 5;
/// Columns wiped before writing, starting at `E`
const CLEARED_COLUMNS: u16 = 100;

const HEADERS: [&str; 5] = [
    "Ativo",
    "Descrição",
    "Valor",
    "Vida Útil (anos)",
    "Deprec. Mensal",
];

const AMOUNT_FORMAT: &str = "#,##0.00";
const MONTH_FORMAT: &str = "mm/yy";

const BLACK: u32 = 0x000000;
const WHITE: u32 = 0xFFFFFF;
const HEADER_FILL: u32 = 0xD3D3D3;

/// Column letter holding month `index` of the waterfall
pub fn month_column(index: u32) -> String {
    column_letter(FIRST_MONTH_COLUMN + index as u16)
}

/// Rewrite the waterfall region of `sheet` from `schedule`
pub fn write_waterfall(sheet: &mut Sheet, schedule: &DepreciationSchedule) {
    let asset_count = schedule.assets.len() as u32;
    clear_region(sheet, asset_count);

    sheet.set_value(TITLE_ROW, FIRST_COLUMN, "WATERFALL DE DEPRECIAÇÃO");
    *sheet.style_mut(TITLE_ROW, FIRST_COLUMN) = CellStyle {
        bold: true,
        font_size: Some(12.0),
        ..plain()
    };

    write_headers(sheet, schedule);
    for (idx, asset) in schedule.assets.iter().enumerate() {
        let row = FIRST_ASSET_ROW + idx as u32;
        write_asset_row(sheet, row, idx as u32 + 1, asset, schedule.period.month_count());
    }
    write_totals(sheet, asset_count, schedule.period.month_count());

    debug!(
        "Waterfall written: {} asset(s) over {} month(s)",
        asset_count,
        schedule.period.month_count()
    );
}

fn plain() -> CellStyle {
    CellStyle {
        font_color: Some(BLACK),
        fill: Some(WHITE),
        ..CellStyle::default()
    }
}

/// Blank every cell the waterfall may have used, from row 1 down past both
/// the previous and the new table
fn clear_region(sheet: &mut Sheet, asset_count: u32) {
    let last_row = (TITLE_ROW + sheet.max_row()).max(FIRST_ASSET_ROW + asset_count);
    let last_col = FIRST_COLUMN + CLEARED_COLUMNS;

    for row in 1..=last_row {
        for col in FIRST_COLUMN..=last_col {
            sheet.clear_value(row, col);
            *sheet.style_mut(row, col) = plain();
        }
    }
}

fn write_headers(sheet: &mut Sheet, schedule: &DepreciationSchedule) {
    let header_style = CellStyle {
        bold: true,
        fill: Some(HEADER_FILL),
        align: Some(HAlign::Center),
        ..plain()
    };

    for (offset, header) in HEADERS.iter().enumerate() {
        let col = FIRST_COLUMN + offset as u16;
        sheet.set_value(HEADER_ROW, col, *header);
        *sheet.style_mut(HEADER_ROW, col) = header_style.clone();
    }

    let month_style = CellStyle {
        number_format: Some(MONTH_FORMAT.to_string()),
        ..header_style
    };
    for i in 0..schedule.period.month_count() {
        let col = FIRST_MONTH_COLUMN + i as u16;
        if i == 0 {
            if let Some(start) = schedule.period.start().and_hms_opt(0, 0, 0) {
                sheet.set_value(HEADER_ROW, col, CellValue::Date(start));
            }
        } else {
            sheet.set_formula(
                HEADER_ROW,
                col,
                format!("=EDATE({}{},1)", month_column(i - 1), HEADER_ROW),
            );
        }
        *sheet.style_mut(HEADER_ROW, col) = month_style.clone();
    }
}

fn write_asset_row(
    sheet: &mut Sheet,
    row: u32,
    counter: u32,
    asset: &AssetSchedule,
    month_count: u32,
) {
    let amount_style = CellStyle {
        number_format: Some(AMOUNT_FORMAT.to_string()),
        ..plain()
    };
    let investment = &asset.investment;

    sheet.set_value(row, FIRST_COLUMN, counter);
    sheet.set_value(row, FIRST_COLUMN + 1, investment.description.as_str());
    sheet.set_value(
        row,
        FIRST_COLUMN + 2,
        investment.value.to_f64().unwrap_or_default(),
    );
    *sheet.style_mut(row, FIRST_COLUMN + 2) = amount_style.clone();
    sheet.set_value(row, FIRST_COLUMN + 3, investment.useful_life_years);

    let value_col = column_letter(FIRST_COLUMN + 2);
    let life_col = column_letter(FIRST_COLUMN + 3);
    let monthly_col = column_letter(FIRST_COLUMN + 4);
    sheet.set_formula(
        row,
        FIRST_COLUMN + 4,
        format!("={value_col}{row}/({life_col}{row}*12)"),
    );
    *sheet.style_mut(row, FIRST_COLUMN + 4) = amount_style.clone();

    let start = excel_date(asset.window.start);
    let end = excel_date(asset.window.end);
    for i in 0..month_count {
        let letter = month_column(i);
        sheet.set_formula(
            row,
            FIRST_MONTH_COLUMN + i as u16,
            format!(
                "=IF(AND({letter}{HEADER_ROW}>={start},{letter}{HEADER_ROW}<{end}),{monthly_col}{row},0)"
            ),
        );
        *sheet.style_mut(row, FIRST_MONTH_COLUMN + i as u16) = amount_style.clone();
    }
}

fn write_totals(sheet: &mut Sheet, asset_count: u32, month_count: u32) {
    let total_style = CellStyle {
        bold: true,
        font_color: Some(WHITE),
        fill: Some(BLACK),
        ..CellStyle::default()
    };

    sheet.set_value(TOTAL_ROW, FIRST_COLUMN, "TOTAL D&A");
    *sheet.style_mut(TOTAL_ROW, FIRST_COLUMN) = total_style.clone();

    let last_row = FIRST_ASSET_ROW + asset_count;
    let amount_style = CellStyle {
        number_format: Some(AMOUNT_FORMAT.to_string()),
        ..total_style
    };
    for i in 0..month_count {
        let letter = month_column(i);
        sheet.set_formula(
            TOTAL_ROW,
            FIRST_MONTH_COLUMN + i as u16,
            format!("=SUM({letter}{FIRST_ASSET_ROW}:{letter}{last_row})"),
        );
        *sheet.style_mut(TOTAL_ROW, FIRST_MONTH_COLUMN + i as u16) = amount_style.clone();
    }
}

/// `DATE(y,m,d)` literal for a formula
fn excel_date(date: NaiveDate) -> String {
    format!("DATE({},{},{})", date.year(), date.month(), date.day())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depreciation::{allocate, InvestmentRecord};
    use crate::period::ReportPeriod;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn formula(sheet: &Sheet, row: u32, col: u16) -> String {
        match sheet.value(row, col) {
            Some(CellValue::Formula(f)) => f.clone(),
            other => panic!("expected formula at ({row}, {col}), got {other:?}"),
        }
    }

    fn sample_schedule(month_count: u32) -> DepreciationSchedule {
        let investments = vec![
            InvestmentRecord {
                row: 2,
                date: ymd(2024, 1, 10),
                description: "Equipamento".to_string(),
                value: dec!(3600),
                useful_life_years: 3,
            },
            InvestmentRecord {
                row: 3,
                date: ymd(2024, 2, 20),
                description: "Software".to_string(),
                value: dec!(600),
                useful_life_years: 5,
            },
        ];
        allocate(&investments, &ReportPeriod::new(ymd(2024, 1, 1), month_count))
    }

    #[test]
    fn test_layout_and_formulas() {
        let mut sheet = Sheet::new("Investimentos");
        sheet.set_value(2, 1, "2024-01-10");
        write_waterfall(&mut sheet, &sample_schedule(3));

        assert_eq!(sheet.value(3, 5), Some(&CellValue::from("WATERFALL DE DEPRECIAÇÃO")));
        assert_eq!(sheet.value(5, 9), Some(&CellValue::from("Deprec. Mensal")));
        assert_eq!(
            sheet.value(5, 10),
            Some(&CellValue::Date(ymd(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap()))
        );
        assert_eq!(formula(&sheet, 5, 11), "=EDATE(J5,1)");
        assert_eq!(formula(&sheet, 5, 12), "=EDATE(K5,1)");

        assert_eq!(sheet.value(6, 5), Some(&CellValue::Number(1.0)));
        assert_eq!(sheet.value(6, 6), Some(&CellValue::from("Equipamento")));
        assert_eq!(sheet.value(6, 7), Some(&CellValue::Number(3600.0)));
        assert_eq!(sheet.value(6, 8), Some(&CellValue::Number(3.0)));
        assert_eq!(formula(&sheet, 6, 9), "=G6/(H6*12)");
        assert_eq!(
            formula(&sheet, 6, 10),
            "=IF(AND(J5>=DATE(2024,2,1),J5<DATE(2027,2,1)),I6,0)"
        );
        assert_eq!(
            formula(&sheet, 7, 12),
            "=IF(AND(L5>=DATE(2024,3,1),L5<DATE(2029,3,1)),I7,0)"
        );

        assert_eq!(sheet.value(1, 5), Some(&CellValue::from("TOTAL D&A")));
        assert_eq!(formula(&sheet, 1, 10), "=SUM(J6:J8)");
        assert_eq!(formula(&sheet, 1, 12), "=SUM(L6:L8)");
        assert!(sheet.value(1, 13).is_none());

        // Source data left of the table is untouched
        assert_eq!(sheet.value(2, 1), Some(&CellValue::from("2024-01-10")));
    }

    #[test]
    fn test_styles() {
        let mut sheet = Sheet::new("Investimentos");
        write_waterfall(&mut sheet, &sample_schedule(2));

        let total = sheet.style(1, 10).unwrap();
        assert!(total.bold);
        assert_eq!(total.fill, Some(BLACK));
        assert_eq!(total.font_color, Some(WHITE));

        let header = sheet.style(5, 5).unwrap();
        assert_eq!(header.fill, Some(HEADER_FILL));
        assert_eq!(header.align, Some(HAlign::Center));
        assert_eq!(sheet.style(5, 11).unwrap().number_format.as_deref(), Some("mm/yy"));
        assert_eq!(sheet.style(3, 5).unwrap().font_size, Some(12.0));
    }

    #[test]
    fn test_rewrite_clears_previous_table() {
        let mut sheet = Sheet::new("Investimentos");
        write_waterfall(&mut sheet, &sample_schedule(6));
        assert!(sheet.value(7, 15).is_some());

        let shorter = allocate(&[], &ReportPeriod::new(ymd(2024, 1, 1), 2));
        write_waterfall(&mut sheet, &shorter);

        assert!(sheet.value(6, 5).is_none());
        assert!(sheet.value(7, 15).is_none());
        assert!(sheet.value(1, 12).is_none());
        assert_eq!(formula(&sheet, 1, 10), "=SUM(J6:J6)");
        assert_eq!(sheet.style(7, 15).unwrap().fill, Some(WHITE));
    }

    #[test]
    fn test_month_column_letters() {
        assert_eq!(month_column(0), "J");
        assert_eq!(month_column(16), "Z");
        assert_eq!(month_column(17), "AA");
    }
}
