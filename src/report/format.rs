//! Presentation of the DRE sheet, keyed on each row's [`RowKind`].

use super::{row_def, Report, RowKind, DATE_ROW, FIRST_VALUE_COLUMN, LOSS_LEDGER_ROWS};
use crate::workbook::{CellStyle, HAlign, RowGroup, Sheet};

const CURRENCY_FORMAT: &str = "#,##0.00,_);(#,##0.00,); -";
const PERCENT_FORMAT: &str = "0.0%";
const MONTH_FORMAT: &str = "mm/yy";

const TITLE_FILL: u32 = 0xBDD7EE;
const WHITE: u32 = 0xFFFFFF;

/// Last row painted white
const LAST_FILLED_ROW: u32 = 56;
/// Value cells from row 4 through this row get a number format
const LAST_VALUE_ROW: u32 = 55;

/// Style the report written by [`Report::write`]
pub fn apply(sheet: &mut Sheet, report: &Report) {
    let last_col = FIRST_VALUE_COLUMN - 1 + report.period.month_count() as u16;

    sheet.set_column_width(1, 2.5);
    sheet.set_column_width(2, 2.5);
    sheet.set_column_width(3, 22.0);

    for col in 1..=last_col {
        sheet.style_mut(1, col).fill = Some(TITLE_FILL);
    }
    for row in 2..=LAST_FILLED_ROW {
        for col in 1..=last_col {
            sheet.style_mut(row, col).fill = Some(WHITE);
        }
    }

    for col in FIRST_VALUE_COLUMN..=last_col {
        let style = sheet.style_mut(DATE_ROW, col);
        style.number_format = Some(MONTH_FORMAT.to_string());
        style.align = Some(HAlign::Center);
        style.vertical_center = true;
    }

    for row in &report.rows {
        let style = sheet.style_mut(row.def.row, row.def.label_column.column());
        style_label(style, row.def.kind);
    }

    for row in 4..=LAST_VALUE_ROW {
        let is_ratio = row_def(row).is_some_and(|def| def.kind.is_ratio());
        for col in FIRST_VALUE_COLUMN..=last_col {
            style_value(sheet.style_mut(row, col), is_ratio);
        }
    }

    sheet.set_freeze_panes(DATE_ROW + 1, FIRST_VALUE_COLUMN);
    sheet.group_rows(RowGroup {
        first: LOSS_LEDGER_ROWS.0,
        last: LOSS_LEDGER_ROWS.1,
        collapsed: true,
    });
}

/// Ratio labels (shares and margins) are italic, everything else bold
fn style_label(style: &mut CellStyle, kind: RowKind) {
    let (bold, italic) = match kind {
        RowKind::Percentage | RowKind::Margin => (false, true),
        RowKind::Currency | RowKind::Header => (true, false),
    };
    style.bold = bold;
    style.italic = italic;
    style.align = Some(HAlign::Left);
}

fn style_value(style: &mut CellStyle, is_ratio: bool) {
    if is_ratio {
        style.number_format = Some(PERCENT_FORMAT.to_string());
        style.italic = true;
    } else {
        style.number_format = Some(CURRENCY_FORMAT.to_string());
        style.italic = false;
    }
    style.align = Some(HAlign::Right);
}
