//! DRE sheet layout
//!
//! The report is a fixed table of rows ([`ROWS`]). Each row names its label,
//! the column the label sits in, a semantic [`RowKind`] that drives styling
//! and a [`Line`] template that expands to one formula per period month.
//! Nothing is evaluated here: cells reference the source sheets and the
//! spreadsheet application computes the numbers.

pub mod format;

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::config::ReportSettings;
use crate::depreciation::{waterfall, INVESTMENTS_SHEET};
use crate::period::ReportPeriod;
use crate::utils::column_letter;
use crate::workbook::{CellRange, CellStyle, CellValue, HAlign, Sheet, Workbook};

pub use format::apply as apply_format;

/// Name of the generated sheet
pub const REPORT_SHEET: &str = "DRE";
/// Optional sheet feeding the interest line
pub const FINANCING_SHEET: &str = "Financiamento";

/// Row holding the month axis
pub const DATE_ROW: u32 = 3;
/// Column of the first month (`D`)
pub const FIRST_VALUE_COLUMN: u16 = 4;

const REVENUE: u32 = 4;
const EBIT: u32 = 35;
const EBT: u32 = 40;
const LOSS_OPENING: u32 = 44;
const LOSS_ACQUIRED: u32 = 45;
const LOSS_USED: u32 = 46;
const LOSS_CLOSING: u32 = 47;
const TAX_BASE: u32 = 49;
const TAXES: u32 = 51;

/// Styling role of a report row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    Currency,
    Percentage,
    Margin,
    Header,
}

impl RowKind {
    /// Rows whose values are ratios rather than amounts
    pub fn is_ratio(self) -> bool {
        matches!(self, RowKind::Percentage | RowKind::Margin)
    }
}

/// Column holding a row's label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelColumn {
    /// Column B: totals and subtotals
    Group,
    /// Column C: breakdown items
    Item,
}

impl LabelColumn {
    pub fn column(self) -> u16 {
        match self {
            LabelColumn::Group => 2,
            LabelColumn::Item => 3,
        }
    }
}

/// Formula template of a report row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// Label only
    Header,
    /// `Vendas` amounts dated within the column's month
    Revenue,
    /// Month-over-month revenue change; blank in the first column
    Growth,
    /// Row value divided by revenue
    ShareOfRevenue(u32),
    /// `-SUM(..)` of breakdown rows
    NegatedSum(&'static [u32]),
    /// Plain addition of rows
    Add(&'static [u32]),
    /// `Custo_Despesas` amounts of the category named in column C
    CostCategory,
    /// The three `Folha` amount columns
    Payroll,
    /// Negated `TOTAL D&A` of the depreciation waterfall
    Depreciation,
    /// `Financiamento` interest dated within the column's month
    Interest,
    LossOpening,
    LossAcquired,
    LossUsed,
    LossClosing,
    TaxBase,
    Taxes,
    EffectiveTaxRate,
    NetIncome,
}

/// One row of the report table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowDef {
    pub row: u32,
    pub label: &'static str,
    pub label_column: LabelColumn,
    pub kind: RowKind,
    pub line: Line,
}

const fn group(row: u32, label: &'static str, kind: RowKind, line: Line) -> RowDef {
    RowDef {
        row,
        label,
        label_column: LabelColumn::Group,
        kind,
        line,
    }
}

const fn item(row: u32, label: &'static str, kind: RowKind, line: Line) -> RowDef {
    RowDef {
        row,
        label,
        label_column: LabelColumn::Item,
        kind,
        line,
    }
}

const SHARE: &str = "% da Receita";

pub const ROWS: &[RowDef] = &[
    group(REVENUE, "Receita ", RowKind::Currency, Line::Revenue),
    group(5, "Growth %", RowKind::Percentage, Line::Growth),
    group(7, "CMV (-)", RowKind::Currency, Line::NegatedSum(&[9, 11, 13])),
    group(8, SHARE, RowKind::Percentage, Line::ShareOfRevenue(7)),
    item(9, "Armazenagem", RowKind::Currency, Line::CostCategory),
    item(10, SHARE, RowKind::Percentage, Line::ShareOfRevenue(9)),
    item(11, "Frete", RowKind::Currency, Line::CostCategory),
    item(12, SHARE, RowKind::Percentage, Line::ShareOfRevenue(11)),
    item(13, "Matéria-prima", RowKind::Currency, Line::CostCategory),
    item(14, SHARE, RowKind::Percentage, Line::ShareOfRevenue(13)),
    group(16, "Lucro bruto", RowKind::Currency, Line::Add(&[REVENUE, 7])),
    group(17, "Margem Bruta %", RowKind::Margin, Line::ShareOfRevenue(16)),
    group(19, "SG&A (-)", RowKind::Currency, Line::NegatedSum(&[21, 23, 25, 27])),
    item(21, "Marketing", RowKind::Currency, Line::CostCategory),
    item(22, SHARE, RowKind::Percentage, Line::ShareOfRevenue(21)),
    item(23, "Comercial", RowKind::Currency, Line::CostCategory),
    item(24, SHARE, RowKind::Percentage, Line::ShareOfRevenue(23)),
    item(25, "Administrativo", RowKind::Currency, Line::CostCategory),
    item(26, SHARE, RowKind::Percentage, Line::ShareOfRevenue(25)),
    item(27, "Folha", RowKind::Currency, Line::Payroll),
    item(28, SHARE, RowKind::Percentage, Line::ShareOfRevenue(27)),
    group(30, "EBITDA", RowKind::Currency, Line::Add(&[REVENUE, 7, 19])),
    group(31, "Margem EBITDA %", RowKind::Margin, Line::ShareOfRevenue(30)),
    group(33, "D&A (-)", RowKind::Currency, Line::Depreciation),
    group(EBIT, "EBIT", RowKind::Currency, Line::Add(&[30, 33])),
    group(36, "Margem Operacional %", RowKind::Margin, Line::ShareOfRevenue(EBIT)),
    group(38, "Juros (-)", RowKind::Currency, Line::Interest),
    group(EBT, "EBT", RowKind::Currency, Line::Add(&[EBIT, 38])),
    group(41, SHARE, RowKind::Percentage, Line::ShareOfRevenue(EBT)),
    group(43, "Prejuizo Acumulado *", RowKind::Header, Line::Header),
    item(LOSS_OPENING, "Inicio", RowKind::Currency, Line::LossOpening),
    item(LOSS_ACQUIRED, "Saldo Adquirido", RowKind::Currency, Line::LossAcquired),
    item(LOSS_USED, "Saldo Utilizado", RowKind::Currency, Line::LossUsed),
    item(LOSS_CLOSING, "Final", RowKind::Currency, Line::LossClosing),
    group(TAX_BASE, "Base de calculo ", RowKind::Currency, Line::TaxBase),
    group(TAXES, "Impostos (-)", RowKind::Currency, Line::Taxes),
    group(52, "Taxa Efetiva de Imposto %", RowKind::Percentage, Line::EffectiveTaxRate),
    group(54, "Lucro (prejuízo) líquido", RowKind::Currency, Line::NetIncome),
];

/// Rows grouped under the loss carryforward outline
pub const LOSS_LEDGER_ROWS: (u32, u32) = (43, 50);

pub fn row_def(row: u32) -> Option<&'static RowDef> {
    ROWS.iter().find(|def| def.row == row)
}

/// Optional source sheets present in the workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceAvailability {
    pub financing: bool,
    pub investments: bool,
}

impl SourceAvailability {
    pub fn from_workbook(workbook: &Workbook) -> Self {
        Self {
            financing: workbook.has_sheet(FINANCING_SHEET),
            investments: workbook.has_sheet(INVESTMENTS_SHEET),
        }
    }
}

impl Default for SourceAvailability {
    fn default() -> Self {
        Self {
            financing: true,
            investments: true,
        }
    }
}

/// A report line written as zeros because its source sheet is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedLine {
    pub row: u32,
    pub label: String,
    pub missing_sheet: String,
}

impl fmt::Display for DegradedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' (row {}) set to zero: sheet '{}' not found",
            self.label, self.row, self.missing_sheet
        )
    }
}

/// Content of one value cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Empty,
    Number(f64),
    Formula(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub def: &'static RowDef,
    /// One entry per period month
    pub cells: Vec<CellContent>,
}

/// Fully expanded report, ready to be written to a sheet
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub period: ReportPeriod,
    pub rows: Vec<ReportRow>,
    pub degraded: Vec<DegradedLine>,
}

/// Expands [`ROWS`] over the report period
pub struct ReportBuilder<'a> {
    settings: &'a ReportSettings,
    period: &'a ReportPeriod,
    sources: SourceAvailability,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(
        settings: &'a ReportSettings,
        period: &'a ReportPeriod,
        sources: SourceAvailability,
    ) -> Self {
        Self {
            settings,
            period,
            sources,
        }
    }

    pub fn build(&self) -> Report {
        let mut degraded = Vec::new();
        let rows = ROWS
            .iter()
            .map(|def| {
                if let Some(sheet) = self.missing_source(def.line) {
                    let line = DegradedLine {
                        row: def.row,
                        label: def.label.trim().to_string(),
                        missing_sheet: sheet.to_string(),
                    };
                    warn!("{}", line);
                    degraded.push(line);
                }
                ReportRow {
                    def,
                    cells: (0..self.period.month_count())
                        .map(|i| self.cell(def, i))
                        .collect(),
                }
            })
            .collect();

        debug!(
            "Report built: {} rows x {} months",
            ROWS.len(),
            self.period.month_count()
        );

        Report {
            period: *self.period,
            rows,
            degraded,
        }
    }

    fn missing_source(&self, line: Line) -> Option<&'static str> {
        match line {
            Line::Interest if !self.sources.financing => Some(FINANCING_SHEET),
            Line::Depreciation if !self.sources.investments => Some(INVESTMENTS_SHEET),
            _ => None,
        }
    }

    /// Content of month `index` for `def`
    fn cell(&self, def: &RowDef, index: u32) -> CellContent {
        let col = value_column(index);
        let l = column_letter(col);
        let prev = column_letter(col.saturating_sub(1));

        let text = match def.line {
            Line::Header => return CellContent::Empty,
            Line::Growth if index == 0 => return CellContent::Empty,
            Line::LossOpening if index == 0 => return CellContent::Number(0.0),
            Line::Interest if !self.sources.financing => return CellContent::Number(0.0),
            Line::Depreciation if !self.sources.investments => return CellContent::Number(0.0),

            Line::Revenue => format!(
                "=SUMIFS(Vendas!$E:$E,{})",
                month_criteria("Vendas!$F:$F", &l)
            ),
            Line::Growth => format!("=({l}{REVENUE}/{prev}{REVENUE})-1"),
            Line::ShareOfRevenue(row) => format!("={l}{row}/{l}{REVENUE}"),
            Line::NegatedSum(rows) => format!("=-SUM({})", cell_list(&l, rows, ", ")),
            Line::Add(rows) => format!("={}", cell_list(&l, rows, "+")),
            Line::CostCategory => format!(
                "=SUMIFS(Custo_Despesas!$B:$B,{},Custo_Despesas!$A:$A,$C{})",
                month_criteria("Custo_Despesas!$C:$C", &l),
                def.row
            ),
            Line::Payroll => {
                let terms: Vec<String> = ["$C:$C", "$D:$D", "$E:$E"]
                    .iter()
                    .map(|amounts| {
                        format!(
                            "SUMIFS(Folha!{},{})",
                            amounts,
                            month_criteria("Folha!$A:$A", &l)
                        )
                    })
                    .collect();
                format!("={}", terms.join("+"))
            }
            Line::Depreciation => format!(
                "=-{}!{}{}",
                INVESTMENTS_SHEET,
                waterfall::month_column(index),
                waterfall::TOTAL_ROW
            ),
            Line::Interest => format!(
                "=-SUMIFS({sheet}!$J$5:$AZ$5, {sheet}!$J$4:$AZ$4, \">=\"&EOMONTH({report}!{l}${DATE_ROW},-1)+1, {sheet}!$J$4:$AZ$4, \"<=\"&EOMONTH({report}!{l}${DATE_ROW},0))",
                sheet = FINANCING_SHEET,
                report = REPORT_SHEET,
            ),
            Line::LossOpening => format!("={prev}{LOSS_CLOSING}"),
            Line::LossAcquired => format!("=-IF({l}{EBT}<0,-{l}{EBT},0)"),
            Line::LossUsed => format!(
                "=IF({l}${EBT}>0, MIN({l}${EBT}*{}%, -{l}${LOSS_OPENING}), 0)",
                decimal_literal(self.settings.loss_offset_limit)
            ),
            Line::LossClosing => format!("=SUM({l}{LOSS_OPENING}:{l}{LOSS_USED})"),
            Line::TaxBase => format!("=IF({l}{EBT}<0,0,{l}{EBT}-{l}{LOSS_USED})"),
            Line::Taxes => format!(
                "=-{l}{TAX_BASE}*{}",
                decimal_literal(self.settings.tax_rate / Decimal::ONE_HUNDRED)
            ),
            Line::EffectiveTaxRate => format!("=ABS({l}{TAXES})/{l}{EBIT}"),
            Line::NetIncome => format!("=SUM({l}{TAXES},{l}{EBT})"),
        };

        CellContent::Formula(text)
    }
}

impl Report {
    pub fn row(&self, row: u32) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.def.row == row)
    }

    /// Write title, month axis, labels and value cells into `sheet`
    pub fn write(&self, sheet: &mut Sheet) {
        sheet.set_value(1, 1, REPORT_SHEET);
        *sheet.style_mut(1, 1) = CellStyle {
            bold: true,
            font_size: Some(14.0),
            align: Some(HAlign::Left),
            ..CellStyle::default()
        };
        sheet.merge(CellRange {
            first_row: 1,
            first_col: 1,
            last_row: 1,
            last_col: 3,
        });

        for i in 0..self.period.month_count() {
            let col = value_column(i);
            if i == 0 {
                if let Some(start) = self.period.start().and_hms_opt(0, 0, 0) {
                    sheet.set_value(DATE_ROW, col, CellValue::Date(start));
                }
            } else {
                sheet.set_formula(
                    DATE_ROW,
                    col,
                    format!("=EDATE({}{}, 1)", column_letter(col - 1), DATE_ROW),
                );
            }
        }

        for row in &self.rows {
            sheet.set_value(row.def.row, row.def.label_column.column(), row.def.label);
            for (i, content) in row.cells.iter().enumerate() {
                let col = value_column(i as u32);
                match content {
                    CellContent::Empty => {}
                    CellContent::Number(n) => sheet.set_value(row.def.row, col, *n),
                    CellContent::Formula(f) => sheet.set_formula(row.def.row, col, f.as_str()),
                }
            }
        }
    }
}

/// Sheet column of month `index`
pub fn value_column(index: u32) -> u16 {
    FIRST_VALUE_COLUMN + index as u16
}

/// SUMIFS criteria pair selecting dates inside the month of `DRE!<col>3`
fn month_criteria(range: &str, col: &str) -> String {
    format!(
        "{range},\">=\"&EOMONTH({REPORT_SHEET}!{col}${DATE_ROW},-1)+1,{range},\"<=\"&EOMONTH({REPORT_SHEET}!{col}${DATE_ROW},0)"
    )
}

fn cell_list(col: &str, rows: &[u32], sep: &str) -> String {
    rows.iter()
        .map(|row| format!("{col}{row}"))
        .collect::<Vec<_>>()
        .join(sep)
}

/// Shortest decimal text for a formula literal (`0.30` → `0.3`)
fn decimal_literal(value: Decimal) -> String {
    value.normalize().to_string()
}
