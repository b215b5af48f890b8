//! In-memory workbook model
//!
//! A deliberately small spreadsheet model: ordered sheets of sparse cells,
//! each cell holding an optional value and a presentation style. Loading is
//! done through calamine (`reader`); saving (`writer`) reopens the source file
//! with umya-spreadsheet and applies only what changed in memory, so
//! everything the model does not carry stays as it was.
//!
//! A sheet remembers whether it was created in memory and which cells were
//! touched since it was loaded.
//!
//! All row and column numbers in this API are **1-based**, matching the way
//! spreadsheet users address cells (`E3` is row 3, column 5).

pub mod package;
pub mod reader;
pub mod writer;

use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::utils::column_letter;

pub use reader::load;
pub use writer::save;

/// Value stored in a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// A calendar date (stored as a serial number with a date format on save)
    Date(NaiveDateTime),
    /// Formula text including the leading `=`
    Formula(String),
    /// Spreadsheet error literal such as `#DIV/0!`
    Error(String),
}

impl CellValue {
    /// True for empty strings, which spreadsheets treat as blank
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.is_empty())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<u32> for CellValue {
    fn from(n: u32) -> Self {
        CellValue::Number(f64::from(n))
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::Date(dt)
    }
}

/// Horizontal alignment of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Left,
    Center,
    Right,
}

/// Presentation attributes of a cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellStyle {
    pub number_format: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub font_size: Option<f64>,
    /// RGB font color, e.g. `0xFFFFFF`
    pub font_color: Option<u32>,
    /// RGB solid fill color
    pub fill: Option<u32>,
    pub align: Option<HAlign>,
    pub vertical_center: bool,
}

impl CellStyle {
    pub fn is_default(&self) -> bool {
        *self == CellStyle::default()
    }
}

/// A single cell: value plus style
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub value: Option<CellValue>,
    pub style: CellStyle,
}

/// Inclusive rectangular cell range (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: u32,
    pub first_col: u16,
    pub last_row: u32,
    pub last_col: u16,
}

impl fmt::Display for CellRange {
    /// `A1:C1` notation
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}:{}{}",
            column_letter(self.first_col),
            self.first_row,
            column_letter(self.last_col),
            self.last_row
        )
    }
}

/// Inclusive span of rows at outline level 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowGroup {
    pub first: u32,
    pub last: u32,
    /// Mark the last row of the span as collapsed
    pub collapsed: bool,
}

/// One worksheet
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(u32, u16), Cell>,
    column_widths: BTreeMap<u16, f64>,
    merged: Vec<CellRange>,
    freeze_panes: Option<(u32, u16)>,
    row_groups: Vec<RowGroup>,
    /// Created in memory rather than read from a file
    fresh: bool,
    /// Cells written since the sheet was loaded
    edited: BTreeSet<(u32, u16)>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            column_widths: BTreeMap::new(),
            merged: Vec::new(),
            freeze_panes: None,
            row_groups: Vec::new(),
            fresh: true,
            edited: BTreeSet::new(),
        }
    }

    /// Forget pending edits; called once a sheet mirrors its file contents
    pub fn mark_loaded(&mut self) {
        self.fresh = false;
        self.edited.clear();
    }

    /// True for sheets that do not exist in the source file
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Cells touched since loading, in row-major order
    pub fn edited_cells(&self) -> impl Iterator<Item = (u32, u16, &Cell)> {
        self.edited
            .iter()
            .filter_map(|key| self.cells.get(key).map(|cell| (key.0, key.1, cell)))
    }

    pub fn cell(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    fn cell_mut(&mut self, row: u32, col: u16) -> &mut Cell {
        self.edited.insert((row, col));
        self.cells.entry((row, col)).or_default()
    }

    pub fn value(&self, row: u32, col: u16) -> Option<&CellValue> {
        self.cells.get(&(row, col)).and_then(|c| c.value.as_ref())
    }

    pub fn set_value(&mut self, row: u32, col: u16, value: impl Into<CellValue>) {
        self.cell_mut(row, col).value = Some(value.into());
    }

    /// Write a formula; a missing leading `=` is added
    pub fn set_formula(&mut self, row: u32, col: u16, formula: impl Into<String>) {
        let formula = formula.into();
        let formula = if formula.starts_with('=') {
            formula
        } else {
            format!("={}", formula)
        };
        self.set_value(row, col, CellValue::Formula(formula));
    }

    /// Remove the value; cells that never existed stay absent
    pub fn clear_value(&mut self, row: u32, col: u16) {
        if self.cells.contains_key(&(row, col)) {
            self.cell_mut(row, col).value = None;
        }
    }

    pub fn style(&self, row: u32, col: u16) -> Option<&CellStyle> {
        self.cells.get(&(row, col)).map(|c| &c.style)
    }

    pub fn style_mut(&mut self, row: u32, col: u16) -> &mut CellStyle {
        &mut self.cell_mut(row, col).style
    }

    /// True when the cell holds a value other than an empty string
    pub fn has_value(&self, row: u32, col: u16) -> bool {
        self.value(row, col).is_some_and(|v| !v.is_blank())
    }

    /// Last row holding any value (0 for an empty sheet)
    pub fn max_row(&self) -> u32 {
        self.cells
            .iter()
            .filter(|(_, c)| c.value.is_some())
            .map(|((row, _), _)| *row)
            .max()
            .unwrap_or(0)
    }

    /// Iterate populated cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (u32, u16, &Cell)> {
        self.cells.iter().map(|((r, c), cell)| (*r, *c, cell))
    }

    pub fn set_column_width(&mut self, col: u16, width: f64) {
        self.column_widths.insert(col, width);
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        self.column_widths.iter().map(|(c, w)| (*c, *w))
    }

    pub fn merge(&mut self, range: CellRange) {
        self.merged.push(range);
    }

    pub fn merged(&self) -> &[CellRange] {
        &self.merged
    }

    /// Freeze rows above `row` and columns left of `col` (`D4` = (4, 4))
    pub fn set_freeze_panes(&mut self, row: u32, col: u16) {
        self.freeze_panes = Some((row, col));
    }

    pub fn freeze_panes(&self) -> Option<(u32, u16)> {
        self.freeze_panes
    }

    pub fn group_rows(&mut self, group: RowGroup) {
        self.row_groups.push(group);
    }

    pub fn row_groups(&self) -> &[RowGroup] {
        &self.row_groups
    }
}

/// Ordered collection of sheets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    /// File the workbook was loaded from; saving edits a copy of it
    source: Option<PathBuf>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_source(path: impl Into<PathBuf>) -> Self {
        Self {
            sheets: Vec::new(),
            source: Some(path.into()),
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Append a sheet, replacing any sheet with the same name in place
    pub fn push_sheet(&mut self, sheet: Sheet) {
        match self.sheets.iter().position(|s| s.name == sheet.name) {
            Some(idx) => self.sheets[idx] = sheet,
            None => self.sheets.push(sheet),
        }
    }

    /// Remove a sheet by name, returning it if present
    pub fn remove_sheet(&mut self, name: &str) -> Option<Sheet> {
        let idx = self.sheets.iter().position(|s| s.name == name)?;
        Some(self.sheets.remove(idx))
    }

    /// Insert a new empty sheet at `index` and return it
    pub fn insert_sheet(&mut self, index: usize, name: &str) -> &mut Sheet {
        let index = index.min(self.sheets.len());
        self.sheets.insert(index, Sheet::new(name));
        &mut self.sheets[index]
    }
}
