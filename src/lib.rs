//! DRE - monthly Income Statement generator for Excel workbooks
//!
//! This library reads the transactional sheets of a workbook, infers the
//! reporting period from their dates, lays out the `DRE` sheet as spreadsheet
//! formulas and writes a per-asset depreciation waterfall.

pub mod config;
pub mod dates;
pub mod depreciation;
pub mod error;
pub mod period;
pub mod pipeline;
pub mod report;
pub mod utils;
pub mod workbook;
