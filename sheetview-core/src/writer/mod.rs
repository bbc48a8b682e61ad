//! Workbook encoding and export file naming

pub mod xlsx_writer;

use chrono::Utc;

pub use xlsx_writer::encode;

/// File name stem without its spreadsheet extension
pub fn base_file_name(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        &name[..name.len() - 5]
    } else if lower.ends_with(".xls") {
        &name[..name.len() - 4]
    } else {
        name
    }
}

/// Download name for a single processed worksheet
pub fn single_export_name(prefix: &str, base: &str, sheet: &str) -> String {
    format!("{prefix}_{base}_{sheet}_processed.xlsx")
}

/// Download name for a bulk export of every imported file
pub fn bulk_export_name(prefix: &str) -> String {
    format!("{prefix}_Export_{}.xlsx", Utc::now().format("%Y-%m-%d"))
}
