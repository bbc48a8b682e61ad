//! Workbook decoding from in-memory byte buffers

pub mod workbook;
pub mod xlsx_parser;

use std::io::Cursor;
use zip::ZipArchive;

use crate::error::{Error, Result};
use xlsx_parser::XlsxReader;
pub use workbook::{cell_reference, col_to_letter, CellValue, Sheet, Workbook};

/// Content types declared by browsers and shells for Excel uploads
const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_CONTENT_TYPE: &str = "application/vnd.ms-excel";

/// Accept a file by declared content type or by filename suffix,
/// case-insensitive
pub fn is_spreadsheet_file(name: &str, content_type: Option<&str>) -> bool {
    if matches!(content_type, Some(XLSX_CONTENT_TYPE) | Some(XLS_CONTENT_TYPE)) {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xlsx") || lower.ends_with(".xls")
}

/// Decode a workbook from raw bytes
pub fn decode(bytes: &[u8]) -> Result<Workbook> {
    let cursor = Cursor::new(bytes);
    let mut archive = ZipArchive::new(cursor)
        .map_err(|e| Error::Format(format!("not a workbook archive: {e}")))?;

    let mut reader = XlsxReader::new(&mut archive);
    let sheets = reader.read_sheets()?;
    if sheets.is_empty() {
        return Err(Error::Format("workbook contains no sheets".to_string()));
    }
    Ok(Workbook { sheets })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_check() {
        assert!(is_spreadsheet_file("report.xlsx", None));
        assert!(is_spreadsheet_file("REPORT.XLSX", None));
        assert!(is_spreadsheet_file("legacy.xls", None));
        assert!(is_spreadsheet_file("blob", Some(XLSX_CONTENT_TYPE)));
        assert!(is_spreadsheet_file("blob", Some(XLS_CONTENT_TYPE)));
        assert!(!is_spreadsheet_file("notes.txt", None));
        assert!(!is_spreadsheet_file("data.csv", Some("text/csv")));
        assert!(!is_spreadsheet_file("archive.xlsx.zip", None));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(b"not a zip"), Err(Error::Format(_))));
        assert!(matches!(decode(&[]), Err(Error::Format(_))));
    }
}
