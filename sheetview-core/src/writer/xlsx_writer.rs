//! Minimal XLSX encoder for processed grids
//!
//! Writes inline strings rather than a shared-string table; every worksheet
//! carries a dimension element so empty trailing rows and columns survive a
//! later decode.

use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use zip::{write::FileOptions, ZipWriter};

use crate::error::{Error, Result};
use crate::reader::{cell_reference, CellValue};

/// Encode named grids into an XLSX archive held in memory
pub fn encode(sheets: &[(String, Vec<Vec<CellValue>>)]) -> Result<Vec<u8>> {
    if sheets.is_empty() {
        return Err(Error::Format("nothing to export".to_string()));
    }

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::<()>::default();

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(content_types_xml(sheets.len()).as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(workbook_xml(sheets).as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(workbook_rels_xml(sheets.len()).as_bytes())?;

    for (i, (_, grid)) in sheets.iter().enumerate() {
        zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)?;
        zip.write_all(worksheet_xml(grid).as_bytes())?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| Error::Format(format!("archive finalization failed: {e}")))?;
    Ok(cursor.into_inner())
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

fn content_types_xml(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn workbook_xml(sheets: &[(String, Vec<Vec<CellValue>>)]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        let id = i + 1;
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#,
            escape(&sanitize_sheet_name(name, i))
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn worksheet_xml(grid: &[Vec<CellValue>]) -> String {
    let rows = grid.len();
    let cols = grid.iter().map(Vec::len).max().unwrap_or(0);
    let dimension = if rows == 0 || cols == 0 {
        "A1".to_string()
    } else {
        format!("A1:{}", cell_reference(rows - 1, cols - 1))
    };

    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="{dimension}"/><sheetData>"#
    );
    for (row_idx, row) in grid.iter().enumerate() {
        if row.iter().all(CellValue::is_empty) {
            continue;
        }
        xml.push_str(&format!(r#"<row r="{}">"#, row_idx + 1));
        for (col_idx, value) in row.iter().enumerate() {
            let r = cell_reference(row_idx, col_idx);
            match value {
                CellValue::Empty => {}
                CellValue::Number(n) => {
                    xml.push_str(&format!(r#"<c r="{r}"><v>{n}</v></c>"#));
                }
                CellValue::Boolean(b) => {
                    xml.push_str(&format!(
                        r#"<c r="{r}" t="b"><v>{}</v></c>"#,
                        if *b { 1 } else { 0 }
                    ));
                }
                CellValue::Text(text) => {
                    xml.push_str(&format!(
                        r#"<c r="{r}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        escape(text)
                    ));
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Excel sheet names are capped at 31 characters and cannot contain
/// []:*?/\ characters
fn sanitize_sheet_name(name: &str, index: usize) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            other => other,
        })
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        format!("Sheet{}", index + 1)
    } else {
        cleaned
    }
}
