//! XML parsing for XLSX archives

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{BufReader, Read, Seek};
use zip::ZipArchive;

use super::workbook::{CellValue, Sheet};
use crate::error::{Error, Result};

pub struct XlsxReader<'a, R: Read + Seek> {
    archive: &'a mut ZipArchive<R>,
    shared_strings: Vec<String>,
}

impl<'a, R: Read + Seek> XlsxReader<'a, R> {
    pub fn new(archive: &'a mut ZipArchive<R>) -> Self {
        let shared_strings = extract_shared_strings(archive).unwrap_or_default();
        Self {
            archive,
            shared_strings,
        }
    }

    /// Read every sheet as a dense grid, in workbook order
    pub fn read_sheets(&mut self) -> Result<Vec<Sheet>> {
        let entries = self.sheet_entries()?;
        let targets = self.relationship_targets()?;

        let mut sheets = Vec::with_capacity(entries.len());
        for (name, rid) in entries {
            let target = targets
                .get(&rid)
                .ok_or_else(|| Error::Format(format!("no worksheet part for sheet '{name}'")))?;
            let path = normalize_part_path(target);
            let rows = self.parse_sheet_grid(&path)?;
            sheets.push(Sheet { name, rows });
        }
        Ok(sheets)
    }

    /// (sheet name, relationship id) pairs from xl/workbook.xml
    fn sheet_entries(&mut self) -> Result<Vec<(String, String)>> {
        let workbook_xml = self
            .archive
            .by_name("xl/workbook.xml")
            .map_err(|_| Error::Format("missing xl/workbook.xml".to_string()))?;
        let mut reader = Reader::from_reader(BufReader::new(workbook_xml));
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    if e.name().as_ref() == b"sheet" {
                        let mut name = String::new();
                        let mut rid = String::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"name" => name = attr.unescape_value()?.to_string(),
                                b"r:id" => rid = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }
                        entries.push((name, rid));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(entries)
    }

    /// Relationship id to target map from xl/_rels/workbook.xml.rels
    fn relationship_targets(&mut self) -> Result<HashMap<String, String>> {
        let rels_xml = self
            .archive
            .by_name("xl/_rels/workbook.xml.rels")
            .map_err(|_| Error::Format("missing xl/_rels/workbook.xml.rels".to_string()))?;
        let mut reader = Reader::from_reader(BufReader::new(rels_xml));
        reader.config_mut().trim_text(true);

        let mut targets = HashMap::new();
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => {
                    if e.name().as_ref() == b"Relationship" {
                        let mut id = String::new();
                        let mut target = String::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"Id" => id = attr.unescape_value()?.to_string(),
                                b"Target" => target = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }
                        targets.insert(id, target);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(targets)
    }

    fn parse_sheet_grid(&mut self, path: &str) -> Result<Vec<Vec<CellValue>>> {
        let sheet_xml = self
            .archive
            .by_name(path)
            .map_err(|_| Error::Format(format!("missing worksheet part: {path}")))?;
        let mut reader = Reader::from_reader(BufReader::new(sheet_xml));
        reader.config_mut().trim_text(true);

        let mut cells: Vec<(u32, u32, CellValue)> = Vec::new();
        // Declared extent; the grid keeps this shape even when trailing
        // rows or columns are entirely empty
        let mut dim: Option<(u32, u32)> = None;
        let mut buf = Vec::new();
        let mut current_row = 0u32;
        let mut current_col = 0u32;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"dimension" => {
                        dim = parse_dimension(&e)?.or(dim);
                    }
                    b"row" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"r" {
                                current_row = attr
                                    .unescape_value()?
                                    .parse::<u32>()
                                    .unwrap_or(current_row + 1)
                                    .saturating_sub(1);
                            }
                        }
                        current_col = 0;
                    }
                    b"c" => {
                        let mut r_attr = String::new();
                        let mut t_attr = String::new();
                        for attr in e.attributes().flatten() {
                            match attr.key.as_ref() {
                                b"r" => r_attr = attr.unescape_value()?.to_string(),
                                b"t" => t_attr = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }

                        let (row, col) = if !r_attr.is_empty() {
                            let (r, c) =
                                parse_cell_ref(&r_attr).unwrap_or((current_row, current_col));
                            current_col = c + 1;
                            (r, c)
                        } else {
                            let c = current_col;
                            current_col += 1;
                            (current_row, c)
                        };

                        let value =
                            parse_cell_contents(&mut reader, &t_attr, &self.shared_strings)?;
                        cells.push((row, col, value));
                    }
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"dimension" => {
                        dim = parse_dimension(&e)?.or(dim);
                    }
                    b"row" => {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"r" {
                                current_row = attr
                                    .unescape_value()?
                                    .parse::<u32>()
                                    .unwrap_or(current_row + 1)
                                    .saturating_sub(1);
                            }
                        }
                        current_col = 0;
                    }
                    b"c" => {
                        // Style-only cell, no contents
                        let mut r_attr = String::new();
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"r" {
                                r_attr = attr.unescape_value()?.to_string();
                            }
                        }
                        if let Some((_, c)) = parse_cell_ref(&r_attr) {
                            current_col = c + 1;
                        } else {
                            current_col += 1;
                        }
                    }
                    _ => {}
                },
                Event::End(e) => {
                    if e.name().as_ref() == b"worksheet" {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(assemble_grid(cells, dim))
    }
}

fn parse_dimension(e: &quick_xml::events::BytesStart) -> Result<Option<(u32, u32)>> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"ref" {
            let ref_str = attr.unescape_value()?;
            if let Some((_, _, end_row, end_col)) = parse_cell_range(&ref_str) {
                return Ok(Some((end_row + 1, end_col + 1)));
            } else if let Some((end_row, end_col)) = parse_cell_ref(&ref_str) {
                return Ok(Some((end_row + 1, end_col + 1)));
            }
        }
    }
    Ok(None)
}

fn assemble_grid(cells: Vec<(u32, u32, CellValue)>, dim: Option<(u32, u32)>) -> Vec<Vec<CellValue>> {
    let mut rows_n = dim.map(|(r, _)| r as usize).unwrap_or(0);
    let mut cols_n = dim.map(|(_, c)| c as usize).unwrap_or(0);
    for (r, c, _) in &cells {
        rows_n = rows_n.max(*r as usize + 1);
        cols_n = cols_n.max(*c as usize + 1);
    }

    let mut grid = vec![vec![CellValue::Empty; cols_n]; rows_n];
    for (r, c, value) in cells {
        grid[r as usize][c as usize] = value;
    }
    grid
}

/// Read the contents of one `<c>` element; the cursor is left after `</c>`
fn parse_cell_contents<B: std::io::BufRead>(
    reader: &mut Reader<B>,
    t_attr: &str,
    shared_strings: &[String],
) -> Result<CellValue> {
    let mut value = CellValue::Empty;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"v" => {
                    let text = read_text_node(reader)?;
                    value = interpret_value(t_attr, &text, shared_strings);
                }
                // Inline string runs; also covers <is><t>...</t></is>
                b"t" => {
                    let text = read_text_node(reader)?;
                    value = CellValue::Text(text);
                }
                // Formula source; the cached result still arrives via <v>
                b"f" => {
                    read_text_node(reader)?;
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(value)
}

fn interpret_value(t_attr: &str, text: &str, shared_strings: &[String]) -> CellValue {
    match t_attr {
        "s" => {
            let idx = text.parse::<usize>().unwrap_or(0);
            CellValue::Text(shared_strings.get(idx).cloned().unwrap_or_default())
        }
        "b" => CellValue::Boolean(text == "1"),
        // Cached errors are surfaced as their display text (#DIV/0! etc.)
        "str" | "inlineStr" | "e" => CellValue::Text(text.to_string()),
        _ => match text.parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) if text.is_empty() => CellValue::Empty,
            Err(_) => CellValue::Text(text.to_string()),
        },
    }
}

fn extract_shared_strings<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let ss_xml = match archive.by_name("xl/sharedStrings.xml") {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    let mut reader = Reader::from_reader(BufReader::new(ss_xml));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_string = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"t" => {
                current_string.push_str(&read_text_node(&mut reader)?);
            }
            Event::End(e) if e.name().as_ref() == b"si" => {
                strings.push(current_string.clone());
                current_string.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Read text content up to the closing tag of the current XML node
fn read_text_node<B: std::io::BufRead>(reader: &mut Reader<B>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(e.unescape()?.as_ref()),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

/// Worksheet targets are usually relative ("worksheets/sheet1.xml")
fn normalize_part_path(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("worksheets/") {
        format!("xl/{target}")
    } else {
        target.to_string()
    }
}

/// Parse a cell reference like "A1" into (row, col) as 0-based indices
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let mut col = 0u32;
    let mut row_str = String::new();

    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        } else if ch.is_ascii_digit() {
            row_str.push(ch);
        }
    }

    if row_str.is_empty() {
        return None;
    }
    let row = row_str.parse::<u32>().ok()?;

    Some((row.saturating_sub(1), col.saturating_sub(1)))
}

/// Parse a cell range like "A1:B2" into (start_row, start_col, end_row, end_col)
pub fn parse_cell_range(range: &str) -> Option<(u32, u32, u32, u32)> {
    let parts: Vec<&str> = range.split(':').collect();
    if parts.len() != 2 {
        return None;
    }

    let (start_row, start_col) = parse_cell_ref(parts[0])?;
    let (end_row, end_col) = parse_cell_ref(parts[1])?;

    Some((start_row, start_col, end_row, end_col))
}
