//! Markup cell index for a loaded worksheet grid

use serde::{Deserialize, Serialize};

use crate::detect;
use crate::reader::CellValue;
use crate::sanitize;

/// A flagged grid position together with its sanitized rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupCell {
    pub row: usize,
    pub col: usize,
    pub raw: String,
    pub sanitized: String,
}

/// The set of markup cells found in one grid.
///
/// Built by a full scan whenever a worksheet is (re)loaded; a view-mode
/// toggle reuses the existing index without rescanning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkupIndex {
    cells: Vec<MarkupCell>,
}

impl MarkupIndex {
    /// Scan every cell below the header row and sanitize each flagged one.
    /// O(rows x cols), single pass.
    pub fn build(grid: &[Vec<CellValue>]) -> Self {
        let mut cells = Vec::new();
        for (row, columns) in grid.iter().enumerate().skip(1) {
            for (col, value) in columns.iter().enumerate() {
                if let CellValue::Text(text) = value
                    && detect::is_markup_text(text)
                {
                    cells.push(MarkupCell {
                        row,
                        col,
                        raw: text.clone(),
                        sanitized: sanitize::sanitize(text),
                    });
                }
            }
        }
        Self { cells }
    }

    pub fn lookup(&self, row: usize, col: usize) -> Option<&MarkupCell> {
        self.cells.iter().find(|c| c.row == row && c.col == col)
    }

    pub fn cells(&self) -> &[MarkupCell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
