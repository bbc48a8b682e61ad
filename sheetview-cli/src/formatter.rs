//! Terminal output: grid tables and session notices

use colored::*;
use sheetview_core::{
    cell_reference, CellValue, MarkupIndex, NoticeLevel, Notifier, Renderer, ViewMode,
};

const MAX_CELL_WIDTH: usize = 40;

/// Draws the active worksheet as a colored table, with markup cells
/// highlighted and listed below with their cell references
pub struct TableRenderer {
    enabled: bool,
}

impl TableRenderer {
    /// Starts suppressed so a session restore does not repaint the grid
    /// before the command has run
    pub fn new() -> Self {
        Self { enabled: false }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for TableRenderer {
    fn render(&mut self, grid: &[Vec<CellValue>], markup: &MarkupIndex, mode: ViewMode) {
        if !self.enabled {
            return;
        }

        let mode_label = match mode {
            ViewMode::Raw => "raw",
            ViewMode::Rendered => "rendered",
        };
        println!("{} {}", "View:".bold(), mode_label.cyan().bold());

        let cols = grid.iter().map(Vec::len).max().unwrap_or(0);
        let mut widths = vec![0usize; cols];
        let mut display: Vec<Vec<String>> = Vec::with_capacity(grid.len());
        for (row_idx, row) in grid.iter().enumerate() {
            let mut out_row = Vec::with_capacity(cols);
            for col_idx in 0..cols {
                let text = cell_text(row.get(col_idx), markup, row_idx, col_idx, mode);
                widths[col_idx] = widths[col_idx].max(text.chars().count());
                out_row.push(text);
            }
            display.push(out_row);
        }

        for (row_idx, row) in display.iter().enumerate() {
            let mut line = String::new();
            for (col_idx, text) in row.iter().enumerate() {
                let padded = format!("{:width$}", text, width = widths[col_idx]);
                let cell = if row_idx == 0 {
                    padded.bold().to_string()
                } else if markup.lookup(row_idx, col_idx).is_some() {
                    padded.yellow().to_string()
                } else {
                    padded
                };
                line.push_str(&cell);
                line.push_str("  ");
            }
            println!("{}", line.trim_end());
        }
        println!();

        if !markup.is_empty() {
            println!("{}", "Markup cells:".bold().underline());
            for cell in markup.cells() {
                println!(
                    "  {} {}",
                    cell_reference(cell.row, cell.col).yellow().bold(),
                    truncate(&cell.raw)
                );
            }
            println!();
        }
    }

    fn clear(&mut self) {
        if self.enabled {
            println!("{}", "(no worksheet displayed)".bright_black());
        }
    }
}

fn cell_text(
    value: Option<&CellValue>,
    markup: &MarkupIndex,
    row: usize,
    col: usize,
    mode: ViewMode,
) -> String {
    if let Some(cell) = markup.lookup(row, col) {
        let text = match mode {
            ViewMode::Raw => &cell.raw,
            ViewMode::Rendered => &cell.sanitized,
        };
        return truncate(text);
    }
    match value {
        Some(v) => truncate(&v.to_display_string()),
        None => String::new(),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_WIDTH {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
    format!("{cut}…")
}

/// Prints notices with colored severity prefixes
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&mut self, level: NoticeLevel, message: &str) {
        let prefix = match level {
            NoticeLevel::Info => "INFO".blue().bold(),
            NoticeLevel::Success => "OK".green().bold(),
            NoticeLevel::Warning => "WARN".yellow().bold(),
            NoticeLevel::Error => "ERROR".red().bold(),
        };
        println!("{prefix} {message}");
    }
}
