//! Styled output helpers.

use std::fmt::Write as _;
use std::io::{self, Write};

use console::style;

/// Print an info message to stderr.
pub fn info(message: &str) {
    eprintln!("{} {}", style("→").cyan(), message);
}

/// Print a success message to stderr.
pub fn success(message: &str) {
    eprintln!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message to stderr.
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message to stderr.
pub fn warning(message: &str) {
    eprintln!("{} {}", style("!").yellow().bold(), message);
}

/// Column alignment.
#[derive(Clone, Copy, Default)]
pub enum Alignment {
    #[default]
    Left,
    Right,
}

/// A markdown-style table.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    alignments: Vec<Alignment>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        let count = headers.len();
        Self {
            headers,
            rows: Vec::new(),
            alignments: vec![Alignment::Left; count],
        }
    }

    pub fn with_alignments(mut self, alignments: Vec<Alignment>) -> Self {
        self.alignments = alignments;
        self
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        if self.headers.is_empty() {
            return String::new();
        }

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut output = String::new();
        output.push('|');
        for (header, &w) in self.headers.iter().zip(&widths) {
            let _ = write!(output, " {header:^w$} |");
        }
        output.push('\n');

        output.push('|');
        for (i, &w) in widths.iter().enumerate() {
            match self.alignments.get(i).copied().unwrap_or_default() {
                Alignment::Left => {
                    let _ = write!(output, ":{:-<w$}|", "", w = w + 1);
                }
                Alignment::Right => {
                    let _ = write!(output, "{:-<w$}:|", "", w = w + 1);
                }
            }
        }
        output.push('\n');

        for row in &self.rows {
            output.push('|');
            for (i, (cell, &w)) in row.iter().zip(&widths).enumerate() {
                match self.alignments.get(i).copied().unwrap_or_default() {
                    Alignment::Left => {
                        let _ = write!(output, " {cell:<w$} |");
                    }
                    Alignment::Right => {
                        let _ = write!(output, " {cell:>w$} |");
                    }
                }
            }
            output.push('\n');
        }
        output
    }

    /// Print the table to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
        let _ = io::stdout().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let mut table = Table::new(vec!["line".into(), "rax".into()])
            .with_alignments(vec![Alignment::Right, Alignment::Left]);
        table.add_row(vec!["2".into(), "0xc".into()]);
        assert_eq!(
            table.render(),
            "| line | rax |\n|-----:|:----|\n|    2 | 0xc |\n"
        );
    }

    #[test]
    fn test_widths_count_chars() {
        let mut table = Table::new(vec!["ΔΔ".into(), "x".into()]);
        table.add_row(vec!["a".into(), "é".into()]);
        assert_eq!(table.render(), "| ΔΔ | x |\n|:---|:--|\n| a  | é |\n");
    }
}
