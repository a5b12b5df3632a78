//! Human or JSON rendering of command results.
//!
//! In JSON mode stdout carries exactly one document, the result envelope;
//! progress lines are suppressed and warnings go to stderr.

use console::style;
use serde::Serialize;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        let format = if json { OutputFormat::Json } else { OutputFormat::Human };
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn human(&self, line: impl Display) {
        if !self.is_json() {
            println!("{}", line);
        }
    }

    pub fn success(&self, message: impl Display) {
        self.human(format_args!("{} {}", style("✓").green().bold(), message));
    }

    pub fn info(&self, message: impl Display) {
        self.human(format_args!("{} {}", style("ℹ").blue().bold(), message));
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        self.human(format_args!("  {:<16} {}", style(format!("{}:", key)).bold(), value));
    }

    pub fn section(&self, title: impl Display) {
        self.human(format_args!("\n{}", style(title).bold().underlined()));
    }

    pub fn warning(&self, message: impl Display) {
        if self.is_json() {
            eprintln!("{}", serde_json::json!({ "status": "warning", "message": message.to_string() }));
        } else {
            eprintln!("{} {}", style("⚠").yellow().bold(), message);
        }
    }

    pub fn table<T: Tabled>(&self, rows: Vec<T>) {
        if rows.is_empty() {
            self.human(style("(no rows)").dim());
            return;
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        self.human(table);
    }

    /// Emit the `{"status": "success", "data": ...}` envelope (JSON mode only)
    pub fn result<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.is_json() {
            let envelope = serde_json::json!({ "status": "success", "data": data });
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        Ok(())
    }
}
