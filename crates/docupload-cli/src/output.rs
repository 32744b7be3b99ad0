//! Output formatting for human and JSON modes

use docupload_core::domain::{UploadItem, UploadStatus};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    /// Maps the global `--json` flag
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &serde_json::Value);
    /// Reports the final state of one upload
    fn outcome(&self, item: &UploadItem);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {}", message);
    }
    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {}", message);
    }
    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {}", message);
    }
    fn info(&self, message: &str) {
        println!("  {}", message);
    }
    fn print_json(&self, _value: &serde_json::Value) {}
    fn outcome(&self, item: &UploadItem) {
        let line = outcome_line(item);
        match item.status() {
            UploadStatus::Succeeded => self.success(&line),
            UploadStatus::Conflict | UploadStatus::Paused => self.warn(&line),
            _ => self.error(&line),
        }
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!(
            "{}",
            serde_json::json!({"success": true, "message": message})
        );
    }
    fn error(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"success": false, "error": message})
        );
    }
    fn warn(&self, message: &str) {
        eprintln!(
            "{}",
            serde_json::json!({"level": "warning", "message": message})
        );
    }
    fn info(&self, _message: &str) {}
    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_default()
        );
    }
    fn outcome(&self, item: &UploadItem) {
        self.print_json(&outcome_json(item));
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

/// One-line summary, e.g. `report.pdf: succeeded (document doc-1)`
pub fn outcome_line(item: &UploadItem) -> String {
    let name = &item.source().name;
    match item.status() {
        UploadStatus::Succeeded => {
            match item.response().and_then(docupload_core::ports::document_id) {
                Some(id) => format!("{name}: succeeded (document {id})"),
                None => format!("{name}: succeeded"),
            }
        }
        status => match item.error() {
            Some(reason) => format!("{name}: {status} ({reason})"),
            None => format!("{name}: {status}"),
        },
    }
}

/// Compact JSON view of one upload
pub fn outcome_json(item: &UploadItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id().as_u64(),
        "name": item.source().name,
        "size": item.source().size,
        "status": item.status(),
        "mode": item.mode().map(|m| m.to_string()),
        "error": item.error(),
        "document": item.response(),
    })
}
