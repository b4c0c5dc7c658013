//! Output formatting for suseq (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use suseq_core::{FileEntry, NodeSummary, OverallStatus, PemFileState, SubNodeAggregate};
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Progress and summary lines only make sense next to a table
    pub fn is_interactive(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Table
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print data in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    if !self.quiet {
                        println!("No data");
                    }
                } else {
                    let table = Table::new(data).to_string();
                    println!("{}", table);
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                print_csv(data);
            }
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(&str, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: std::collections::BTreeMap<&str, &str> =
                    pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => {
                let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = pairs.iter().map(|(_, v)| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Print data as CSV
fn print_csv<T: Serialize>(data: &[T]) {
    let Some(first) = data.first() else {
        return;
    };

    // Field names from the first item
    if let Ok(serde_json::Value::Object(map)) = serde_json::to_value(first) {
        let headers: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        println!("{}", headers.join(","));

        for item in data {
            if let Ok(serde_json::Value::Object(row)) = serde_json::to_value(item) {
                let values: Vec<String> = headers
                    .iter()
                    .map(|h| {
                        row.get(*h)
                            .map(|v| match v {
                                serde_json::Value::String(s) => escape_csv(s),
                                other => escape_csv(&other.to_string()),
                            })
                            .unwrap_or_default()
                    })
                    .collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Seconds as `1h 02m 03s`, `2m 05s` or `7s`
pub fn format_duration_s(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

pub fn status_colored(status: OverallStatus) -> String {
    let text = status.to_string();
    match status {
        OverallStatus::Success => text.green().to_string(),
        OverallStatus::Failed | OverallStatus::Invalid => text.red().to_string(),
        OverallStatus::InProgress => text.cyan().to_string(),
        OverallStatus::Waiting => text.yellow().to_string(),
    }
}

// =============================================================================
// Display types for the commands
// =============================================================================

/// Node status row for the replay command
#[derive(Debug, Tabled, Serialize)]
pub struct NodeRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Indices")]
    pub node_indices: String,
    #[tabled(rename = "Active")]
    pub active: String,
    #[tabled(rename = "Connect")]
    pub initial_status: OverallStatus,
    #[tabled(rename = "Update")]
    pub update_status: OverallStatus,
    #[tabled(rename = "Bytes")]
    pub file_bytes: u64,
}

impl From<&NodeSummary> for NodeRow {
    fn from(summary: &NodeSummary) -> Self {
        NodeRow {
            node: summary.name.clone(),
            node_indices: summary
                .node_indices
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(","),
            active: format!("{}/{}", summary.active_sub_nodes, summary.sub_node_count),
            initial_status: summary.initial_status,
            update_status: summary.update_status,
            file_bytes: summary.file_bytes,
        }
    }
}

/// Sub-node row for the check command
#[derive(Debug, Tabled, Serialize)]
pub struct SubNodeRow {
    #[tabled(rename = "Node")]
    pub node: String,
    #[tabled(rename = "Index")]
    pub node_index: u32,
    #[tabled(rename = "Device")]
    pub name: String,
    #[tabled(rename = "Flashloader")]
    pub flashloader: String,
    #[tabled(rename = "Active")]
    pub active: bool,
    #[tabled(rename = "Files")]
    pub files: usize,
    #[tabled(rename = "Bytes")]
    pub bytes: u64,
    #[tabled(rename = "Update")]
    pub update: String,
}

impl SubNodeRow {
    pub fn new(node: &str, sub: &SubNodeAggregate, bytes: u64) -> Self {
        let update = if !sub.has_available_flashloader() {
            "no flashloader"
        } else if sub.check_update_disabled_state() {
            "disabled"
        } else if sub.check_always_update() {
            "always"
        } else {
            "if changed"
        };
        let info = sub.update_info();
        SubNodeRow {
            node: node.to_string(),
            node_index: sub.node_index(),
            name: sub.name().to_string(),
            flashloader: sub
                .flashloader()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "-".to_string()),
            active: sub.is_active(),
            files: info.files.iter().filter(|f| !f.skip_update).count()
                + usize::from(info.active_pem_file().is_some()),
            bytes,
            update: update.to_string(),
        }
    }
}

/// Per-file progress row for the replay command
#[derive(Debug, Tabled, Serialize)]
pub struct FileRow {
    #[tabled(rename = "Index")]
    pub node_index: u32,
    #[tabled(rename = "File")]
    pub file: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "State")]
    pub state: String,
}

impl FileRow {
    pub fn from_entry(node_index: u32, entry: &FileEntry<'_>) -> Self {
        FileRow {
            node_index,
            file: entry.file_name().to_string(),
            kind: entry.kind().to_string(),
            state: file_state(entry.has_error(), entry.is_terminal()).to_string(),
        }
    }

    pub fn from_pem(node_index: u32, pem: &PemFileState) -> Self {
        use suseq_core::FileSteps;
        FileRow {
            node_index,
            file: pem.file.file_name.clone(),
            kind: "pem".to_string(),
            state: file_state(pem.has_error(), pem.is_terminal()).to_string(),
        }
    }
}

fn file_state(has_error: bool, is_terminal: bool) -> &'static str {
    if has_error {
        "failed"
    } else if is_terminal {
        "done"
    } else {
        "pending"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_s(7), "7s");
        assert_eq!(format_duration_s(125), "2m 05s");
        assert_eq!(format_duration_s(3723), "1h 02m 03s");
    }

    #[test]
    fn test_node_row_from_summary() {
        let summary = NodeSummary {
            name: "body".to_string(),
            node_indices: vec![3, 4],
            active_sub_nodes: 1,
            sub_node_count: 2,
            initial_status: OverallStatus::Success,
            update_status: OverallStatus::Failed,
            file_bytes: 4096,
            discarded: false,
        };
        let row = NodeRow::from(&summary);
        assert_eq!(row.node_indices, "3,4");
        assert_eq!(row.active, "1/2");
        assert_eq!(row.update_status, OverallStatus::Failed);
    }
}
