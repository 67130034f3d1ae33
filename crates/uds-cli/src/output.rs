//! Output formatting for uds-cli (table, json)

use clap::ValueEnum;
use colored::Colorize;
use j1939_uds::UdsMessage;
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
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

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
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
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
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
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
    }
}

// =============================================================================
// Row types for table output
// =============================================================================

/// One decoded UDS message
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct MessageRow {
    #[tabled(rename = "#")]
    pub index: u64,
    #[tabled(rename = "SA")]
    pub source: String,
    #[tabled(rename = "Source")]
    pub source_name: String,
    #[tabled(rename = "DA")]
    pub destination: String,
    #[tabled(rename = "SID")]
    pub sid: String,
    #[tabled(rename = "Service")]
    pub service: String,
    #[tabled(rename = "Meaning")]
    pub meaning: String,
    #[tabled(rename = "Value")]
    pub value: String,
    #[tabled(rename = "Units")]
    pub units: String,
    #[tabled(rename = "Raw")]
    pub raw: String,
}

impl MessageRow {
    pub fn new(index: u64, message: &UdsMessage) -> Self {
        Self {
            index,
            source: format!("0x{:02X}", message.source_address),
            source_name: message.source_name.clone(),
            destination: format!("0x{:02X}", message.destination_address),
            sid: message.sid.clone(),
            service: message.service_name.clone(),
            meaning: message.meaning.clone(),
            value: message.value.clone(),
            units: message.units.clone(),
            raw: message.raw_hexadecimal.clone(),
        }
    }
}

/// One registry field
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct FieldRow {
    #[tabled(rename = "Component")]
    pub component: String,
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}
