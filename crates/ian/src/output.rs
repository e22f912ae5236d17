use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ian_listener::{ArgumentCategory, ListenerArgument};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Result of a version handshake probe.
#[derive(Serialize, Debug)]
pub struct ProbeOutput {
    pub address: String,
    pub server_version: String,
    pub legacy_version: Option<f32>,
    pub supported: bool,
    pub welcome: Option<String>,
}

/// A packet or connection event seen by `listen`.
#[derive(Serialize, Debug, Clone)]
pub struct Observation {
    pub kind: &'static str,
    pub name: String,
    pub detail: String,
    pub timestamp: String,
}

impl Observation {
    pub fn from_argument(argument: &dyn ListenerArgument) -> Self {
        let detail = format!("{argument:?}");
        let kind = match argument.category() {
            ArgumentCategory::Packet => "packet",
            ArgumentCategory::ConnectionEvent => "event",
        };
        Self {
            kind,
            name: argument_name(&detail).to_string(),
            detail,
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_probe(out: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "VERSION", "LEGACY", "SUPPORTED", "WELCOME"])
                .add_row(vec![
                    out.address.clone(),
                    out.server_version.clone(),
                    out.legacy_version
                        .map(|v| format!("{v:.1}"))
                        .unwrap_or_default(),
                    out.supported.to_string(),
                    out.welcome.clone().unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Server:");
            println!("  Address:   {}", out.address);
            match out.legacy_version {
                Some(legacy) => println!(
                    "  Version:   {} (legacy {legacy:.1})",
                    out.server_version
                ),
                None => println!("  Version:   {}", out.server_version),
            }
            println!(
                "  Supported: {}",
                if out.supported { "yes" } else { "no" }
            );
            match &out.welcome {
                Some(message) => println!("  Welcome:   {message}"),
                None => println!("  Welcome:   none"),
            }
        }
    }
}

pub fn print_observation(out: &Observation, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "NAME", "DETAIL"])
                .add_row(vec![out.kind.to_string(), out.name.clone(), out.detail.clone()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} {} {}", out.kind, out.name, out.detail);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Leading type name of a `Debug` rendering, e.g. `WelcomePacket` from
/// `WelcomePacket { message: "hi" }`.
fn argument_name(debug: &str) -> &str {
    debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or(debug)
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
