//! Output formatting for desk-cli (text, json)

use clap::ValueEnum;
use colored::Colorize;
use desk_client::{CommandOutcome, Session, TeardownReport};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Serialize)]
struct StatusJson<'a> {
    #[serde(flatten)]
    session: SessionJson<'a>,
    control_state: &'a str,
    can_control: Option<bool>,
}

#[derive(Serialize)]
struct SessionJson<'a> {
    host: &'a str,
    authenticated: bool,
    version: Option<&'a str>,
    control_token_required: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet && self.format == OutputFormat::Text {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print the outcome of a command; returns its success flag
    pub fn outcome(&self, outcome: &CommandOutcome) -> bool {
        match self.format {
            OutputFormat::Json => print_json(outcome),
            OutputFormat::Text if outcome.success => {
                if !self.quiet {
                    println!("{}", outcome.message.green());
                }
            }
            OutputFormat::Text => eprintln!("{}", outcome.message.red()),
        }
        outcome.success
    }

    /// Print session details and control state
    pub fn status(&self, session: &Session, control_state: &str, can_control: Option<bool>) {
        match self.format {
            OutputFormat::Json => print_json(&StatusJson {
                session: SessionJson {
                    host: &session.host,
                    authenticated: session.authenticated,
                    version: session.version.as_deref(),
                    control_token_required: session.control_token_required,
                },
                control_state,
                can_control,
            }),
            OutputFormat::Text => {
                let rows = vec![
                    Row {
                        field: "Host",
                        value: session.host.clone(),
                    },
                    Row {
                        field: "Authenticated",
                        value: yes_no(session.authenticated),
                    },
                    Row {
                        field: "System version",
                        value: session.version.clone().unwrap_or_else(|| "-".to_string()),
                    },
                    Row {
                        field: "Control token required",
                        value: yes_no(session.control_token_required),
                    },
                    Row {
                        field: "Control state",
                        value: control_state.to_string(),
                    },
                    Row {
                        field: "Can control",
                        value: can_control.map(yes_no).unwrap_or_else(|| "unknown".to_string()),
                    },
                ];
                println!("{}", Table::new(rows).with(Style::rounded()));
            }
        }
    }

    /// Print the teardown report
    pub fn teardown(&self, report: &TeardownReport) {
        match self.format {
            OutputFormat::Json => print_json(report),
            OutputFormat::Text => {
                let step = |name: &str, ok: bool| {
                    if ok {
                        println!("{} {}", "ok".green(), name);
                    } else {
                        println!("{} {}", "FAILED".red(), name);
                    }
                };
                step("close brakes", report.brakes_closed);
                step("disable FCI", report.fci_disabled);
                step("release control authority", report.control_released);
                step("log out", report.logged_out);
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}
