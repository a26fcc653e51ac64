//! Desk CLI - Command-line tool for arm control authority
//!
//! Logs into the arm's administrative web service and drives control
//! authority, brakes, gripper homing and the FCI.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use desk_client::{DeskConfig, DeskConnector, DeskHandler};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Overrides;
use crate::output::{OutputContext, OutputFormat};

/// Delay between connection attempts when waiting for the arm indefinitely
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "desk-cli")]
#[command(author, version, about = "Arm control authority CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Arm host name or IP address
    #[arg(long, env = "DESK_HOST")]
    host: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "DESK_CONFIG")]
    config: Option<PathBuf>,

    /// Login user name
    #[arg(short, long, env = "DESK_USERNAME")]
    username: Option<String>,

    /// Pre-hashed login password
    #[arg(short, long, env = "DESK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Login attempts per connect (negative waits for the arm forever)
    #[arg(long, allow_negative_numbers = true)]
    login_retries: Option<i32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show session and control authority state
    Status,

    /// Acquire control authority
    Acquire {
        /// Force the takeover (requires the confirmation button on the arm)
        #[arg(long)]
        force: bool,

        /// Hold control authority until Ctrl-C, then release it
        #[arg(long)]
        hold: bool,
    },

    /// Release control authority
    Release,

    /// Enable the Franka Control Interface
    ///
    /// On firmware 4.2.0 and later this needs control authority, which only
    /// the process that acquired it holds. Use `run` or `acquire --hold`
    /// to keep authority while working.
    EnableFci,

    /// Disable the Franka Control Interface
    ///
    /// On firmware 4.2.0 and later this needs control authority, which only
    /// the process that acquired it holds. Use `run` or `acquire --hold`
    /// to keep authority while working.
    DisableFci,

    /// Open the joint brakes
    ///
    /// On firmware 4.2.0 and later this needs control authority, which only
    /// the process that acquired it holds. Use `run` or `acquire --hold`
    /// to keep authority while working.
    OpenBrakes,

    /// Close the joint brakes
    CloseBrakes,

    /// Home the gripper
    HomeGripper,

    /// Run the startup sequence, wait for Ctrl-C, then tear down
    Run {
        /// Acquire control authority on startup
        #[arg(long)]
        acquire_control: bool,

        /// Do not fall back to a forced takeover
        #[arg(long)]
        no_force: bool,

        /// Open brakes on startup
        #[arg(long)]
        open_brakes: bool,

        /// Home the gripper on startup
        #[arg(long)]
        home_gripper: bool,

        /// Enable FCI on startup
        #[arg(long)]
        enable_fci: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    // Load config file and merge CLI args over it
    let file_config = config::load(cli.config.as_deref())?;
    let merged = config::merge_with_args(
        file_config,
        &Overrides {
            host: cli.host.clone(),
            username: cli.username.clone(),
            password: cli.password.clone(),
            login_retries: cli.login_retries,
        },
    );

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    let Some(handler) = connect(&merged, &ctx).await? else {
        return Ok(());
    };

    let success = match &cli.command {
        Commands::Status => commands::status(&handler, &ctx).await?,
        Commands::Acquire { force, hold } => {
            commands::acquire(&handler, *force, *hold, &ctx).await?
        }
        Commands::Release => commands::release(&handler, &ctx).await?,
        Commands::EnableFci => commands::enable_fci(&handler, &ctx).await?,
        Commands::DisableFci => commands::disable_fci(&handler, &ctx).await?,
        Commands::OpenBrakes => commands::open_brakes(&handler, &ctx).await?,
        Commands::CloseBrakes => commands::close_brakes(&handler, &ctx).await?,
        Commands::HomeGripper => commands::home_gripper(&handler, &ctx).await?,
        Commands::Run {
            acquire_control,
            no_force,
            open_brakes,
            home_gripper,
            enable_fci,
        } => {
            let mut options = merged.startup.clone();
            options.auto_acquire_control |= *acquire_control;
            options.force_auto_acquire &= !*no_force;
            options.auto_open_brakes |= *open_brakes;
            options.auto_home_gripper |= *home_gripper;
            options.auto_enable_fci |= *enable_fci;
            commands::run(&handler, &options, &ctx).await?
        }
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}

/// Log in and read the system version
///
/// A negative login retry count keeps trying every few seconds until the
/// arm answers; returns `None` if interrupted by Ctrl-C while waiting.
async fn connect(config: &DeskConfig, ctx: &OutputContext) -> Result<Option<DeskHandler>> {
    let connector = DeskConnector::new(config).context("Failed to create desk client")?;

    ctx.info(&format!("Connecting to {}...", config.host));

    match config.bounded_login_retries() {
        Some(retries) => {
            connector
                .connect(retries)
                .await
                .with_context(|| format!("Failed to connect to {}", config.host))?;
        }
        None => loop {
            match connector.connect(0).await {
                Ok(()) => break,
                Err(e) => warn!("Arm at {} not reachable yet: {}", config.host, e),
            }
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(None),
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        },
    }

    Ok(Some(DeskHandler::new(connector)))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_token_gated_commands_mention_hold() {
        let mut cli = Cli::command();
        for name in ["enable-fci", "disable-fci", "open-brakes"] {
            let command = cli.find_subcommand_mut(name).unwrap();
            let about = command
                .get_long_about()
                .map(|text| text.to_string())
                .unwrap_or_default();
            assert!(about.contains("acquire --hold"), "{}: {}", name, about);
        }
    }

    #[test]
    fn test_negative_login_retries_parse() {
        let cli = Cli::try_parse_from(["desk-cli", "--login-retries", "-1", "status"]).unwrap();
        assert_eq!(cli.login_retries, Some(-1));
    }
}
