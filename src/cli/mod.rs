//! Command-line interface for learnhub.
//!
//! Without a subcommand the binary starts the HTTP server. Subcommands:
//! - `config check` - Validate the configuration file and print a summary
//! - `db reconcile` - Report (or with `--execute`, repair) drifted course counters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::db::{self, counters, counters::CounterDrift};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "learnhub")]
#[command(author, version, about = "Course and lesson authoring API", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "LEARNHUB_CONFIG", default_value = "learnhub.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Database maintenance commands
    #[command(subcommand)]
    Db(DbCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Compare course counters with their live lessons
    Reconcile {
        /// Rewrite drifted counters (without this flag, only report them)
        #[arg(long)]
        execute: bool,
    },
}

/// Run a CLI command
pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::Db(DbCommands::Reconcile { execute })) => {
            cmd_db_reconcile(cli, *execute).await
        }
        // No subcommand means start the server, handled in main.rs
        None => Ok(()),
    }
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!("[!!] Configuration file not found: {}", config_path.display());
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("[ERROR] Configuration is invalid: {:#}", e);
            anyhow::bail!("configuration check failed");
        }
    };

    println!("[OK] Configuration file is valid!");
    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("Server:");
    println!("  Listen:       {}:{}", config.server.host, config.server.port);
    println!("  Static Dir:   {}", config.server.static_dir.display());
    println!();
    println!("Database:");
    println!("  URL:          {}", config.database.url);
    println!("  Connections:  {}", config.database.max_connections);
    println!();
    println!("Auth:");
    println!("  Token TTL:    {} days", config.auth.token_ttl_days);
    println!(
        "  Admin User:   {}",
        config.auth.admin_email.as_deref().unwrap_or("(not configured)")
    );
    println!();
    println!("Security:");
    println!(
        "  Rate Limiting: {}",
        if config.rate_limit.enabled {
            format!(
                "Enabled ({} auth requests / {}s)",
                config.rate_limit.auth_requests_per_window, config.rate_limit.window_seconds
            )
        } else {
            "Disabled".to_string()
        }
    );
    println!();
    println!("Logging:");
    println!("  Level:        {}", config.logging.level);

    Ok(())
}

async fn cmd_db_reconcile(cli: &Cli, execute: bool) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let pool = db::init(&config.database)
        .await
        .context("Failed to open database")?;

    println!();
    println!("=== Course Counter Reconciliation ===");
    println!();

    if !execute {
        println!("[DRY RUN] Showing drifted counters. Use --execute to rewrite them.");
        println!();
    }

    let drift = if execute {
        counters::reconcile(&pool).await?
    } else {
        counters::find_drift(&pool).await?
    };

    if drift.is_empty() {
        println!("All course counters match their lessons.");
        return Ok(());
    }

    for line in drift.iter().map(describe_drift) {
        println!("  {}", line);
    }
    println!();

    if execute {
        println!("Rewrote counters on {} course(s).", drift.len());
    } else {
        println!("{} course(s) would be updated.", drift.len());
    }

    Ok(())
}

fn describe_drift(d: &CounterDrift) -> String {
    format!(
        "{} ({}): lessons {} -> {}, duration {}s -> {}s",
        d.title, d.course_id, d.stored_lessons, d.live_lessons, d.stored_duration, d.live_duration
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reconcile_flags() {
        let cli = Cli::try_parse_from(["learnhub", "db", "reconcile", "--execute"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Db(DbCommands::Reconcile { execute: true }))
        ));
        assert_eq!(cli.config, PathBuf::from("learnhub.toml"));
    }

    #[test]
    fn test_no_subcommand_serves() {
        let cli = Cli::try_parse_from(["learnhub", "--log-level", "debug"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_describe_drift() {
        let d = CounterDrift {
            course_id: "c1".to_string(),
            title: "Rust".to_string(),
            stored_lessons: 3,
            stored_duration: 900,
            live_lessons: 2,
            live_duration: 600,
        };
        assert_eq!(
            describe_drift(&d),
            "Rust (c1): lessons 3 -> 2, duration 900s -> 600s"
        );
    }
}
