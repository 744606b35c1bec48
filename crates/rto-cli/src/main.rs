//! RTO Compliance CLI
//!
//! Runs the compliance API server and manages its database and configuration.

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

mod commands;
mod config;
mod validator;

use commands::{cmd_migrate, cmd_seed, run_server};
use config::AppConfig;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "rto")]
#[command(version)]
#[command(about = "Compliance management for Registered Training Organisations", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Database URL (sqlite://)
        #[arg(short, long)]
        database: Option<String>,

        /// Disable Swagger UI
        #[arg(long)]
        no_swagger: bool,

        /// Validate configuration and exit without starting the server
        #[arg(long)]
        validate_only: bool,
    },

    /// Apply database migrations
    Migrate {
        /// Database URL (sqlite://)
        #[arg(short, long)]
        database: Option<String>,
    },

    /// Create the system roles and, on an empty database, the admin user
    Seed {
        /// Database URL (sqlite://)
        #[arg(short, long)]
        database: Option<String>,
    },

    /// Validate a configuration file
    Validate {
        /// Config file to validate (defaults to --config)
        config: Option<PathBuf>,
    },

    /// Show the effective configuration
    Config {
        /// Show secrets (redacted by default)
        #[arg(long)]
        show_secrets: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path, cli.config.is_some(), cli.verbose)?;

    let mut logging = config.logging_config(cli.verbose);
    if cli.format == OutputFormat::Json {
        logging.json_format = true;
    }
    rto_observability::init_logging_with_config(logging);

    match cli.command {
        Commands::Serve {
            port,
            host,
            database,
            no_swagger,
            validate_only,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(database) = database {
                config.database.url = database;
            }
            if no_swagger {
                config.server.swagger = false;
            }
            config.apply_env_overrides();
            cmd_serve(config, validate_only).await
        }
        Commands::Migrate { database } => {
            apply_database_flag(&mut config, database);
            cmd_migrate(&config.database.url).await
        }
        Commands::Seed { database } => {
            apply_database_flag(&mut config, database);
            cmd_seed(&config.database.url).await
        }
        Commands::Validate { config: cfg_path } => {
            cmd_validate(cfg_path.unwrap_or(config_path)).await
        }
        Commands::Config { show_secrets } => {
            config.apply_env_overrides();
            cmd_config(config, show_secrets, cli.format).await
        }
    }
}

fn default_config_path() -> PathBuf {
    if let Some(dirs) = directories::ProjectDirs::from("au", "rto-compliance", "rto-compliance") {
        dirs.config_dir().join("config.yaml")
    } else {
        PathBuf::from("config/default.yaml")
    }
}

/// An explicit `--config` must load; the default location is optional.
fn load_config(path: &Path, explicit: bool, verbose: bool) -> Result<AppConfig> {
    if explicit || path.exists() {
        return AppConfig::load(path);
    }
    if verbose {
        eprintln!("Using default configuration (no config file found)");
    }
    Ok(AppConfig::default())
}

fn apply_database_flag(config: &mut AppConfig, database: Option<String>) {
    if let Some(database) = database {
        config.database.url = database;
    }
    config.apply_env_overrides();
}

async fn cmd_serve(config: AppConfig, validate_only: bool) -> Result<()> {
    println!("{}", "Validating configuration...".cyan());

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    if validation_result.has_errors() {
        println!();
        let message = if validate_only {
            "Configuration validation failed. Fix the errors above before starting the server."
        } else {
            "Server startup aborted due to configuration errors. Fix the errors above and try again."
        };
        println!("{}", message.red().bold());
        std::process::exit(1);
    }

    if validate_only {
        println!();
        println!(
            "{}",
            "Configuration is valid. Server can be started."
                .green()
                .bold()
        );
        return Ok(());
    }

    println!();
    run_server(config).await
}

async fn cmd_validate(config_path: PathBuf) -> Result<()> {
    println!(
        "Validating configuration: {}",
        config_path.display().to_string().cyan()
    );

    let mut config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("{}: {:#}", "Configuration file error".red().bold(), e);
            std::process::exit(1);
        }
    };
    config.apply_env_overrides();

    let validation_result = ConfigValidator::validate(&config);
    validation_result.print();

    let integrations = &config.integrations;
    let configured: Vec<&str> = [
        ("google_drive", integrations.google_drive.is_some()),
        ("xero", integrations.xero.is_some()),
        ("accelerate", integrations.accelerate.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, on)| on.then_some(name))
    .collect();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!(
        "  Server: {}:{}",
        config.server.host, config.server.port
    );
    println!("  Database: {}", config.database.url);
    println!("  Email provider: {:?}", config.email.provider);
    if configured.is_empty() {
        println!("  Integrations: none");
    } else {
        println!("  Integrations: {}", configured.join(", "));
    }

    println!();
    if validation_result.has_errors() {
        println!(
            "{}",
            "Configuration validation failed. Fix the errors above."
                .red()
                .bold()
        );
        std::process::exit(1);
    } else if validation_result.has_warnings() {
        println!(
            "{}",
            "Configuration is valid with warnings. Review the warnings above."
                .yellow()
                .bold()
        );
    } else {
        println!("{}", "Configuration is valid.".green().bold());
    }

    Ok(())
}

async fn cmd_config(config: AppConfig, show_secrets: bool, format: OutputFormat) -> Result<()> {
    let display_config = if show_secrets {
        config
    } else {
        config.redact_secrets()
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&display_config)?);
    } else {
        print!("{}", serde_yaml::to_string(&display_config)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags_are_optional() {
        let cli = Cli::try_parse_from(["rto", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Commands::Serve {
                port, host, database, ..
            } => {
                assert_eq!(port, Some(9000));
                assert!(host.is_none());
                assert!(database.is_none());
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_output_format() {
        let cli = Cli::try_parse_from(["rto", "--format", "JSON", "config"]).unwrap();
        assert!(cli.format == OutputFormat::Json);
        assert!(Cli::try_parse_from(["rto", "--format", "xml", "config"]).is_err());
    }

    #[test]
    fn test_missing_default_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let config = load_config(&path, false, false).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(load_config(&path, true, false).is_err());
    }
}
