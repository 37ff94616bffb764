//! ---
//! sg_section: "07-cli"
//! sg_subsection: "binary"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Control CLI for administrators working with scopegate policies."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scopegate_common::config::{AppConfig, LoadedAppConfig};
use scopegate_common::logging::init_tracing;
use scopegate_logging as logging;

mod catalog;
mod check;
mod codec;
mod policy;

const DEFAULT_CONFIG_PATH: &str = "configs/scopegate.toml";

#[derive(Debug, Parser)]
#[command(author, version, about = "scopegate administrative control utility", long_about = None)]
struct Cli {
    /// Configuration file (defaults to SCOPEGATE_CONFIG or configs/scopegate.toml).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(subcommand, about = "Inspect the permission catalog")]
    Catalog(catalog::CatalogCommand),
    #[command(subcommand, about = "Parse or format scope directives")]
    Directive(codec::DirectiveCommand),
    #[command(subcommand, about = "Parse or format role claims")]
    Claim(codec::ClaimCommand),
    #[command(about = "Evaluate one authorization request against a policy fixture")]
    Check(check::CheckArgs),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Catalog(cmd) => catalog::run(cmd, &config)?,
        Commands::Directive(cmd) => codec::run_directive(cmd)?,
        Commands::Claim(cmd) => codec::run_claim(cmd)?,
        Commands::Check(args) => return check::run(args, &config),
    }
    Ok(ExitCode::SUCCESS)
}

/// Explicit or discovered configuration gets the production subscriber;
/// otherwise defaults apply with the development subscriber.
fn load_config(explicit: Option<&PathBuf>) -> Result<AppConfig> {
    let loaded = match explicit {
        Some(path) => Some(LoadedAppConfig {
            config: AppConfig::from_path(path)?,
            source: path.clone(),
        }),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            let env_override = std::env::var_os(AppConfig::ENV_CONFIG_PATH)
                .is_some_and(|value| !value.is_empty());
            if env_override || default.exists() {
                Some(AppConfig::load_with_source(&[default])?)
            } else {
                None
            }
        }
    };
    match loaded {
        Some(loaded) => {
            init_tracing("scopegatectl", &loaded.config.logging)?;
            tracing::debug!(source = %loaded.source.display(), "configuration loaded");
            Ok(loaded.config)
        }
        None => {
            logging::init();
            Ok(AppConfig::default())
        }
    }
}
