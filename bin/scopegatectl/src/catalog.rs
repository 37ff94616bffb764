//! ---
//! sg_section: "07-cli"
//! sg_subsection: "binary"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Catalog inspection subcommands."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use scopegate_common::config::AppConfig;
use scopegate_core::permission::PermissionCatalog;

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Print every permission with its parameters.
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Catalog definition file; overrides `authz.catalog`.
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,
    /// Emit JSON instead of a table.
    #[arg(long)]
    json: bool,
}

pub fn run(command: CatalogCommand, config: &AppConfig) -> Result<()> {
    match command {
        CatalogCommand::List(args) => {
            let path = args.catalog.as_deref().or(config.authz.catalog.as_deref());
            let catalog = load_catalog(path)?;
            if args.json {
                let nodes: Vec<_> = catalog
                    .all_nodes()
                    .iter()
                    .map(|node| {
                        serde_json::json!({
                            "identifier": node.identifier(),
                            "description": node.description(),
                            "parameters": node.parameters(),
                            "read": node.is_read(),
                            "write": node.is_write(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else {
                for node in catalog.all_nodes() {
                    let access = match (node.is_read(), node.is_write()) {
                        (true, _) => "read",
                        (_, true) => "write",
                        _ => "-",
                    };
                    println!(
                        "{:<32} {:<6} [{}] {}",
                        node.identifier(),
                        access,
                        node.parameters().join(","),
                        node.description()
                    );
                }
            }
            Ok(())
        }
    }
}

/// Catalog from `path`, or the built-in catalog.
pub fn load_catalog(path: Option<&Path>) -> Result<PermissionCatalog> {
    match path {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("unable to read catalog {}", path.display()))?;
            PermissionCatalog::from_toml_str(&source)
                .with_context(|| format!("invalid catalog {}", path.display()))
        }
        None => Ok(PermissionCatalog::builtin()),
    }
}
