//! ---
//! sg_section: "07-cli"
//! sg_subsection: "binary"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Directive and claim codec subcommands."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use anyhow::{bail, Result};
use clap::{Args, Subcommand, ValueEnum};
use scopegate_core::claim::ParsedRoleClaim;
use scopegate_core::directive::{Effect, ScopeDirective};
use scopegate_core::params::{self, Parameters};

#[derive(Debug, Subcommand)]
pub enum DirectiveCommand {
    /// Decode a directive string and print it as JSON.
    Parse { value: String },
    /// Encode a directive from its parts.
    Format(DirectiveFormatArgs),
}

#[derive(Debug, Subcommand)]
pub enum ClaimCommand {
    /// Decode a role claim and print it as JSON.
    Parse { value: String },
    /// Encode a role claim from its parts.
    Format(ClaimFormatArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EffectArg {
    Allow,
    Deny,
}

impl From<EffectArg> for Effect {
    fn from(value: EffectArg) -> Self {
        match value {
            EffectArg::Allow => Effect::Allow,
            EffectArg::Deny => Effect::Deny,
        }
    }
}

#[derive(Debug, Args)]
pub struct DirectiveFormatArgs {
    #[arg(long, value_enum)]
    effect: EffectArg,
    /// Permission path, e.g. `api:users:_read`.
    #[arg(long)]
    path: String,
    /// Parameter binding `name=value`; repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ClaimFormatArgs {
    /// Role code.
    #[arg(long)]
    code: String,
    /// Parameter binding `name=value`; repeatable.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,
}

pub fn run_directive(command: DirectiveCommand) -> Result<()> {
    match command {
        DirectiveCommand::Parse { value } => {
            let directive = ScopeDirective::parse(&value)?;
            print_json(&serde_json::json!({
                "canonical": directive.format(),
                "directive": directive,
            }))
        }
        DirectiveCommand::Format(args) => {
            let directive = ScopeDirective {
                effect: args.effect.into(),
                permission_path: args.path,
                parameters: parse_params(&args.params)?,
            };
            let encoded = directive.format();
            if ScopeDirective::parse(&encoded)? != directive {
                bail!("directive cannot be represented on the wire: {encoded:?}");
            }
            println!("{encoded}");
            Ok(())
        }
    }
}

pub fn run_claim(command: ClaimCommand) -> Result<()> {
    match command {
        ClaimCommand::Parse { value } => {
            let claim = ParsedRoleClaim::try_parse(&value)?;
            print_json(&serde_json::json!({
                "canonical": claim.format(),
                "claim": claim,
            }))
        }
        ClaimCommand::Format(args) => {
            let claim = ParsedRoleClaim {
                code: args.code.trim().to_uppercase(),
                parameters: parse_params(&args.params)?,
            };
            let encoded = claim.format();
            if ParsedRoleClaim::try_parse(&encoded)? != claim {
                bail!("claim cannot be represented on the wire: {encoded:?}");
            }
            println!("{encoded}");
            Ok(())
        }
    }
}

/// `name=value` arguments into a parameter map.
pub fn parse_params(raw: &[String]) -> Result<Parameters> {
    let mut parameters = Parameters::new();
    for binding in raw {
        let (name, value) = params::parse_binding(binding)?;
        if !params::is_wire_safe_value(&value) {
            bail!("parameter {name} has a value that cannot be encoded: {value:?}");
        }
        parameters.insert(name, value);
    }
    Ok(parameters)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
