//! ---
//! sg_section: "02-claim-codecs"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Compact `CODE;k=v` role claims carried by principals."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::{self, ParameterError, Parameters, SEGMENT_SEPARATOR};
use crate::role;

/// Claim type under which role claims travel in a token.
pub const ROLE_CLAIM_TYPE: &str = "role";

/// Reasons a role claim string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// Nothing before the first `;`.
    #[error("malformed role claim: empty role code")]
    EmptyCode,
    /// The code is not `[A-Z0-9_]` after uppercasing.
    #[error("malformed role claim: invalid role code {0:?}")]
    InvalidCode(String),
    /// A parameter segment failed validation.
    #[error("malformed role claim: {0}")]
    Parameter(#[from] ParameterError),
}

/// Role claim decoded from a principal. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedRoleClaim {
    /// Uppercase role code.
    pub code: String,
    /// Role parameter bindings, e.g. `userId=42`.
    #[serde(default)]
    pub parameters: Parameters,
}

impl ParsedRoleClaim {
    /// Decode `<CODE>[;<name>=<value>]*`, normalising the code to uppercase.
    pub fn try_parse(input: &str) -> Result<Self, ClaimError> {
        let mut segments = input.split(SEGMENT_SEPARATOR);
        let raw_code = segments.next().unwrap_or_default();
        params::ensure_printable("code", raw_code)?;
        let code = raw_code.trim();
        if code.is_empty() {
            return Err(ClaimError::EmptyCode);
        }
        let code = code.to_uppercase();
        if !role::is_valid_role_code(&code) {
            return Err(ClaimError::InvalidCode(code));
        }
        let parameters = params::parse_bindings(segments)?;
        Ok(Self { code, parameters })
    }

    /// Encode back to the wire form.
    pub fn format(&self) -> String {
        format_role_claim(&self.code, Some(&self.parameters))
    }
}

impl fmt::Display for ParsedRoleClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for ParsedRoleClaim {
    type Err = ClaimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s)
    }
}

/// Encode a role claim. `None` or empty parameters produce just the code.
pub fn format_role_claim(code: &str, parameters: Option<&Parameters>) -> String {
    let mut out = code.to_owned();
    if let Some(parameters) = parameters {
        params::write_bindings(&mut out, parameters);
    }
    out
}
