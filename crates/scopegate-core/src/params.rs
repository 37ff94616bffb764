//! ---
//! sg_section: "02-claim-codecs"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Shared `name=value` segment grammar for directives and role claims."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
//! Both wire grammars (`allow|deny;path;k=v` and `CODE;k=v`) share the same
//! parameter rules, so they live here once.
use std::collections::BTreeMap;

use thiserror::Error;

/// Separator between tokens of a claim or directive string.
pub const SEGMENT_SEPARATOR: char = ';';

/// Separator between a parameter name and its value.
pub const BINDING_SEPARATOR: char = '=';

/// Parameter bindings keyed by name. `BTreeMap` keeps formatting canonical.
pub type Parameters = BTreeMap<String, String>;

/// Reasons a single `name=value` segment (or a bare token) is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    /// The segment carried no `=`.
    #[error("parameter segment {0:?} is missing '='")]
    MissingSeparator(String),
    /// The name before `=` was empty after trimming.
    #[error("parameter segment {0:?} has an empty name")]
    EmptyName(String),
    /// The value after `=` was empty after trimming.
    #[error("parameter {0:?} has an empty value")]
    EmptyValue(String),
    /// A token contained a control or otherwise non-printable character.
    #[error("{field} contains a non-printable character")]
    NonPrintable {
        /// Which token was rejected (`name`, `value`, `path`, `code`).
        field: &'static str,
    },
}

/// Reject tokens carrying control characters (newline, NUL, DEL, C1 controls).
pub fn ensure_printable(field: &'static str, token: &str) -> Result<(), ParameterError> {
    if token.chars().any(char::is_control) {
        return Err(ParameterError::NonPrintable { field });
    }
    Ok(())
}

/// Parse one `name=value` segment. Only the first `=` splits.
pub fn parse_binding(segment: &str) -> Result<(String, String), ParameterError> {
    let (name, value) = segment
        .split_once(BINDING_SEPARATOR)
        .ok_or_else(|| ParameterError::MissingSeparator(segment.trim().to_owned()))?;
    // Raw halves are checked; trimming would hide a trailing newline.
    ensure_printable("name", name)?;
    ensure_printable("value", value)?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() {
        return Err(ParameterError::EmptyName(segment.trim().to_owned()));
    }
    if value.is_empty() {
        return Err(ParameterError::EmptyValue(name.to_owned()));
    }
    Ok((name.to_owned(), value.to_owned()))
}

/// Parse the trailing parameter segments of a claim or directive.
///
/// Duplicate names resolve to the last occurrence.
pub fn parse_bindings<'a, I>(segments: I) -> Result<Parameters, ParameterError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parameters = Parameters::new();
    for segment in segments {
        let (name, value) = parse_binding(segment)?;
        parameters.insert(name, value);
    }
    Ok(parameters)
}

/// Append `;name=value` for every binding, sorted by name.
pub fn write_bindings(out: &mut String, parameters: &Parameters) {
    for (name, value) in parameters {
        out.push(SEGMENT_SEPARATOR);
        out.push_str(name);
        out.push(BINDING_SEPARATOR);
        out.push_str(value);
    }
}

/// True when `value` survives a format/parse cycle unchanged.
///
/// Used to refuse substituting values that would silently change meaning once
/// serialised (embedded `;`, surrounding whitespace, control characters).
pub fn is_wire_safe_value(value: &str) -> bool {
    !value.is_empty()
        && value.trim() == value
        && !value.contains(SEGMENT_SEPARATOR)
        && ensure_printable("value", value).is_ok()
}
