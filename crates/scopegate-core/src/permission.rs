//! ---
//! sg_section: "01-permission-model"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "Immutable hierarchical permission catalog."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
//! The catalog is built once from a definition tree (compiled in, or read
//! from TOML) and handed out behind an `Arc`. There is no mutation API.
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directive::PATH_SEPARATOR;
use crate::params;

/// Leaf segment marking a read permission.
pub const READ_SEGMENT: &str = "_read";

/// Leaf segment marking a write permission.
pub const WRITE_SEGMENT: &str = "_write";

/// Errors raised while building a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Two nodes resolved to the same identifier.
    #[error("duplicate permission identifier: {0}")]
    DuplicateIdentifier(String),
    /// A segment was empty, contained `:` or a control character.
    #[error("invalid permission segment {segment:?} under {parent:?}")]
    InvalidSegment {
        /// Path of the parent node (empty for roots).
        parent: String,
        /// Offending segment.
        segment: String,
    },
    /// A parameter name was empty or contained a control character.
    #[error("invalid parameter {parameter:?} on permission {path}")]
    InvalidParameter {
        /// Permission declaring the parameter.
        path: String,
        /// Offending parameter name.
        parameter: String,
    },
    /// TOML definition could not be parsed.
    #[error("invalid catalog definition: {0}")]
    Definition(#[from] toml::de::Error),
}

/// Definition-time description of one node, nested through `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    /// Single path segment, e.g. `users` or `_read`.
    pub segment: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
    /// Named placeholders this permission accepts.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Child definitions in display order.
    #[serde(default)]
    pub children: Vec<PermissionDefinition>,
}

impl PermissionDefinition {
    /// Leaf or branch with no parameters yet.
    pub fn new(segment: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            description: description.into(),
            parameters: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Declare accepted parameters.
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    /// Append a child definition.
    pub fn with_child(mut self, child: PermissionDefinition) -> Self {
        self.children.push(child);
        self
    }

    /// Append `_read` and `_write` leaves carrying this node's parameters.
    pub fn with_read_write(self, noun: &str) -> Self {
        let parameters = self.parameters.clone();
        self.with_child(
            PermissionDefinition::new(READ_SEGMENT, format!("Read {noun}"))
                .with_parameters(parameters.clone()),
        )
        .with_child(
            PermissionDefinition::new(WRITE_SEGMENT, format!("Modify {noun}"))
                .with_parameters(parameters),
        )
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default, rename = "permission")]
    permissions: Vec<PermissionDefinition>,
}

/// Node of the built catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionNode {
    path: String,
    description: String,
    parameters: Vec<String>,
    is_read: bool,
    is_write: bool,
    children: Vec<Arc<PermissionNode>>,
}

impl PermissionNode {
    /// Colon-separated path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Globally unique identifier; always equal to the path.
    pub fn identifier(&self) -> &str {
        &self.path
    }

    /// Description text.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Accepted parameter names in declaration order.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Whether `name` is an accepted parameter.
    pub fn accepts_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p == name)
    }

    /// Leaf segment is `_read`.
    pub fn is_read(&self) -> bool {
        self.is_read
    }

    /// Leaf segment is `_write`.
    pub fn is_write(&self) -> bool {
        self.is_write
    }

    /// Children in definition order; empty for leaves.
    pub fn children(&self) -> &[Arc<PermissionNode>] {
        &self.children
    }

    /// True when the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Immutable permission tree with an O(1) identifier index.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    roots: Vec<Arc<PermissionNode>>,
    nodes: Vec<Arc<PermissionNode>>,
    index: HashMap<String, Arc<PermissionNode>>,
}

impl PermissionCatalog {
    /// Build from definitions, failing on duplicate identifiers or bad segments.
    pub fn build(definitions: Vec<PermissionDefinition>) -> Result<Self, CatalogError> {
        let mut roots = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            roots.push(build_node("", definition)?);
        }

        let mut nodes = Vec::new();
        for root in &roots {
            flatten(root, &mut nodes);
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            if index
                .insert(node.identifier().to_owned(), Arc::clone(node))
                .is_some()
            {
                return Err(CatalogError::DuplicateIdentifier(
                    node.identifier().to_owned(),
                ));
            }
        }

        Ok(Self {
            roots,
            nodes,
            index,
        })
    }

    /// Build from a TOML document of `[[permission]]` tables.
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let document: CatalogDocument = toml::from_str(source)?;
        Self::build(document.permissions)
    }

    /// Catalog shipped with the engine.
    pub fn builtin() -> Self {
        Self::build(builtin_definitions()).expect("valid built-in permission catalog")
    }

    /// Look up a node by identifier.
    pub fn lookup(&self, identifier: &str) -> Option<&Arc<PermissionNode>> {
        self.index.get(identifier)
    }

    /// Whether `identifier` names a node.
    pub fn contains(&self, identifier: &str) -> bool {
        self.index.contains_key(identifier)
    }

    /// Top-level nodes.
    pub fn roots(&self) -> &[Arc<PermissionNode>] {
        &self.roots
    }

    /// Every node in pre-order.
    pub fn all_nodes(&self) -> &[Arc<PermissionNode>] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for a catalog without nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn build_node(
    parent: &str,
    definition: &PermissionDefinition,
) -> Result<Arc<PermissionNode>, CatalogError> {
    let segment = definition.segment.trim();
    if segment.is_empty()
        || segment.contains(PATH_SEPARATOR)
        || params::ensure_printable("segment", segment).is_err()
    {
        return Err(CatalogError::InvalidSegment {
            parent: parent.to_owned(),
            segment: definition.segment.clone(),
        });
    }
    let path = if parent.is_empty() {
        segment.to_owned()
    } else {
        format!("{parent}{PATH_SEPARATOR}{segment}")
    };

    for parameter in &definition.parameters {
        if parameter.trim().is_empty()
            || parameter.trim() != parameter
            || params::ensure_printable("parameter", parameter).is_err()
        {
            return Err(CatalogError::InvalidParameter {
                path,
                parameter: parameter.clone(),
            });
        }
    }

    let mut children = Vec::with_capacity(definition.children.len());
    for child in &definition.children {
        children.push(build_node(&path, child)?);
    }

    Ok(Arc::new(PermissionNode {
        is_read: segment == READ_SEGMENT,
        is_write: segment == WRITE_SEGMENT,
        description: definition.description.clone(),
        parameters: definition.parameters.clone(),
        path,
        children,
    }))
}

fn flatten(node: &Arc<PermissionNode>, out: &mut Vec<Arc<PermissionNode>>) {
    out.push(Arc::clone(node));
    for child in node.children() {
        flatten(child, out);
    }
}

fn builtin_definitions() -> Vec<PermissionDefinition> {
    vec![PermissionDefinition::new("api", "Application API")
        .with_child(
            PermissionDefinition::new("users", "User accounts")
                .with_parameters(["userId"])
                .with_read_write("user accounts"),
        )
        .with_child(
            PermissionDefinition::new("orgs", "Organisations")
                .with_parameters(["orgId"])
                .with_read_write("organisations")
                .with_child(
                    PermissionDefinition::new("members", "Organisation membership")
                        .with_parameters(["orgId"])
                        .with_read_write("organisation members"),
                ),
        )
        .with_child(
            PermissionDefinition::new("iam", "Identity and access management")
                .with_child(
                    PermissionDefinition::new("roles", "Role definitions")
                        .with_read_write("role definitions"),
                )
                .with_child(
                    PermissionDefinition::new("permissions", "Permission catalog")
                        .with_child(PermissionDefinition::new(
                            READ_SEGMENT,
                            "Read permission catalog",
                        )),
                )
                .with_child(
                    PermissionDefinition::new("grants", "Direct permission grants")
                        .with_parameters(["userId"])
                        .with_read_write("direct grants"),
                ),
        )
        .with_child(
            PermissionDefinition::new("audit", "Audit trail").with_child(
                PermissionDefinition::new(READ_SEGMENT, "Read audit trail"),
            ),
        )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_indexes_every_node() {
        let catalog = PermissionCatalog::builtin();
        assert_eq!(catalog.roots().len(), 1);
        assert_eq!(catalog.len(), catalog.all_nodes().len());
        for node in catalog.all_nodes() {
            assert_eq!(
                catalog.lookup(node.identifier()).map(|n| n.path()),
                Some(node.path())
            );
        }
        let read = catalog.lookup("api:users:_read").unwrap();
        assert!(read.is_read());
        assert!(!read.is_write());
        assert!(read.is_leaf());
        assert_eq!(read.parameters(), ["userId".to_string()]);
        assert!(catalog.lookup("api:iam:roles:_write").unwrap().is_write());
        assert!(catalog.lookup("api:nope").is_none());
    }

    #[test]
    fn children_keep_definition_order() {
        let catalog = PermissionCatalog::builtin();
        let api = catalog.lookup("api").unwrap();
        let segments: Vec<&str> = api.children().iter().map(|c| c.path()).collect();
        assert_eq!(segments, ["api:users", "api:orgs", "api:iam", "api:audit"]);
    }

    #[test]
    fn duplicate_identifiers_fail_fast() {
        let definitions = vec![
            PermissionDefinition::new("api", "").with_child(PermissionDefinition::new("x", "")),
            PermissionDefinition::new("api", ""),
        ];
        assert!(matches!(
            PermissionCatalog::build(definitions),
            Err(CatalogError::DuplicateIdentifier(id)) if id == "api"
        ));

        let siblings = vec![PermissionDefinition::new("api", "")
            .with_child(PermissionDefinition::new("x", ""))
            .with_child(PermissionDefinition::new("x", ""))];
        assert!(PermissionCatalog::build(siblings).is_err());
    }

    #[test]
    fn rejects_bad_segments() {
        let definitions = vec![PermissionDefinition::new("api:users", "")];
        assert!(matches!(
            PermissionCatalog::build(definitions),
            Err(CatalogError::InvalidSegment { .. })
        ));
        let definitions = vec![PermissionDefinition::new("api", "").with_parameters([""])];
        assert!(matches!(
            PermissionCatalog::build(definitions),
            Err(CatalogError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn loads_from_toml() {
        let source = r#"
            [[permission]]
            segment = "api"
            description = "API"

            [[permission.children]]
            segment = "reports"
            parameters = ["orgId"]

            [[permission.children.children]]
            segment = "_read"
            parameters = ["orgId"]
        "#;
        let catalog = PermissionCatalog::from_toml_str(source).unwrap();
        assert_eq!(catalog.len(), 3);
        let leaf = catalog.lookup("api:reports:_read").unwrap();
        assert!(leaf.is_read());
        assert!(leaf.accepts_parameter("orgId"));
    }
}
