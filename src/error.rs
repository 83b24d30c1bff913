use std::fmt;

use thiserror::Error;

use crate::artifact::ArtifactId;
use crate::channel::ChannelId;

/// Where a contract violation was found. `component` is `None` when the
/// check ran outside of a component (for example a bare `Channel::bind`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    pub component: Option<String>,
    pub field: String,
}

impl FieldPath {
    pub fn new(component: Option<&str>, field: impl Into<String>) -> Self {
        Self {
            component: component.map(str::to_string),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component {
            Some(component) => write!(f, "{component}.{}", self.field),
            None => f.write_str(&self.field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecViolation {
    Missing { section: &'static str },
    Unexpected { section: &'static str },
    IncompatibleParameter { expected: String, actual: String },
}

impl fmt::Display for SpecViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecViolation::Missing { section } => write!(f, "missing declared {section}"),
            SpecViolation::Unexpected { section } => write!(f, "undeclared {section} supplied"),
            SpecViolation::IncompatibleParameter { expected, actual } => write!(
                f,
                "parameter literal of type '{actual}' is not accepted where '{expected}' is declared"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("type mismatch at '{path}': expected '{expected}', got '{actual}'")]
    TypeMismatch {
        path: FieldPath,
        expected: String,
        actual: String,
    },
    #[error("channel of type '{type_name}' holds {count} artifact(s); expected exactly one")]
    Cardinality { type_name: String, count: usize },
    #[error("spec validation failed at '{path}': {violation}")]
    SpecValidation {
        path: FieldPath,
        violation: SpecViolation,
    },
    #[error("invalid component spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },
    #[error("unknown artifact type '{0}'")]
    UnknownType(String),
    #[error("invalid artifact type name '{0}'")]
    InvalidTypeName(String),
    #[error("invalid component name '{0}'")]
    InvalidComponentName(String),
    #[error("channel {channel} is already produced by '{producer}'")]
    ChannelAlreadyProduced { channel: ChannelId, producer: String },
}

impl ContractError {
    pub fn type_mismatch(
        path: FieldPath,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        ContractError::TypeMismatch {
            path,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("artifact {id} already has uri '{uri}'")]
    UriAlreadySet { id: ArtifactId, uri: String },
    #[error("artifact {0} is populated; its properties are read-only")]
    Sealed(ArtifactId),
    #[error("artifact {0} has no uri yet")]
    Unpopulated(ArtifactId),
    #[error(
        "split names must be alphanumeric (dashes and underscores allowed after the first character); got '{0}'"
    )]
    InvalidSplitName(String),
    #[error("expected exactly one artifact with split '{split}', found {found}")]
    SplitNotFound { split: String, found: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("component name '{0}' is used more than once")]
    DuplicateName(String),
    #[error(
        "input '{path}' reads channel {channel} of type '{type_name}', which is neither a pipeline input nor produced by a component in this pipeline"
    )]
    UnresolvedChannel {
        path: FieldPath,
        channel: ChannelId,
        type_name: String,
    },
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("external dependency failed: {0}")]
    External(String),
    #[error("component '{component}' left output '{output}' without a uri")]
    IncompleteOutput { component: String, output: String },
    #[error("component '{component}' input '{input}' has no populated artifact in this run")]
    UnpopulatedInput { component: String, input: String },
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Contract(#[from] ContractError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExecutionError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ExecutionError::Io {
            context: context.into(),
            source,
        }
    }
}
