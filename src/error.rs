use serde::{Deserialize, Serialize};
use std::fmt;

/// A single provider attempt that did not produce a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// A parse or format failure attributed to one nested field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{path}: {message}")]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Every field error found in one transform pass, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(transparent)]
#[error("{}", join_fields(.0))]
pub struct TransformErrors(pub Vec<FieldError>);

impl TransformErrors {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![FieldError::new(path, message)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn extend(&mut self, other: TransformErrors) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Returns the error for `path`, if any.
    pub fn for_path(&self, path: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.path == path)
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while resolving, mapping or transforming contract data.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("no contract definition available for {address}: {}", join_causes(.causes))]
    DefinitionUnavailable {
        address: String,
        causes: Vec<ProviderFailure>,
    },
    #[error("proxy resolution for {address} is ambiguous: {reason}")]
    ProxyResolutionAmbiguous { address: String, reason: String },
    #[error("unsupported parameter type '{0}'")]
    UnsupportedParameterType(String),
    #[error("invalid value: {0}")]
    ValueTransformInvalid(#[from] TransformErrors),
    #[error("invalid contract definition: {0}")]
    InvalidDefinition(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("function '{function}' not found. Available functions: {available}")]
    FunctionNotFound { function: String, available: String },
    #[error("function '{0}' is read-only; call it as a query instead")]
    ReadOnlyFunction(String),
    #[error("function '{0}' modifies state; submit it through an execution strategy")]
    StateChangingFunction(String),
    #[error("no adapter for ecosystem '{0}'")]
    UnsupportedEcosystem(String),
    #[error("network error: {0}")]
    Network(String),
}

fn join_causes(causes: &[ProviderFailure]) -> String {
    if causes.is_empty() {
        return "no providers configured".to_string();
    }
    causes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;
