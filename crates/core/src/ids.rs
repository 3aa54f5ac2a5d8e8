#![forbid(unsafe_code)]

use std::fmt;

const MAX_NODE_ID_LEN: usize = 140;
const MAX_IDENTIFIER_LEN: usize = 64;

/// Opaque identifier of one hierarchy member.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, NodeIdError> {
        let value = value.into();
        validate_node_id(&value)?;
        Ok(Self(value))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeIdError {
    Empty,
    TooLong,
    ContainsControl,
}

impl NodeIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "node id must not be empty",
            Self::TooLong => "node id is too long",
            Self::ContainsControl => "node id contains control characters",
        }
    }
}

fn validate_node_id(value: &str) -> Result<(), NodeIdError> {
    if value.trim().is_empty() {
        return Err(NodeIdError::Empty);
    }
    if value.chars().count() > MAX_NODE_ID_LEN {
        return Err(NodeIdError::TooLong);
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(NodeIdError::ContainsControl);
    }
    Ok(())
}

/// A name that is safe to splice into SQL as a quoted identifier
/// (tree type / table name, parent column name).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        validate_identifier(&value)?;
        Ok(Self(value))
    }

    /// Prefixing a valid identifier with `[a-z_]+` keeps it valid.
    pub(crate) fn prefixed(&self, prefix: &str) -> Self {
        Self(format!("{prefix}{}", self.0))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentifierError {
    Empty,
    TooLong,
    InvalidFirstChar,
    InvalidChar { ch: char, index: usize },
}

impl IdentifierError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "identifier must not be empty",
            Self::TooLong => "identifier is too long",
            Self::InvalidFirstChar => "identifier must start with a letter or '_'",
            Self::InvalidChar { .. } => "identifier may only contain [A-Za-z0-9_]",
        }
    }
}

fn validate_identifier(value: &str) -> Result<(), IdentifierError> {
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(IdentifierError::Empty);
    };
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::TooLong);
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(IdentifierError::InvalidFirstChar);
    }
    for (index, ch) in value.chars().enumerate().skip(1) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            continue;
        }
        return Err(IdentifierError::InvalidChar { ch, index });
    }
    Ok(())
}
