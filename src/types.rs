use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// Largest integer magnitude that survives a round trip through `f64`.
pub const MAX_EXACT_FLOAT_INT: i64 = 1 << 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Integer => "integer",
            ScalarType::Float => "float",
            ScalarType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::String(_) => ScalarType::String,
            ScalarValue::Integer(_) => ScalarType::Integer,
            ScalarValue::Float(_) => ScalarType::Float,
            ScalarValue::Boolean(_) => ScalarType::Boolean,
        }
    }

    /// Applies the coercion table: exact matches pass through, integers widen
    /// to floats while they stay exactly representable, nothing else converts.
    pub fn coerce_to(&self, declared: ScalarType) -> Option<ScalarValue> {
        match (self, declared) {
            (ScalarValue::String(_), ScalarType::String)
            | (ScalarValue::Integer(_), ScalarType::Integer)
            | (ScalarValue::Float(_), ScalarType::Float)
            | (ScalarValue::Boolean(_), ScalarType::Boolean) => Some(self.clone()),
            (ScalarValue::Integer(n), ScalarType::Float)
                if n.unsigned_abs() <= MAX_EXACT_FLOAT_INT.unsigned_abs() =>
            {
                Some(ScalarValue::Float(*n as f64))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::String(s) => f.write_str(s),
            ScalarValue::Integer(n) => write!(f, "{n}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Integer(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Integer(value.into())
    }
}

impl From<u32> for ScalarValue {
    fn from(value: u32) -> Self {
        ScalarValue::Integer(value.into())
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

pub type ParameterMap = BTreeMap<String, ScalarValue>;

/// A registered semantic artifact kind such as `Model` or `Dataset`.
///
/// Only a [`TypeRegistry`] hands these out, so every `ArtifactType` in
/// circulation is a recognized one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactType(Arc<str>);

impl ArtifactType {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Artifact(ArtifactType),
    Scalar(ScalarType),
}

impl TypeRef {
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Artifact(ty) => ty.name(),
            TypeRef::Scalar(ty) => ty.as_str(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<ArtifactType> for TypeRef {
    fn from(value: ArtifactType) -> Self {
        TypeRef::Artifact(value)
    }
}

impl From<&ArtifactType> for TypeRef {
    fn from(value: &ArtifactType) -> Self {
        TypeRef::Artifact(value.clone())
    }
}

impl From<ScalarType> for TypeRef {
    fn from(value: ScalarType) -> Self {
        TypeRef::Scalar(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, ArtifactType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` and returns its handle. Registering the same name
    /// again returns the handle already on file.
    pub fn register(&mut self, name: &str) -> Result<ArtifactType, ContractError> {
        if let Some(existing) = self.types.get(name) {
            return Ok(existing.clone());
        }
        if !is_valid_type_name(name) {
            return Err(ContractError::InvalidTypeName(name.to_string()));
        }
        let ty = ArtifactType(Arc::from(name));
        self.types.insert(name.to_string(), ty.clone());
        Ok(ty)
    }

    pub fn lookup(&self, name: &str) -> Result<ArtifactType, ContractError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| ContractError::UnknownType(name.to_string()))
    }

    /// Resolves a type name written in a recipe: scalar names first, then
    /// registered artifact types.
    pub fn resolve(&self, name: &str) -> Result<TypeRef, ContractError> {
        let scalar = match name {
            "string" => Some(ScalarType::String),
            "integer" => Some(ScalarType::Integer),
            "float" => Some(ScalarType::Float),
            "boolean" => Some(ScalarType::Boolean),
            _ => None,
        };
        match scalar {
            Some(ty) => Ok(TypeRef::Scalar(ty)),
            None => self.lookup(name).map(TypeRef::Artifact),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }
}

fn is_valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
