use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ArtifactError, ContractError};
use crate::types::{ArtifactType, ScalarValue, TypeRegistry};

pub const SPLIT_NAMES_PROPERTY: &str = "split_names";

static NEXT_ARTIFACT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(u64);

impl ArtifactId {
    fn next() -> Self {
        ArtifactId(NEXT_ARTIFACT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Properties = BTreeMap<String, ScalarValue>;

/// Typed reference to data living somewhere a storage collaborator
/// understands. The uri is written once; properties freeze with it.
#[derive(Debug)]
pub struct Artifact {
    id: ArtifactId,
    type_name: ArtifactType,
    staging_uri: Option<String>,
    uri: RwLock<Option<String>>,
    properties: RwLock<Properties>,
}

impl Artifact {
    pub fn placeholder(type_name: ArtifactType) -> Self {
        Self {
            id: ArtifactId::next(),
            type_name,
            staging_uri: None,
            uri: RwLock::new(None),
            properties: RwLock::new(Properties::new()),
        }
    }

    pub fn with_staging_uri(type_name: ArtifactType, staging_uri: impl Into<String>) -> Self {
        Self {
            staging_uri: Some(staging_uri.into()),
            ..Self::placeholder(type_name)
        }
    }

    /// An artifact that already exists in storage, e.g. a pipeline input.
    pub fn populated(
        type_name: ArtifactType,
        uri: impl Into<String>,
        properties: Properties,
    ) -> Self {
        Self {
            uri: RwLock::new(Some(uri.into())),
            properties: RwLock::new(properties),
            ..Self::placeholder(type_name)
        }
    }

    pub fn id(&self) -> ArtifactId {
        self.id
    }

    pub fn type_name(&self) -> &ArtifactType {
        &self.type_name
    }

    pub fn staging_uri(&self) -> Option<&str> {
        self.staging_uri.as_deref()
    }

    pub fn uri(&self) -> Option<String> {
        self.uri
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_populated(&self) -> bool {
        self.uri
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn require_uri(&self) -> Result<String, ArtifactError> {
        self.uri().ok_or(ArtifactError::Unpopulated(self.id))
    }

    pub fn set_uri(&self, uri: impl Into<String>) -> Result<(), ArtifactError> {
        let mut guard = self.uri.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = guard.as_ref() {
            return Err(ArtifactError::UriAlreadySet {
                id: self.id,
                uri: existing.clone(),
            });
        }
        *guard = Some(uri.into());
        Ok(())
    }

    /// Replaces a committed uri. Only re-runs that knowingly redo a
    /// component's work should reach for this.
    pub fn overwrite_uri(&self, uri: impl Into<String>) -> Option<String> {
        let uri = uri.into();
        let mut guard = self.uri.write().unwrap_or_else(PoisonError::into_inner);
        let previous = guard.replace(uri.clone());
        if let Some(old) = previous.as_deref() {
            warn!(artifact = %self.id, old, new = uri.as_str(), "Overwriting artifact uri");
        }
        previous
    }

    pub fn property(&self, name: &str) -> Option<ScalarValue> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn properties(&self) -> Properties {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_property(
        &self,
        name: impl Into<String>,
        value: impl Into<ScalarValue>,
    ) -> Result<(), ArtifactError> {
        // Hold the uri lock so a concurrent set_uri cannot slip in between.
        let uri = self.uri.read().unwrap_or_else(PoisonError::into_inner);
        if uri.is_some() {
            return Err(ArtifactError::Sealed(self.id));
        }
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
        Ok(())
    }

    pub fn set_split_names<S: AsRef<str>>(&self, splits: &[S]) -> Result<(), ArtifactError> {
        let encoded = encode_split_names(splits)?;
        self.set_property(SPLIT_NAMES_PROPERTY, encoded)
    }

    pub fn split_names(&self) -> Vec<String> {
        self.property(SPLIT_NAMES_PROPERTY)
            .and_then(|value| value.as_str().map(decode_split_names))
            .unwrap_or_default()
    }

    pub fn to_record(&self) -> ArtifactRecord {
        ArtifactRecord {
            type_name: self.type_name.name().to_string(),
            uri: self.uri(),
            properties: self.properties(),
        }
    }

    pub fn from_record(
        record: ArtifactRecord,
        types: &TypeRegistry,
    ) -> Result<Self, ContractError> {
        let type_name = types.lookup(&record.type_name)?;
        let artifact = Self::placeholder(type_name);
        *artifact
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner) = record.properties;
        *artifact.uri.write().unwrap_or_else(PoisonError::into_inner) = record.uri;
        Ok(artifact)
    }
}

pub fn encode_split_names<S: AsRef<str>>(splits: &[S]) -> Result<String, ArtifactError> {
    for split in splits {
        let split = split.as_ref();
        if !is_valid_split_name(split) {
            return Err(ArtifactError::InvalidSplitName(split.to_string()));
        }
    }
    Ok(splits
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(","))
}

pub fn decode_split_names(encoded: &str) -> Vec<String> {
    if encoded.is_empty() {
        return Vec::new();
    }
    encoded.split(',').map(str::to_string).collect()
}

fn is_valid_split_name(split: &str) -> bool {
    let mut chars = split.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Storage-facing shape of an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

pub type ArtifactMap = BTreeMap<String, Vec<Arc<Artifact>>>;

pub fn jsonify_artifact_map(map: &ArtifactMap) -> serde_json::Result<String> {
    let records: BTreeMap<&str, Vec<ArtifactRecord>> = map
        .iter()
        .map(|(name, artifacts)| {
            (
                name.as_str(),
                artifacts.iter().map(|a| a.to_record()).collect(),
            )
        })
        .collect();
    serde_json::to_string(&records)
}

pub fn parse_artifact_map(json: &str, types: &TypeRegistry) -> anyhow::Result<ArtifactMap> {
    let records: BTreeMap<String, Vec<ArtifactRecord>> = serde_json::from_str(json)?;
    let mut map = ArtifactMap::new();
    for (name, list) in records {
        let artifacts = list
            .into_iter()
            .map(|record| Artifact::from_record(record, types).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        map.insert(name, artifacts);
    }
    Ok(map)
}
