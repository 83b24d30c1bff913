use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::error::{ArtifactError, ContractError, FieldPath};
use crate::types::ArtifactType;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Producer {
    pub component: String,
    pub output: String,
}

impl fmt::Display for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.output)
    }
}

pub type ChannelRef = Arc<Channel>;

/// Typed connection between one producing output and any number of
/// consuming inputs. Identity is the channel id, never its contents.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    type_name: ArtifactType,
    producer: OnceLock<Producer>,
    artifacts: RwLock<Vec<Arc<Artifact>>>,
}

impl Channel {
    pub fn new(type_name: ArtifactType) -> ChannelRef {
        Arc::new(Self {
            id: ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)),
            type_name,
            producer: OnceLock::new(),
            artifacts: RwLock::new(Vec::new()),
        })
    }

    pub fn with_artifacts(
        type_name: ArtifactType,
        artifacts: Vec<Arc<Artifact>>,
    ) -> Result<ChannelRef, ContractError> {
        let channel = Self::new(type_name);
        channel.bind(artifacts)?;
        Ok(channel)
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn type_name(&self) -> &ArtifactType {
        &self.type_name
    }

    pub fn producer(&self) -> Option<&Producer> {
        self.producer.get()
    }

    pub(crate) fn claim_producer(&self, producer: Producer) -> Result<(), ContractError> {
        self.producer
            .set(producer)
            .map_err(|_| ContractError::ChannelAlreadyProduced {
                channel: self.id,
                producer: self
                    .producer
                    .get()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            })
    }

    /// Replaces the held artifacts. Nothing changes if any artifact has the
    /// wrong type.
    pub fn bind(&self, artifacts: Vec<Arc<Artifact>>) -> Result<(), ContractError> {
        self.check_types(&artifacts)?;
        *self
            .artifacts
            .write()
            .unwrap_or_else(PoisonError::into_inner) = artifacts;
        Ok(())
    }

    fn check_types(&self, artifacts: &[Arc<Artifact>]) -> Result<(), ContractError> {
        match artifacts
            .iter()
            .find(|artifact| artifact.type_name() != &self.type_name)
        {
            Some(bad) => Err(ContractError::type_mismatch(
                FieldPath::new(None, self.id.to_string()),
                self.type_name.name(),
                bad.type_name().name(),
            )),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All held artifacts, in bind order. Fan-in consumers use this.
    pub fn get_all(&self) -> Vec<Arc<Artifact>> {
        self.artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get_single(&self) -> Result<Arc<Artifact>, ContractError> {
        let guard = self
            .artifacts
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_slice() {
            [only] => Ok(only.clone()),
            other => Err(ContractError::Cardinality {
                type_name: self.type_name.name().to_string(),
                count: other.len(),
            }),
        }
    }

    pub fn get_single_uri(&self) -> anyhow::Result<String> {
        Ok(self.get_single()?.require_uri()?)
    }

    /// Location of `split` inside the one artifact that declares it.
    pub fn get_split_uri(&self, split: &str) -> anyhow::Result<String> {
        let matching: Vec<_> = self
            .get_all()
            .into_iter()
            .filter(|artifact| artifact.split_names().iter().any(|s| s == split))
            .collect();
        let [artifact] = matching.as_slice() else {
            return Err(ArtifactError::SplitNotFound {
                split: split.to_string(),
                found: matching.len(),
            }
            .into());
        };
        let base = artifact.require_uri()?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), split))
    }
}

/// Artifacts bound to channels during a single run.
///
/// Pipeline channels are shared between runs and are never written while a
/// run executes. Each run seeds its own bindings from the pipeline inputs,
/// resolves component inputs from them and publishes outputs into them.
#[derive(Debug, Default, Clone)]
pub struct RunBindings {
    artifacts: HashMap<ChannelId, Vec<Arc<Artifact>>>,
}

impl RunBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from whatever the given channels hold, typically the declared
    /// inputs of a pipeline.
    pub fn seeded(channels: &[ChannelRef]) -> Self {
        let artifacts = channels
            .iter()
            .map(|channel| (channel.id(), channel.get_all()))
            .collect();
        Self { artifacts }
    }

    /// Replaces what `channel` holds in this run, with the same type check
    /// as [`Channel::bind`].
    pub fn bind(
        &mut self,
        channel: &Channel,
        artifacts: Vec<Arc<Artifact>>,
    ) -> Result<(), ContractError> {
        channel.check_types(&artifacts)?;
        self.artifacts.insert(channel.id(), artifacts);
        Ok(())
    }

    /// `None` until something has been bound for `channel` in this run.
    pub fn get(&self, channel: &Channel) -> Option<&[Arc<Artifact>]> {
        self.artifacts.get(&channel.id()).map(Vec::as_slice)
    }

    pub fn get_single(&self, channel: &Channel) -> Result<Arc<Artifact>, ContractError> {
        match self.get(channel).unwrap_or_default() {
            [only] => Ok(only.clone()),
            other => Err(ContractError::Cardinality {
                type_name: channel.type_name().name().to_string(),
                count: other.len(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
