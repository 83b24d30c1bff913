pub mod artifact;
pub mod channel;
pub mod component;
pub mod components;
pub mod config;
pub mod error;
pub mod executor;
pub mod observability;
pub mod pipeline;
pub mod plan;
pub mod recipe;
pub mod registry;
pub mod runner;
pub mod spec;
pub mod types;
pub mod validation;

pub use artifact::{Artifact, ArtifactMap};
pub use channel::{Channel, ChannelRef, RunBindings};
pub use component::Component;
pub use config::PipelineConfig;
pub use error::{ArtifactError, ContractError, DagError, ExecutionError};
pub use executor::Executor;
pub use pipeline::Pipeline;
pub use recipe::Recipe;
pub use registry::ComponentRegistry;
pub use spec::ComponentSpec;
pub use types::{ArtifactType, ParameterMap, ScalarType, ScalarValue, TypeRegistry};
