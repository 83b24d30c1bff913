use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::channel::ChannelRef;
use crate::error::{ContractError, FieldPath, SpecViolation};
use crate::types::{ArtifactType, ParameterMap, ScalarType, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Input,
    Output,
    Parameter,
}

impl Section {
    fn as_str(&self) -> &'static str {
        match self {
            Section::Input => "input",
            Section::Output => "output",
            Section::Parameter => "parameter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub section: Section,
    pub ty: TypeRef,
}

/// Contract of a component kind: named, typed inputs, outputs and
/// parameters. Built once and shared by every instance of the kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    kind: String,
    inputs: Vec<FieldDescriptor>,
    outputs: Vec<FieldDescriptor>,
    parameters: Vec<FieldDescriptor>,
}

impl ComponentSpec {
    pub fn builder(kind: impl Into<String>) -> ComponentSpecBuilder {
        ComponentSpecBuilder {
            kind: kind.into(),
            fields: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn inputs(&self) -> &[FieldDescriptor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FieldDescriptor] {
        &self.outputs
    }

    pub fn parameters(&self) -> &[FieldDescriptor] {
        &self.parameters
    }

    pub fn output_type(&self, name: &str) -> Option<&ArtifactType> {
        self.outputs
            .iter()
            .find(|field| field.name == name)
            .and_then(|field| match &field.ty {
                TypeRef::Artifact(ty) => Some(ty),
                TypeRef::Scalar(_) => None,
            })
    }

    /// Checks a full set of bindings against the declaration and returns the
    /// parameters converted to their declared types.
    ///
    /// `component` only labels errors.
    pub fn validate(
        &self,
        component: Option<&str>,
        inputs: &BTreeMap<String, ChannelRef>,
        outputs: &BTreeMap<String, ChannelRef>,
        parameters: &ParameterMap,
    ) -> Result<ParameterMap, ContractError> {
        check_channels(component, &self.inputs, inputs, Section::Input)?;
        check_channels(component, &self.outputs, outputs, Section::Output)?;
        check_keys(component, &self.parameters, parameters, Section::Parameter)?;

        let mut resolved = ParameterMap::new();
        for field in &self.parameters {
            let &TypeRef::Scalar(declared) = &field.ty else {
                continue;
            };
            let value = &parameters[&field.name];
            let coerced = value.coerce_to(declared).ok_or_else(|| {
                ContractError::SpecValidation {
                    path: FieldPath::new(component, &field.name),
                    violation: SpecViolation::IncompatibleParameter {
                        expected: declared.to_string(),
                        actual: value.scalar_type().to_string(),
                    },
                }
            })?;
            resolved.insert(field.name.clone(), coerced);
        }
        Ok(resolved)
    }

    /// Stable digest of the declaration, used to detect contract drift
    /// between a plan and the code that runs it.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_bytes());
        for field in self.inputs.iter().chain(&self.outputs).chain(&self.parameters) {
            hasher.update([0u8]);
            hasher.update(field.section.as_str().as_bytes());
            hasher.update([b':']);
            hasher.update(field.name.as_bytes());
            hasher.update([b':']);
            hasher.update(field.ty.name().as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

fn check_keys<V>(
    component: Option<&str>,
    declared: &[FieldDescriptor],
    supplied: &BTreeMap<String, V>,
    section: Section,
) -> Result<(), ContractError> {
    if let Some(missing) = declared
        .iter()
        .find(|field| !supplied.contains_key(&field.name))
    {
        return Err(ContractError::SpecValidation {
            path: FieldPath::new(component, &missing.name),
            violation: SpecViolation::Missing {
                section: section.as_str(),
            },
        });
    }
    if let Some(extra) = supplied
        .keys()
        .find(|key| !declared.iter().any(|field| &field.name == *key))
    {
        return Err(ContractError::SpecValidation {
            path: FieldPath::new(component, extra),
            violation: SpecViolation::Unexpected {
                section: section.as_str(),
            },
        });
    }
    Ok(())
}

fn check_channels(
    component: Option<&str>,
    declared: &[FieldDescriptor],
    supplied: &BTreeMap<String, ChannelRef>,
    section: Section,
) -> Result<(), ContractError> {
    check_keys(component, declared, supplied, section)?;
    for field in declared {
        let channel = &supplied[&field.name];
        if field.ty.name() != channel.type_name().name() {
            return Err(ContractError::type_mismatch(
                FieldPath::new(component, &field.name),
                field.ty.name(),
                channel.type_name().name(),
            ));
        }
    }
    Ok(())
}

pub struct ComponentSpecBuilder {
    kind: String,
    fields: Vec<FieldDescriptor>,
}

impl ComponentSpecBuilder {
    pub fn input(mut self, name: impl Into<String>, ty: &ArtifactType) -> Self {
        self.push(name, Section::Input, TypeRef::from(ty));
        self
    }

    pub fn output(mut self, name: impl Into<String>, ty: &ArtifactType) -> Self {
        self.push(name, Section::Output, TypeRef::from(ty));
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, ty: ScalarType) -> Self {
        self.push(name, Section::Parameter, TypeRef::Scalar(ty));
        self
    }

    fn push(&mut self, name: impl Into<String>, section: Section, ty: TypeRef) {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            section,
            ty,
        });
    }

    pub fn build(self) -> Result<ComponentSpec, ContractError> {
        let invalid = |reason: String| ContractError::InvalidSpec {
            spec: self.kind.clone(),
            reason,
        };
        if self.kind.trim().is_empty() {
            return Err(invalid("component kind cannot be empty".into()));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(invalid(format!(
                    "{} names cannot be empty",
                    field.section.as_str()
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!(
                    "field '{}' is declared more than once",
                    field.name
                )));
            }
        }

        let take = |section: Section| -> Vec<FieldDescriptor> {
            self.fields
                .iter()
                .filter(|field| field.section == section)
                .cloned()
                .collect()
        };
        Ok(ComponentSpec {
            kind: self.kind.clone(),
            inputs: take(Section::Input),
            outputs: take(Section::Output),
            parameters: take(Section::Parameter),
        })
    }
}
