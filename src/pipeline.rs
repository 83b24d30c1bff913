use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::channel::{ChannelId, ChannelRef};
use crate::component::Component;
use crate::config::PipelineConfig;
use crate::error::{DagError, FieldPath};

/// A validated, acyclic set of components with a derived execution order.
///
/// Only `Pipeline::new` produces one, so a value of this type has always
/// passed name, wiring and cycle checks.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    config: PipelineConfig,
    inputs: Vec<ChannelRef>,
    components: Vec<Component>,
    edges: BTreeSet<(usize, usize)>,
    order: Vec<usize>,
}

impl Pipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            config: PipelineConfig::default(),
            inputs: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn new(
        name: impl Into<String>,
        components: Vec<Component>,
        inputs: Vec<ChannelRef>,
        config: PipelineConfig,
    ) -> Result<Self, DagError> {
        let name = name.into();

        let mut by_name = HashMap::with_capacity(components.len());
        for (idx, component) in components.iter().enumerate() {
            if by_name.insert(component.name(), idx).is_some() {
                return Err(DagError::DuplicateName(component.name().to_string()));
            }
        }

        let edges = derive_edges(&components, &inputs)?;
        let adjacency = adjacency(components.len(), &edges);

        if let Some(cycle) = find_cycle(&adjacency) {
            return Err(DagError::Cycle {
                cycle: cycle
                    .into_iter()
                    .map(|idx| components[idx].name().to_string())
                    .collect(),
            });
        }

        let order = topological_order(&adjacency);
        info!(
            pipeline = name.as_str(),
            components = components.len(),
            edges = edges.len(),
            "Pipeline assembled"
        );

        let pipeline = Self {
            name,
            config,
            inputs,
            components,
            edges,
            order,
        };
        for channel in pipeline.unused_inputs() {
            warn!(
                pipeline = pipeline.name.as_str(),
                channel = %channel.id(),
                type_name = channel.type_name().name(),
                "Pipeline input is not read by any component"
            );
        }
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn inputs(&self) -> &[ChannelRef] {
        &self.inputs
    }

    /// Components in the order they were supplied.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name() == name)
    }

    /// Components in a dependency-respecting order. Ties keep the order in
    /// which components were supplied.
    pub fn execution_order(&self) -> impl Iterator<Item = &Component> {
        self.order.iter().map(|&idx| &self.components[idx])
    }

    pub fn execution_order_names(&self) -> Vec<&str> {
        self.execution_order().map(Component::name).collect()
    }

    /// `(producer, consumer)` pairs by component name.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.edges
            .iter()
            .map(|&(from, to)| (self.components[from].name(), self.components[to].name()))
            .collect()
    }

    pub fn upstream(&self, name: &str) -> Vec<&str> {
        self.edges()
            .into_iter()
            .filter(|(_, to)| *to == name)
            .map(|(from, _)| from)
            .collect()
    }

    pub fn downstream(&self, name: &str) -> Vec<&str> {
        self.edges()
            .into_iter()
            .filter(|(from, _)| *from == name)
            .map(|(_, to)| to)
            .collect()
    }

    /// Declared pipeline inputs that no component reads.
    pub fn unused_inputs(&self) -> Vec<&ChannelRef> {
        let read: HashSet<ChannelId> = self
            .components
            .iter()
            .flat_map(|c| c.inputs().values().map(|ch| ch.id()))
            .collect();
        self.inputs
            .iter()
            .filter(|ch| !read.contains(&ch.id()))
            .collect()
    }
}

pub struct PipelineBuilder {
    name: String,
    config: PipelineConfig,
    inputs: Vec<ChannelRef>,
    components: Vec<Component>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn input(mut self, channel: &ChannelRef) -> Self {
        self.inputs.push(channel.clone());
        self
    }

    pub fn component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn build(self) -> Result<Pipeline, DagError> {
        Pipeline::new(self.name, self.components, self.inputs, self.config)
    }
}

fn derive_edges(
    components: &[Component],
    inputs: &[ChannelRef],
) -> Result<BTreeSet<(usize, usize)>, DagError> {
    let mut producers: HashMap<ChannelId, usize> = HashMap::new();
    for (idx, component) in components.iter().enumerate() {
        for channel in component.outputs().values() {
            producers.insert(channel.id(), idx);
        }
    }
    let declared: HashSet<ChannelId> = inputs.iter().map(|ch| ch.id()).collect();

    let mut edges = BTreeSet::new();
    for (idx, component) in components.iter().enumerate() {
        for (field, channel) in component.inputs() {
            if let Some(&producer) = producers.get(&channel.id()) {
                debug!(
                    from = components[producer].name(),
                    to = component.name(),
                    input = field.as_str(),
                    "Derived dependency"
                );
                edges.insert((producer, idx));
            } else if !declared.contains(&channel.id()) {
                return Err(DagError::UnresolvedChannel {
                    path: FieldPath::new(Some(component.name()), field),
                    channel: channel.id(),
                    type_name: channel.type_name().name().to_string(),
                });
            }
        }
    }
    Ok(edges)
}

fn adjacency(len: usize, edges: &BTreeSet<(usize, usize)>) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); len];
    for &(from, to) in edges {
        adjacency[from].push(to);
    }
    adjacency
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search with on-stack marking. Returns the first cycle found,
/// closed by repeating its first node. Uses an explicit stack of
/// `(node, next edge)` frames so pipeline depth is not bounded by the thread
/// stack.
fn find_cycle(adjacency: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for start in 0..adjacency.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::OnStack;
        stack.push((start, 0));

        while let Some(frame) = stack.last_mut() {
            let (node, edge) = *frame;
            let Some(&next) = adjacency[node].get(edge) else {
                marks[node] = Mark::Done;
                stack.pop();
                continue;
            };
            frame.1 += 1;
            match marks[next] {
                Mark::OnStack => {
                    let from = stack.iter().position(|&(n, _)| n == next).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[from..].iter().map(|&(n, _)| n).collect();
                    cycle.push(next);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    marks[next] = Mark::OnStack;
                    stack.push((next, 0));
                }
                Mark::Done => {}
            }
        }
    }
    None
}

/// Kahn's algorithm, always releasing the lowest-indexed ready node so the
/// result is deterministic. Assumes the graph is acyclic.
fn topological_order(adjacency: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree = vec![0usize; adjacency.len()];
    for targets in adjacency {
        for &to in targets {
            in_degree[to] += 1;
        }
    }
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| idx)
        .collect();

    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &to in &adjacency[node] {
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                ready.insert(to);
            }
        }
    }
    order
}

/// Component names grouped by the number of upstream hops from a source.
/// Components in the same layer have no dependency between them.
pub fn layers(pipeline: &Pipeline) -> BTreeMap<usize, Vec<&str>> {
    let mut depth: HashMap<&str, usize> = HashMap::new();
    for component in pipeline.execution_order() {
        let level = pipeline
            .upstream(component.name())
            .iter()
            .filter_map(|up| depth.get(up))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(component.name(), level);
    }
    let mut grouped: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for component in pipeline.execution_order() {
        grouped
            .entry(depth[component.name()])
            .or_default()
            .push(component.name());
    }
    grouped
}
