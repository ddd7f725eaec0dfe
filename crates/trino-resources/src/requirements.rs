//! Desired and observed resource requirements.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A resource quantity as supplied by the operator: `"2Gi"`, `1`, `0.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Int(i) => write!(f, "{i}"),
            Quantity::Float(x) => write!(f, "{x}"),
            Quantity::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity::Text(s.to_string())
    }
}

impl From<i64> for Quantity {
    fn from(i: i64) -> Self {
        Quantity::Int(i)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitsRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<Quantity>,
}

impl LimitsRequests {
    pub fn new(limits: impl Into<Quantity>, requests: impl Into<Quantity>) -> Self {
        Self {
            limits: Some(limits.into()),
            requests: Some(requests.into()),
        }
    }
}

/// Desired resources of one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<LimitsRequests>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<LimitsRequests>,
}

/// Desired resources keyed by container name.
pub type ResourceUpdates = BTreeMap<String, ResourceSpec>;

/// Resource requirements as held by the orchestrator: every quantity is a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

/// The part of a statefulset this crate reads and patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatefulSet {
    pub name: String,
    pub containers: Vec<Container>,
}

const RESOURCE_TYPES: [&str; 2] = ["memory", "cpu"];

fn resource<'a>(spec: &'a ResourceSpec, kind: &str) -> Option<&'a LimitsRequests> {
    match kind {
        "memory" => spec.memory.as_ref(),
        "cpu" => spec.cpu.as_ref(),
        _ => None,
    }
}

/// Rendered quantity; empty values count as unset.
fn rendered(quantity: Option<&Quantity>) -> Option<String> {
    quantity.map(Quantity::to_string).filter(|s| !s.is_empty())
}

/// Convert a desired spec into orchestrator requirements, skipping unset values.
pub fn build_resource_requirements(spec: &ResourceSpec) -> ResourceRequirements {
    let mut requirements = ResourceRequirements::default();
    for kind in RESOURCE_TYPES {
        let Some(values) = resource(spec, kind) else {
            continue;
        };
        if let Some(limit) = rendered(values.limits.as_ref()) {
            requirements.limits.insert(kind.to_string(), limit);
        }
        if let Some(request) = rendered(values.requests.as_ref()) {
            requirements.requests.insert(kind.to_string(), request);
        }
    }
    requirements
}

/// Whether the observed requirements already match the desired spec.
///
/// Compares memory limit, memory request, cpu limit and cpu request, each
/// as a string quantity.
pub fn is_patched(observed: &ResourceRequirements, desired: &ResourceSpec) -> bool {
    RESOURCE_TYPES.iter().all(|kind| {
        let values = resource(desired, kind);
        let limit = rendered(values.and_then(|v| v.limits.as_ref()));
        let request = rendered(values.and_then(|v| v.requests.as_ref()));
        observed.limits.get(*kind) == limit.as_ref()
            && observed.requests.get(*kind) == request.as_ref()
    })
}
