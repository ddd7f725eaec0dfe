//! Container resource requirements derived from configuration.

use trino_core::CharmConfig;
use trino_core::literals::{CHARM_CONTAINER, WORKLOAD_CONTAINER};
use trino_resources::{LimitsRequests, Quantity, ResourceSpec, ResourceUpdates};

fn limits_requests(limits: &Option<String>, requests: &Option<String>) -> Option<LimitsRequests> {
    if limits.is_none() && requests.is_none() {
        return None;
    }
    Some(LimitsRequests {
        limits: limits.as_deref().map(Quantity::from),
        requests: requests.as_deref().map(Quantity::from),
    })
}

/// Desired resources per container.
///
/// The operator container always gets fixed values. The workload
/// container is only listed when at least one `workload-*` key is set,
/// so resources managed elsewhere are left alone by default.
pub fn resource_updates(config: &CharmConfig) -> ResourceUpdates {
    let mut updates = ResourceUpdates::new();
    updates.insert(
        CHARM_CONTAINER.to_string(),
        ResourceSpec {
            memory: Some(LimitsRequests::new("2Gi", "1Gi")),
            cpu: Some(LimitsRequests::new(1i64, 1i64)),
        },
    );

    let workload = ResourceSpec {
        memory: limits_requests(&config.workload_memory_limits, &config.workload_memory_requests),
        cpu: limits_requests(&config.workload_cpu_limits, &config.workload_cpu_requests),
    };
    if workload.memory.is_some() || workload.cpu.is_some() {
        updates.insert(WORKLOAD_CONTAINER.to_string(), workload);
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charm_container_always_listed() {
        let updates = resource_updates(&CharmConfig::default());
        assert_eq!(updates.len(), 1);
        let charm = &updates[CHARM_CONTAINER];
        assert_eq!(charm.memory, Some(LimitsRequests::new("2Gi", "1Gi")));
    }

    #[test]
    fn test_workload_from_config() {
        let config = CharmConfig {
            workload_memory_limits: Some("8Gi".into()),
            workload_cpu_requests: Some("2".into()),
            ..CharmConfig::default()
        };
        let updates = resource_updates(&config);
        let workload = &updates[WORKLOAD_CONTAINER];
        let memory = workload.memory.as_ref().unwrap();
        assert_eq!(memory.limits, Some(Quantity::from("8Gi")));
        assert_eq!(memory.requests, None);
        let cpu = workload.cpu.as_ref().unwrap();
        assert_eq!(cpu.requests, Some(Quantity::from("2")));
    }
}
