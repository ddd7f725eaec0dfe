//! Patch-if-different for statefulset container resources.

use tracing::{debug, error, info};

use crate::api::StatefulSetApi;
use crate::error::PatchResult;
use crate::requirements::{ResourceUpdates, build_resource_requirements, is_patched};

/// Result of one patch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// Every listed container already matched; nothing was submitted.
    Unchanged,
    /// A patch was submitted touching these containers.
    Patched { containers: Vec<String> },
}

/// Bring the resources of the listed containers of `name` to `updates`.
///
/// Containers not named in `updates` are left untouched. API errors are
/// logged and returned so the caller's status reflects the failure.
pub fn patch_statefulset<A>(api: &A, name: &str, updates: &ResourceUpdates) -> PatchResult<PatchOutcome>
where
    A: StatefulSetApi + ?Sized,
{
    let result = try_patch(api, name, updates);
    if let Err(e) = &result {
        error!(statefulset = %name, error = %e, "failed to patch statefulset");
    }
    result
}

fn try_patch<A>(api: &A, name: &str, updates: &ResourceUpdates) -> PatchResult<PatchOutcome>
where
    A: StatefulSetApi + ?Sized,
{
    let mut statefulset = api.get(name)?;
    let mut changed = Vec::new();

    for container in &mut statefulset.containers {
        let Some(desired) = updates.get(&container.name) else {
            continue;
        };
        if is_patched(&container.resources, desired) {
            continue;
        }
        container.resources = build_resource_requirements(desired);
        changed.push(container.name.clone());
    }

    if changed.is_empty() {
        debug!(statefulset = %name, "no resource updates needed");
        return Ok(PatchOutcome::Unchanged);
    }

    api.patch(name, &statefulset)?;
    info!(statefulset = %name, containers = ?changed, "patched statefulset resources");
    Ok(PatchOutcome::Patched { containers: changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryStatefulSetApi;
    use crate::error::PatchError;
    use crate::requirements::{
        Container, LimitsRequests, ResourceRequirements, ResourceSpec, StatefulSet,
    };

    fn observed(mem: (&str, &str), cpu: (&str, &str)) -> ResourceRequirements {
        ResourceRequirements {
            limits: [
                ("memory".to_string(), mem.0.to_string()),
                ("cpu".to_string(), cpu.0.to_string()),
            ]
            .into_iter()
            .collect(),
            requests: [
                ("memory".to_string(), mem.1.to_string()),
                ("cpu".to_string(), cpu.1.to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn desired(mem: (&str, &str), cpu: (i64, i64)) -> ResourceSpec {
        ResourceSpec {
            memory: Some(LimitsRequests::new(mem.0, mem.1)),
            cpu: Some(LimitsRequests::new(cpu.0, cpu.1)),
        }
    }

    fn api_with(containers: Vec<Container>) -> MemoryStatefulSetApi {
        let api = MemoryStatefulSetApi::new();
        api.insert(StatefulSet {
            name: "trino-k8s".to_string(),
            containers,
        });
        api
    }

    #[test]
    fn memory_limit_difference_patches_only_that_container() {
        let api = api_with(vec![
            Container {
                name: "charm".to_string(),
                resources: observed(("2Gi", "1Gi"), ("1", "1")),
            },
            Container {
                name: "trino".to_string(),
                resources: observed(("1Gi", "1Gi"), ("1", "1")),
            },
        ]);
        let updates: ResourceUpdates = [
            ("charm".to_string(), desired(("2Gi", "1Gi"), (1, 1))),
            ("trino".to_string(), desired(("2Gi", "1Gi"), (1, 1))),
        ]
        .into_iter()
        .collect();

        let outcome = patch_statefulset(&api, "trino-k8s", &updates).unwrap();
        assert_eq!(
            outcome,
            PatchOutcome::Patched {
                containers: vec!["trino".to_string()]
            }
        );
        let patches = api.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].containers[1].resources.limits["memory"], "2Gi");
        assert_eq!(patches[0].containers[0].resources, observed(("2Gi", "1Gi"), ("1", "1")));

        // Second pass against the patched state is a no-op.
        let outcome = patch_statefulset(&api, "trino-k8s", &updates).unwrap();
        assert_eq!(outcome, PatchOutcome::Unchanged);
        assert_eq!(api.patches().len(), 1);
    }

    #[test]
    fn unlisted_containers_are_ignored() {
        let api = api_with(vec![Container {
            name: "sidecar".to_string(),
            resources: ResourceRequirements::default(),
        }]);
        let updates: ResourceUpdates =
            [("trino".to_string(), desired(("2Gi", "1Gi"), (1, 1)))].into_iter().collect();
        assert_eq!(
            patch_statefulset(&api, "trino-k8s", &updates).unwrap(),
            PatchOutcome::Unchanged
        );
        assert!(api.patches().is_empty());
    }

    #[test]
    fn api_errors_are_returned() {
        let api = api_with(vec![]);
        api.fail_with(PatchError::Api("quota exceeded".to_string()));
        let err = patch_statefulset(&api, "trino-k8s", &ResourceUpdates::new()).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn missing_statefulset_is_not_found() {
        let api = MemoryStatefulSetApi::new();
        let err = patch_statefulset(&api, "absent", &ResourceUpdates::new()).unwrap_err();
        assert_eq!(err, PatchError::NotFound("absent".to_string()));
        assert!(!err.is_transient());
    }
}
