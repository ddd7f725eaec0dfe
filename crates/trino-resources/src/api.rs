//! Orchestrator access for statefulsets.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{PatchError, PatchResult};
use crate::requirements::StatefulSet;

/// Read and merge-patch statefulsets.
pub trait StatefulSetApi: Send + Sync {
    fn get(&self, name: &str) -> PatchResult<StatefulSet>;

    /// Submit `statefulset` as a merge patch.
    fn patch(&self, name: &str, statefulset: &StatefulSet) -> PatchResult<()>;
}

/// Statefulsets stored as `<dir>/<name>.json`, for local operation.
#[derive(Debug, Clone)]
pub struct FileStatefulSetApi {
    dir: PathBuf,
}

impl FileStatefulSetApi {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl StatefulSetApi for FileStatefulSetApi {
    fn get(&self, name: &str) -> PatchResult<StatefulSet> {
        let path = self.path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PatchError::NotFound(name.to_string()));
            }
            Err(e) => return Err(PatchError::Io(e.to_string())),
        };
        serde_json::from_str(&content).map_err(|e| PatchError::Serialize(e.to_string()))
    }

    fn patch(&self, name: &str, statefulset: &StatefulSet) -> PatchResult<()> {
        let path = self.path(name);
        if !path.exists() {
            return Err(PatchError::NotFound(name.to_string()));
        }
        let content = serde_json::to_string_pretty(statefulset)
            .map_err(|e| PatchError::Serialize(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| PatchError::Io(e.to_string()))?;
        debug!(?path, "statefulset written");
        Ok(())
    }
}

/// In-memory statefulsets that count patch calls; used in tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStatefulSetApi {
    sets: Mutex<BTreeMap<String, StatefulSet>>,
    patches: Mutex<Vec<StatefulSet>>,
    fail_with: Mutex<Option<PatchError>>,
}

impl MemoryStatefulSetApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, statefulset: StatefulSet) {
        if let Ok(mut sets) = self.sets.lock() {
            sets.insert(statefulset.name.clone(), statefulset);
        }
    }

    /// Make every following call fail with `error`.
    pub fn fail_with(&self, error: PatchError) {
        if let Ok(mut slot) = self.fail_with.lock() {
            *slot = Some(error);
        }
    }

    /// Patches submitted so far, oldest first.
    pub fn patches(&self) -> Vec<StatefulSet> {
        self.patches.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn check_failure(&self) -> PatchResult<()> {
        match self.fail_with.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            },
            Err(e) => Err(PatchError::Api(e.to_string())),
        }
    }
}

impl StatefulSetApi for MemoryStatefulSetApi {
    fn get(&self, name: &str) -> PatchResult<StatefulSet> {
        self.check_failure()?;
        let sets = self.sets.lock().map_err(|e| PatchError::Api(e.to_string()))?;
        sets.get(name)
            .cloned()
            .ok_or_else(|| PatchError::NotFound(name.to_string()))
    }

    fn patch(&self, name: &str, statefulset: &StatefulSet) -> PatchResult<()> {
        self.check_failure()?;
        let mut sets = self.sets.lock().map_err(|e| PatchError::Api(e.to_string()))?;
        if !sets.contains_key(name) {
            return Err(PatchError::NotFound(name.to_string()));
        }
        sets.insert(name.to_string(), statefulset.clone());
        self.patches
            .lock()
            .map_err(|e| PatchError::Api(e.to_string()))?
            .push(statefulset.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirements::Container;

    fn statefulset() -> StatefulSet {
        StatefulSet {
            name: "trino".to_string(),
            containers: vec![Container {
                name: "trino".to_string(),
                resources: Default::default(),
            }],
        }
    }

    #[test]
    fn file_api_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let api = FileStatefulSetApi::new(dir.path());
        assert_eq!(
            api.get("trino").unwrap_err(),
            PatchError::NotFound("trino".to_string())
        );

        let set = statefulset();
        std::fs::write(
            dir.path().join("trino.json"),
            serde_json::to_string(&set).unwrap(),
        )
        .unwrap();
        let mut fetched = api.get("trino").unwrap();
        fetched.containers[0]
            .resources
            .limits
            .insert("memory".to_string(), "2Gi".to_string());
        api.patch("trino", &fetched).unwrap();
        assert_eq!(api.get("trino").unwrap(), fetched);
    }

    #[test]
    fn memory_api_records_patches() {
        let api = MemoryStatefulSetApi::new();
        api.insert(statefulset());
        api.patch("trino", &statefulset()).unwrap();
        assert_eq!(api.patches().len(), 1);
        assert!(matches!(
            api.patch("other", &statefulset()),
            Err(PatchError::NotFound(_))
        ));
    }
}
