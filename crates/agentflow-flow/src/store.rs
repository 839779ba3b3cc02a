use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use tracing::debug;

use agentflow_core::error::{AgentFlowError, Result};
use agentflow_core::flow::Flow;
use agentflow_core::traits::FlowStore;

/// Flows held in memory, keyed by id.
#[derive(Default)]
pub struct MemoryFlowStore {
    flows: RwLock<HashMap<String, Flow>>,
}

impl MemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, for setting up a store up front.
    pub fn with_flow(self, flow: Flow) -> Self {
        let mut flows = self.flows.into_inner();
        flows.insert(flow.id.clone(), flow);
        Self {
            flows: RwLock::new(flows),
        }
    }

    /// Insert or replace a flow. Returns the previous definition.
    pub async fn insert(&self, flow: Flow) -> Option<Flow> {
        self.flows.write().await.insert(flow.id.clone(), flow)
    }

    pub async fn remove(&self, id: &str) -> Option<Flow> {
        self.flows.write().await.remove(id)
    }
}

impl FlowStore for MemoryFlowStore {
    fn get_flow(&self, id: &str) -> BoxFuture<'_, Result<Option<Flow>>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.flows.read().await.get(&id).cloned()) })
    }
}

/// Flows stored as `<dir>/<id>.json`, read on every lookup.
pub struct JsonDirFlowStore {
    dir: PathBuf,
}

impl JsonDirFlowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `None` for ids that could escape the directory.
    fn path_for(&self, id: &str) -> Option<PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return None;
        }
        Some(self.dir.join(format!("{}.json", id)))
    }

    /// Ids of every `*.json` file in the directory, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl FlowStore for JsonDirFlowStore {
    fn get_flow(&self, id: &str) -> BoxFuture<'_, Result<Option<Flow>>> {
        let path = self.path_for(id);
        let id = id.to_string();
        Box::pin(async move {
            let Some(path) = path else {
                return Ok(None);
            };
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            debug!(flow_id = %id, path = %path.display(), "Loaded flow definition");
            let flow = Flow::from_json(&content).map_err(|e| AgentFlowError::InvalidFlow {
                flow: id.clone(),
                message: format!("{}: {}", path.display(), e),
            })?;
            if flow.id != id {
                return Err(AgentFlowError::InvalidFlow {
                    flow: id,
                    message: format!("{} declares id '{}'", path.display(), flow.id),
                });
            }
            Ok(Some(flow))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_test_utils::linear_flow;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryFlowStore::new().with_flow(linear_flow("a", &["echo"]));
        assert!(store.get_flow("a").await.unwrap().is_some());
        assert!(store.get_flow("b").await.unwrap().is_none());

        assert!(store.insert(linear_flow("b", &[])).await.is_none());
        assert!(store.get_flow("b").await.unwrap().is_some());
        assert!(store.remove("a").await.is_some());
        assert!(store.get_flow("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_dir_store() {
        let dir = tempfile::tempdir().unwrap();
        let flow = linear_flow("greet", &["echo"]);
        std::fs::write(dir.path().join("greet.json"), flow.to_json_pretty().unwrap()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = JsonDirFlowStore::new(dir.path());
        assert_eq!(store.get_flow("greet").await.unwrap(), Some(flow));
        assert!(store.get_flow("missing").await.unwrap().is_none());
        assert!(store.get_flow("../greet").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec!["greet"]);
    }

    #[tokio::test]
    async fn test_json_dir_store_rejects_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(
            dir.path().join("other.json"),
            linear_flow("renamed", &[]).to_json_pretty().unwrap(),
        )
        .unwrap();

        let store = JsonDirFlowStore::new(dir.path());
        assert!(matches!(
            store.get_flow("broken").await,
            Err(AgentFlowError::InvalidFlow { .. })
        ));
        let err = store.get_flow("other").await.unwrap_err();
        assert!(err.to_string().contains("renamed"));
    }
}
