use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use super::{PushKeyGenerator, TreePath, TreeStore, assemble, flatten, is_within};
use crate::error::AppResult;

const EVENT_CAPACITY: usize = 256;

/// Arbre en mémoire : clé de feuille -> scalaire, trié par clé
pub struct MemoryTreeStore {
    leaves: RwLock<BTreeMap<String, Value>>,
    events: broadcast::Sender<TreePath>,
    keys: PushKeyGenerator,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            leaves: RwLock::new(BTreeMap::new()),
            events,
            keys: PushKeyGenerator::new(),
        }
    }

    fn remove_subtree(leaves: &mut BTreeMap<String, Value>, path: &TreePath) {
        let prefix = path.key();
        leaves.retain(|key, _| !is_within(&prefix, key));
    }

    fn replace(leaves: &mut BTreeMap<String, Value>, path: &TreePath, value: &Value) {
        Self::remove_subtree(leaves, path);
        // une feuille ancêtre serait masquée par le nouveau sous-arbre
        for ancestor in path.ancestor_keys() {
            leaves.remove(&ancestor);
        }

        let mut flat = Vec::new();
        flatten(path, value, &mut flat);
        leaves.extend(flat);
    }

    fn notify(&self, path: &TreePath) {
        // aucun abonné n'est pas une erreur
        let _ = self.events.send(path.clone());
    }
}

impl Default for MemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn read(&self, path: &TreePath) -> AppResult<Option<Value>> {
        let prefix = path.key();
        let leaves = self.leaves.read();
        let matching = leaves
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| is_within(&prefix, key))
            .map(|(key, value)| (key.clone(), value.clone()));

        Ok(assemble(path, matching))
    }

    async fn write(&self, path: &TreePath, value: Value) -> AppResult<()> {
        {
            let mut leaves = self.leaves.write();
            Self::replace(&mut leaves, path, &value);
        }
        self.notify(path);
        Ok(())
    }

    async fn delete(&self, path: &TreePath) -> AppResult<()> {
        {
            let mut leaves = self.leaves.write();
            Self::remove_subtree(&mut leaves, path);
        }
        self.notify(path);
        Ok(())
    }

    async fn update(&self, path: &TreePath, fields: Map<String, Value>) -> AppResult<()> {
        {
            let mut leaves = self.leaves.write();
            for (field, value) in &fields {
                Self::replace(&mut leaves, &path.child(field.clone()), value);
            }
        }
        self.notify(path);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TreePath> {
        self.events.subscribe()
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> TreePath {
        TreePath::parse(raw)
    }

    #[tokio::test]
    async fn test_write_then_read_subtree() {
        let store = MemoryTreeStore::new();
        store
            .write(&path("users/a"), json!({ "username": "ali", "isActive": true }))
            .await
            .unwrap();

        assert_eq!(
            store.read(&path("users")).await.unwrap(),
            Some(json!({ "a": { "username": "ali", "isActive": true } }))
        );
        assert_eq!(
            store.read(&path("users/a/username")).await.unwrap(),
            Some(json!("ali"))
        );
        assert_eq!(store.read(&path("users/b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_replaces_whole_subtree() {
        let store = MemoryTreeStore::new();
        store.write(&path("n"), json!({ "a": 1, "b": 2 })).await.unwrap();
        store.write(&path("n"), json!({ "c": 3 })).await.unwrap();

        assert_eq!(store.read(&path("n")).await.unwrap(), Some(json!({ "c": 3 })));
    }

    #[tokio::test]
    async fn test_empty_object_disappears() {
        let store = MemoryTreeStore::new();
        store.write(&path("resources/cours/year3/M"), json!({})).await.unwrap();

        assert_eq!(store.read(&path("resources/cours/year3")).await.unwrap(), None);
        assert!(store.list_children(&path("resources/cours/year3")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_and_null_removes() {
        let store = MemoryTreeStore::new();
        store
            .write(&path("users/a"), json!({ "username": "ali", "role": "student" }))
            .await
            .unwrap();

        let mut fields = Map::new();
        fields.insert("role".into(), json!("admin"));
        fields.insert("username".into(), Value::Null);
        store.update(&path("users/a"), fields).await.unwrap();

        assert_eq!(
            store.read(&path("users/a")).await.unwrap(),
            Some(json!({ "role": "admin" }))
        );
    }

    #[tokio::test]
    async fn test_write_below_scalar_replaces_it() {
        let store = MemoryTreeStore::new();
        store.write(&path("x"), json!(5)).await.unwrap();
        store.write(&path("x/y"), json!(true)).await.unwrap();

        assert_eq!(store.read(&path("x")).await.unwrap(), Some(json!({ "y": true })));
    }

    #[tokio::test]
    async fn test_sibling_with_common_prefix_is_untouched() {
        let store = MemoryTreeStore::new();
        store.write(&path("m/Mod"), json!({ "a": 1 })).await.unwrap();
        store.write(&path("m/Mod2"), json!({ "b": 2 })).await.unwrap();
        store.delete(&path("m/Mod")).await.unwrap();

        assert_eq!(store.list_children(&path("m")).await.unwrap(), vec!["Mod2".to_string()]);
    }

    #[tokio::test]
    async fn test_subscribers_receive_changed_paths() {
        let store = MemoryTreeStore::new();
        let mut rx = store.subscribe();

        store.write(&path("users/a"), json!({ "username": "ali" })).await.unwrap();
        store.delete(&path("users/a")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), path("users/a"));
        assert_eq!(rx.recv().await.unwrap(), path("users/a"));
    }
}
