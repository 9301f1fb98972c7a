use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ObjectStore, validate_key};
use crate::error::AppResult;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<()> {
        validate_key(key)?;
        self.objects.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.objects.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;
        self.objects.write().remove(key);
        Ok(())
    }
}
