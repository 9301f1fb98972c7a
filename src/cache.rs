// Cache mémoire à durée de vie courte, partagé par tous les services.
// Expiration paresseuse : une entrée périmée est purgée à la lecture.
// Convention de clés par préfixe ("public:", "seminars:") pour éviter
// qu'une fonctionnalité invalide les entrées d'une autre.

use std::{
    any::Any,
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Default)]
pub struct LocalCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valeur typée si présente et non expirée
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock();
        let expired = entries.get(key)?.is_expired(Instant::now());
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key)?.value.downcast_ref::<T>().cloned()
    }

    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T, ttl: Duration) {
        self.entries.lock().insert(
            key.into(),
            Entry {
                value: Arc::new(value),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn has(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.remove(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// `None` vide tout le cache
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.lock();
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    pub fn clear_prefix(&self, prefix: &str) {
        self.entries.lock().retain(|key, _| !key.starts_with(prefix));
    }
}
