use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};
use validator::Validate;

use crate::cache::LocalCache;
use crate::error::{AppError, AppResult};
use crate::models::resource::seminars_path;
use crate::models::seminar::{NewSeminar, Seminar, SeminarView};
use crate::store::TreeStore;

pub const SEMINARS_CACHE_KEY: &str = "seminars:list";
const SEMINARS_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

pub struct SeminarService {
    store: Arc<dyn TreeStore>,
    cache: Arc<LocalCache>,
}

impl SeminarService {
    pub fn new(store: Arc<dyn TreeStore>, cache: Arc<LocalCache>) -> Self {
        Self { store, cache }
    }

    /// Séminaires du plus récent au plus ancien, mis en cache 10 minutes
    pub async fn list_seminars(&self) -> AppResult<Vec<Seminar>> {
        if let Some(cached) = self.cache.get::<Vec<Seminar>>(SEMINARS_CACHE_KEY) {
            return Ok(cached);
        }

        let mut seminars: Vec<Seminar> = match self.store.read(&seminars_path()).await? {
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter_map(|(key, value)| match serde_json::from_value::<Seminar>(value) {
                    Ok(mut seminar) => {
                        if seminar.id.is_empty() {
                            seminar.id = key;
                        }
                        Some(seminar)
                    }
                    Err(e) => {
                        warn!("⚠️ Skipping malformed seminar {}: {}", key, e);
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        };

        seminars.sort_by(|a, b| b.date.cmp(&a.date));
        self.cache.set(SEMINARS_CACHE_KEY, seminars.clone(), SEMINARS_CACHE_TTL);
        Ok(seminars)
    }

    pub async fn list_with_status(&self, today: NaiveDate) -> AppResult<Vec<SeminarView>> {
        Ok(self
            .list_seminars()
            .await?
            .into_iter()
            .map(|seminar| SeminarView {
                status: seminar.status_on(today),
                seminar,
            })
            .collect())
    }

    pub async fn add_seminar(&self, draft: NewSeminar) -> AppResult<Seminar> {
        draft
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        let id = self.store.push_key();
        let seminar = Seminar {
            id: id.clone(),
            seminar_type: draft.seminar_type.trim().to_string(),
            description: draft.description.trim().to_string(),
            date: draft.date,
            time: draft.time.trim().to_string(),
            location: draft.location.trim().to_string(),
            spot_count: draft.spot_count,
            registration_link: draft.registration_link.trim().to_string(),
        };

        self.store
            .write(&seminars_path().child(id), serde_json::to_value(&seminar)?)
            .await?;
        self.cache.clear(Some(SEMINARS_CACHE_KEY));

        info!("📅 Seminar added: {} on {}", seminar.seminar_type, seminar.date);
        Ok(seminar)
    }

    pub async fn delete_seminar(&self, id: &str) -> AppResult<()> {
        let path = seminars_path().child(id);
        if self.store.read(&path).await?.is_none() {
            return Err(AppError::not_found("Seminar not found"));
        }

        self.store.delete(&path).await?;
        self.cache.clear(Some(SEMINARS_CACHE_KEY));

        info!("🗑️ Seminar deleted: {}", id);
        Ok(())
    }
}
