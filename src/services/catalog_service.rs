// Vues publiques en lecture : ressources récentes, index statique de secours, statistiques.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::LocalCache;
use crate::error::AppResult;
use crate::models::resource::{AcademicYear, PLACEHOLDER_KEY, Resource, ResourceKind, year_path};
use crate::services::resource_service::{PUBLIC_CACHE_PREFIX, parse_resources};
use crate::store::TreeStore;
use crate::utils::sanitize::format_size;

const PUBLIC_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Nombre d'éléments affichés sur la page d'accueil
pub const HOME_PREVIEW_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentResource {
    pub year: AcademicYear,
    pub module: String,
    #[serde(flatten)]
    pub resource: Resource,
}

/// Entrée de `{static_dir}/{kind}/index.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticEntry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "uploadedAt", default)]
    pub uploaded_at: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub ext: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", content = "items", rename_all = "lowercase")]
pub enum PublicListing {
    Live(Vec<RecentResource>),
    Static(Vec<StaticEntry>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindStats {
    pub files: usize,
    pub links: usize,
    pub size_bytes: u64,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortalStats {
    pub cours: KindStats,
    pub td: KindStats,
    pub total: KindStats,
}

pub struct CatalogService {
    store: Arc<dyn TreeStore>,
    cache: Arc<LocalCache>,
    static_dir: PathBuf,
}

impl CatalogService {
    pub fn new(store: Arc<dyn TreeStore>, cache: Arc<LocalCache>, static_dir: PathBuf) -> Self {
        Self {
            store,
            cache,
            static_dir,
        }
    }

    /// Toutes les ressources d'un type, de la plus récente à la plus ancienne (cache 5 min)
    pub async fn recent_resources(&self, kind: ResourceKind) -> AppResult<Vec<RecentResource>> {
        let cache_key = format!("{}{}", PUBLIC_CACHE_PREFIX, kind);
        if let Some(cached) = self.cache.get::<Vec<RecentResource>>(&cache_key) {
            return Ok(cached);
        }

        let mut items = Vec::new();
        for year in AcademicYear::ALL {
            let Some(Value::Object(modules)) = self.store.read(&year_path(kind, year)).await? else {
                continue;
            };
            for (module, content) in modules.iter().filter(|(name, _)| name.as_str() != PLACEHOLDER_KEY) {
                items.extend(parse_resources(content).into_iter().map(|resource| RecentResource {
                    year,
                    module: module.clone(),
                    resource,
                }));
            }
        }

        // tri stable : à date égale, l'ordre d'énumération est conservé
        items.sort_by(|a, b| b.resource.created_at.cmp(&a.resource.created_at));
        self.cache.set(cache_key, items.clone(), PUBLIC_CACHE_TTL);
        Ok(items)
    }

    /// Index statique publié avec le site ; absent ou illisible = liste vide
    pub async fn static_index(&self, kind: ResourceKind) -> Vec<StaticEntry> {
        let path = self.static_dir.join(kind.segment()).join("index.json");
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No static index at {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<StaticEntry>>(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("⚠️ Malformed static index {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Données vivantes pour une session authentifiée, index statique sinon
    /// (ou si la lecture vivante échoue)
    pub async fn public_listing(&self, kind: ResourceKind, authenticated: bool, limit: Option<usize>) -> PublicListing {
        let limit = limit.unwrap_or(usize::MAX);

        if authenticated {
            match self.recent_resources(kind).await {
                Ok(mut items) => {
                    items.truncate(limit);
                    return PublicListing::Live(items);
                }
                Err(e) => warn!("⚠️ Live listing for {} failed, serving static index: {}", kind, e),
            }
        }

        let mut entries = self.static_index(kind).await;
        entries.truncate(limit);
        PublicListing::Static(entries)
    }

    pub async fn stats(&self) -> AppResult<PortalStats> {
        let cours = kind_stats(&self.recent_resources(ResourceKind::Cours).await?);
        let td = kind_stats(&self.recent_resources(ResourceKind::Td).await?);

        let total_bytes = cours.size_bytes + td.size_bytes;
        let total = KindStats {
            files: cours.files + td.files,
            links: cours.links + td.links,
            size_bytes: total_bytes,
            size: format_size(total_bytes),
        };

        Ok(PortalStats { cours, td, total })
    }
}

fn kind_stats(items: &[RecentResource]) -> KindStats {
    let files = items.iter().filter(|item| item.resource.is_file()).count();
    let size_bytes = items.iter().map(|item| item.resource.size_bytes()).sum();

    KindStats {
        files,
        links: items.len() - files,
        size_bytes,
        size: format_size(size_bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTreeStore;
    use serde_json::json;

    async fn seeded() -> (CatalogService, Arc<MemoryTreeStore>, Arc<LocalCache>) {
        let store = Arc::new(MemoryTreeStore::new());
        store
            .write(
                &year_path(ResourceKind::Cours, AcademicYear::Year3),
                json!({
                    "Gestion": {
                        "-A": { "id": "-A", "type": "file", "file_type": "pdf", "location": "cours/year3/Gestion/a.pdf",
                                "url": "u", "size": "1 KB", "created_at": "2025-01-10T10:00:00.000Z" },
                        "-B": { "id": "-B", "type": "link", "url": "https://b", "created_at": "2025-03-01T10:00:00.000Z" }
                    },
                    "Vide": { "_placeholder": true }
                }),
            )
            .await
            .unwrap();
        store
            .write(
                &year_path(ResourceKind::Cours, AcademicYear::Year5),
                json!({
                    "Audit": {
                        "-C": { "id": "-C", "type": "file", "file_type": "pptx", "location": "cours/year5/Audit/c.pptx",
                                "url": "u", "size": 2048, "created_at": "2025-02-01T10:00:00.000Z" }
                    }
                }),
            )
            .await
            .unwrap();

        let cache = Arc::new(LocalCache::new());
        let dir = std::env::temp_dir().join("encg-portal-catalog-missing");
        (CatalogService::new(store.clone(), cache.clone(), dir), store, cache)
    }

    #[tokio::test]
    async fn test_recent_resources_newest_first_across_years() {
        let (catalog, _, _) = seeded().await;
        let items = catalog.recent_resources(ResourceKind::Cours).await.unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.resource.id.as_str()).collect();
        assert_eq!(ids, vec!["-B", "-C", "-A"]);
        assert_eq!(items[1].year, AcademicYear::Year5);
        assert_eq!(items[1].module, "Audit");
        assert!(catalog.recent_resources(ResourceKind::Td).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_resources_are_cached() {
        let (catalog, store, cache) = seeded().await;
        catalog.recent_resources(ResourceKind::Cours).await.unwrap();

        store.delete(&year_path(ResourceKind::Cours, AcademicYear::Year5)).await.unwrap();
        assert_eq!(catalog.recent_resources(ResourceKind::Cours).await.unwrap().len(), 3);

        cache.clear_prefix(PUBLIC_CACHE_PREFIX);
        assert_eq!(catalog.recent_resources(ResourceKind::Cours).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stats() {
        let (catalog, _, _) = seeded().await;
        let stats = catalog.stats().await.unwrap();

        assert_eq!(stats.cours.files, 2);
        assert_eq!(stats.cours.links, 1);
        assert_eq!(stats.cours.size_bytes, 3072);
        assert_eq!(stats.cours.size, "3 KB");
        assert_eq!(stats.td, KindStats { size: "0 B".into(), ..Default::default() });
        assert_eq!(stats.total.files, 2);
    }

    #[tokio::test]
    async fn test_anonymous_listing_uses_static_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("td")).unwrap();
        std::fs::write(
            dir.path().join("td").join("index.json"),
            r#"[{"name":"serie1.pdf","url":"/td/year3/serie1.pdf","size":10,"uploadedAt":"2024-10-01T00:00:00.000Z","year":"3eme","ext":"pdf"},
               {"name":"serie2.pdf","url":"/td/year3/serie2.pdf","size":20,"uploadedAt":"2024-09-01T00:00:00.000Z","year":"3eme","ext":"pdf"}]"#,
        )
        .unwrap();

        let catalog = CatalogService::new(Arc::new(MemoryTreeStore::new()), Arc::new(LocalCache::new()), dir.path().into());

        match catalog.public_listing(ResourceKind::Td, false, Some(1)).await {
            PublicListing::Static(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].name, "serie1.pdf");
            }
            other => panic!("expected static listing, got {:?}", other),
        }

        // pas d'index pour "cours" : liste vide, pas d'erreur
        assert!(matches!(
            catalog.public_listing(ResourceKind::Cours, false, None).await,
            PublicListing::Static(entries) if entries.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_authenticated_listing_is_live_and_limited() {
        let (catalog, _, _) = seeded().await;
        match catalog.public_listing(ResourceKind::Cours, true, Some(HOME_PREVIEW_LIMIT - 1)).await {
            PublicListing::Live(items) => assert_eq!(items.len(), 2),
            other => panic!("expected live listing, got {:?}", other),
        }
    }

    #[test]
    fn test_listing_serializes_with_source_tag() {
        let value = serde_json::to_value(PublicListing::Static(vec![])).unwrap();
        assert_eq!(value, json!({ "source": "static", "items": [] }));
    }
}
