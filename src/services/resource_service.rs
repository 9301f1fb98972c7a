// ============================================================================
// ARBRE DES RESSOURCES
// ============================================================================
//
// resources/{cours|td}/{year3|year4|year5}/{module}/{pushKey} -> Resource
//
// Un module sans ressource n'existerait pas dans l'arbre (les objets vides
// disparaissent) : il porte alors le marqueur `_placeholder: true`.
// Invariant : un module contient toujours au moins une ressource ou le marqueur.
//   - ajout     : écrire la ressource, PUIS retirer le marqueur
//   - retrait   : poser le marqueur si c'était la dernière, PUIS supprimer
//
// ============================================================================

use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::LocalCache;
use crate::error::{AppError, AppResult};
use crate::models::resource::{
    AcademicYear, ModulePath, ModuleSummary, PLACEHOLDER_KEY, Resource, ResourceKind, ResourcePath,
    ResourcePayload, ResourceSize, year_path,
};
use crate::storage::ObjectStore;
use crate::store::TreeStore;
use crate::utils::clock::now_iso;
use crate::utils::sanitize::{format_size, sanitize_module_name};

pub const PUBLIC_CACHE_PREFIX: &str = "public:";
const MODULE_NAME_MAX_LEN: usize = 100;

/// Fichier déjà déposé dans le stockage objet, en attente de ses métadonnées
#[derive(Debug, Clone)]
pub struct NewFileResource {
    /// Clé réservée via `next_key`, aussi présente dans `storage_key`
    pub key: String,
    pub description: String,
    pub storage_key: String,
    pub file_type: String,
    pub size_bytes: u64,
    pub url: String,
}

pub struct ResourceService {
    store: Arc<dyn TreeStore>,
    objects: Arc<dyn ObjectStore>,
    cache: Arc<LocalCache>,
}

impl ResourceService {
    pub fn new(store: Arc<dyn TreeStore>, objects: Arc<dyn ObjectStore>, cache: Arc<LocalCache>) -> Self {
        Self { store, objects, cache }
    }

    /// Réserve une clé de ressource ordonnée dans le temps
    pub fn next_key(&self) -> String {
        self.store.push_key()
    }

    fn invalidate(&self) {
        self.cache.clear_prefix(PUBLIC_CACHE_PREFIX);
    }

    pub async fn list_modules(&self, kind: ResourceKind, year: AcademicYear) -> AppResult<Vec<ModuleSummary>> {
        let Some(Value::Object(modules)) = self.store.read(&year_path(kind, year)).await? else {
            return Ok(Vec::new());
        };

        Ok(modules
            .iter()
            .filter(|(name, _)| name.as_str() != PLACEHOLDER_KEY)
            .map(|(name, content)| summarize(name, content))
            .collect())
    }

    async fn module_names(&self, kind: ResourceKind, year: AcademicYear) -> AppResult<Vec<String>> {
        Ok(self
            .store
            .list_children(&year_path(kind, year))
            .await?
            .into_iter()
            .filter(|name| name != PLACEHOLDER_KEY)
            .collect())
    }

    pub async fn module_exists(&self, module: &ModulePath) -> AppResult<bool> {
        Ok(!self.store.list_children(&module.tree_path()).await?.is_empty())
    }

    pub async fn create_module(&self, kind: ResourceKind, year: AcademicYear, raw_name: &str) -> AppResult<ModuleSummary> {
        let name = validate_module_name(raw_name)?;
        if self.module_names(kind, year).await?.contains(&name) {
            return Err(AppError::validation(format!("A module named '{}' already exists", name)));
        }

        let module = ModulePath::new(kind, year, name.clone());
        self.store.write(&module.placeholder_path(), Value::Bool(true)).await?;
        self.invalidate();

        info!("📁 Module created: {}", module.tree_path());
        Ok(ModuleSummary {
            name,
            file_count: 0,
            last_resource_at: None,
        })
    }

    /// Renommage = copie du sous-arbre puis suppression de l'ancien.
    /// Si la suppression échoue, la copie est retirée et l'erreur remontée.
    pub async fn rename_module(
        &self,
        kind: ResourceKind,
        year: AcademicYear,
        old_name: &str,
        raw_new_name: &str,
    ) -> AppResult<ModuleSummary> {
        let new_name = validate_module_name(raw_new_name)?;
        let names = self.module_names(kind, year).await?;
        if !names.iter().any(|n| n == old_name) {
            return Err(AppError::not_found(format!("Module '{}' not found", old_name)));
        }
        if names.contains(&new_name) {
            return Err(AppError::validation(format!("A module named '{}' already exists", new_name)));
        }

        let source = ModulePath::new(kind, year, old_name);
        let target = ModulePath::new(kind, year, new_name.clone());
        let subtree = self
            .store
            .read(&source.tree_path())
            .await?
            .ok_or_else(|| AppError::not_found(format!("Module '{}' not found", old_name)))?;

        self.store.write(&target.tree_path(), subtree.clone()).await?;

        if let Err(e) = self.store.delete(&source.tree_path()).await {
            warn!("⚠️ Rename {} -> {} failed, rolling back copy: {}", old_name, new_name, e);
            if let Err(rollback) = self.store.delete(&target.tree_path()).await {
                warn!("⚠️ Rollback failed, both '{}' and '{}' exist: {}", old_name, new_name, rollback);
            }
            return Err(e);
        }

        self.invalidate();
        info!("📁 Module renamed: {} -> {}", source.tree_path(), target.tree_path());
        Ok(summarize(&new_name, &subtree))
    }

    /// Supprime le module et ses fichiers stockés (purge best-effort).
    /// Retourne le nombre de ressources supprimées.
    pub async fn delete_module(&self, kind: ResourceKind, year: AcademicYear, name: &str) -> AppResult<usize> {
        let module = ModulePath::new(kind, year, name);
        let content = self
            .store
            .read(&module.tree_path())
            .await?
            .ok_or_else(|| AppError::not_found(format!("Module '{}' not found", name)))?;

        let resources = parse_resources(&content);
        for resource in &resources {
            if let Some(location) = resource.location() {
                if let Err(e) = self.objects.delete(location).await {
                    warn!("⚠️ Could not purge stored file {}: {}", location, e);
                }
            }
        }

        self.store.delete(&module.tree_path()).await?;
        self.invalidate();

        info!("🗑️ Module deleted: {} ({} resources)", module.tree_path(), resources.len());
        Ok(resources.len())
    }

    /// Ressources valides d'un module ; les entrées malformées sont ignorées
    pub async fn list_resources(&self, module: &ModulePath) -> AppResult<Vec<Resource>> {
        let content = self
            .store
            .read(&module.tree_path())
            .await?
            .ok_or_else(|| AppError::not_found(format!("Module '{}' not found", module.module)))?;

        Ok(parse_resources(&content))
    }

    pub async fn get_resource(&self, path: &ResourcePath) -> AppResult<Resource> {
        if path.key == PLACEHOLDER_KEY {
            return Err(AppError::not_found("Resource not found"));
        }

        let value = self
            .store
            .read(&path.tree_path())
            .await?
            .ok_or_else(|| AppError::not_found("Resource not found"))?;

        serde_json::from_value(value).map_err(|e| {
            warn!("⚠️ Malformed resource {}: {}", path.tree_path(), e);
            AppError::not_found("Resource not found")
        })
    }

    pub async fn add_file_resource(&self, module: &ModulePath, file: NewFileResource) -> AppResult<Resource> {
        let resource = Resource {
            id: file.key,
            description: file.description,
            created_at: now_iso(),
            payload: ResourcePayload::File {
                file_type: file.file_type,
                location: file.storage_key,
                url: file.url,
                size: Some(ResourceSize::Formatted(format_size(file.size_bytes))),
            },
        };
        self.insert(module, resource).await
    }

    pub async fn add_link_resource(&self, module: &ModulePath, url: &str, description: &str) -> AppResult<Resource> {
        let url = validate_link(url)?;
        let description = description.trim();
        if description.is_empty() {
            return Err(AppError::validation("A description is required"));
        }

        let resource = Resource {
            id: self.next_key(),
            description: description.to_string(),
            created_at: now_iso(),
            payload: ResourcePayload::Link { url },
        };
        self.insert(module, resource).await
    }

    async fn insert(&self, module: &ModulePath, resource: Resource) -> AppResult<Resource> {
        if !self.module_exists(module).await? {
            return Err(AppError::not_found(format!("Module '{}' not found", module.module)));
        }

        let path = module.resource(resource.id.clone());
        self.store
            .write(&path.tree_path(), serde_json::to_value(&resource)?)
            .await?;
        self.prune_placeholder(module).await?;
        self.invalidate();

        info!("📄 Resource added: {}", path.tree_path());
        Ok(resource)
    }

    /// Supprime une ressource et son fichier stocké.
    /// Le marqueur est posé avant la suppression si c'était la dernière.
    pub async fn delete_resource(&self, path: &ResourcePath) -> AppResult<Resource> {
        let resource = self.get_resource(path).await?;
        let module = path.module_path();

        if let Some(location) = resource.location() {
            if let Err(e) = self.objects.delete(location).await {
                warn!("⚠️ Could not delete stored file {}: {}", location, e);
            }
        }

        let content = self.store.read(&module.tree_path()).await?.unwrap_or(Value::Null);
        let others = real_entries(&content).filter(|(key, _)| *key != &path.key).count();
        if others == 0 {
            // le module ne doit jamais se retrouver sans aucune entrée
            self.store.write(&module.placeholder_path(), Value::Bool(true)).await?;
            debug!("Placeholder set on {}", module.tree_path());
        }

        self.store.delete(&path.tree_path()).await?;
        self.invalidate();

        info!("🗑️ Resource deleted: {}", path.tree_path());
        Ok(resource)
    }

    /// Pose le marqueur si le module n'a aucune ressource réelle
    pub async fn ensure_non_empty(&self, module: &ModulePath) -> AppResult<()> {
        let content = self.store.read(&module.tree_path()).await?.unwrap_or(Value::Null);
        if real_entries(&content).next().is_none() {
            self.store.write(&module.placeholder_path(), Value::Bool(true)).await?;
            debug!("Placeholder set on {}", module.tree_path());
        }
        Ok(())
    }

    /// Retire le marqueur dès qu'une ressource réelle existe
    pub async fn prune_placeholder(&self, module: &ModulePath) -> AppResult<()> {
        let content = self.store.read(&module.tree_path()).await?.unwrap_or(Value::Null);
        let has_placeholder = content.get(PLACEHOLDER_KEY).is_some();
        if has_placeholder && real_entries(&content).next().is_some() {
            self.store.delete(&module.placeholder_path()).await?;
            debug!("Placeholder removed from {}", module.tree_path());
        }
        Ok(())
    }
}

/// Entrées portant un identifiant, marqueur exclu
pub(crate) fn real_entries(content: &Value) -> impl Iterator<Item = (&String, &Value)> {
    content
        .as_object()
        .into_iter()
        .flat_map(|map| map.iter())
        .filter(|(key, value)| {
            key.as_str() != PLACEHOLDER_KEY
                && value
                    .get("id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| !id.is_empty())
        })
}

pub(crate) fn parse_resources(content: &Value) -> Vec<Resource> {
    real_entries(content)
        .filter_map(|(key, value)| match serde_json::from_value::<Resource>(value.clone()) {
            Ok(resource) => Some(resource),
            Err(e) => {
                warn!("⚠️ Skipping malformed resource {}: {}", key, e);
                None
            }
        })
        .collect()
}

/// Nombre de ressources et date de la plus récente ; à égalité, la première rencontrée
fn summarize(name: &str, content: &Value) -> ModuleSummary {
    let mut file_count = 0;
    let mut last_resource_at: Option<String> = None;

    for (_, entry) in real_entries(content) {
        file_count += 1;
        if let Some(created_at) = entry.get("created_at").and_then(Value::as_str) {
            let newer = last_resource_at.as_deref().is_none_or(|last| created_at > last);
            if newer {
                last_resource_at = Some(created_at.to_string());
            }
        }
    }

    ModuleSummary {
        name: name.to_string(),
        file_count,
        last_resource_at,
    }
}

fn validate_module_name(raw: &str) -> AppResult<String> {
    let name = sanitize_module_name(raw);
    if name.is_empty() {
        return Err(AppError::validation("Module name is required"));
    }
    if name == PLACEHOLDER_KEY {
        return Err(AppError::validation("This module name is reserved"));
    }
    if name.chars().count() > MODULE_NAME_MAX_LEN {
        return Err(AppError::validation("Module name is too long"));
    }
    Ok(name)
}

fn validate_link(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|_| AppError::validation("Invalid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::validation("Only http and https links are allowed"));
    }
    Ok(trimmed.to_string())
}
