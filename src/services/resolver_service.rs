// Résolution d'une ressource en URL ouvrable, téléchargement et dépôt de fichiers.
//
// Liens  : URL verbatim, ouverte telle quelle.
// Fichiers : URL de téléchargement authentifié, le token de rôle est joint
//            en `Authorization: Bearer` par le client.

use std::sync::Arc;

use reqwest::Url;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::resource::{ModulePath, Resource};
use crate::services::resource_service::{NewFileResource, ResourceService};
use crate::storage::{ObjectStore, content_type_for, extension_of, gateway::download_url};
use crate::utils::sanitize::sanitize_storage_name;

pub const ALLOWED_EXTENSIONS: [&str; 9] = ["pdf", "ppt", "pptx", "doc", "docx", "xls", "xlsx", "zip", "rar"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTarget {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer: Option<String>,
}

#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: &'static str,
}

#[derive(Debug)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub original_filename: String,
    pub descriptive_name: String,
}

pub struct ResolverService {
    objects: Arc<dyn ObjectStore>,
    resources: Arc<ResourceService>,
    public_base: Url,
    max_upload_bytes: u64,
}

impl ResolverService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        resources: Arc<ResourceService>,
        public_base_url: &str,
        max_upload_bytes: u64,
    ) -> AppResult<Self> {
        let public_base = Url::parse(public_base_url)
            .map_err(|e| AppError::validation(format!("Invalid PUBLIC_BASE_URL '{}': {}", public_base_url, e)))?;

        Ok(Self {
            objects,
            resources,
            public_base,
            max_upload_bytes,
        })
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    pub fn resolve(&self, resource: &Resource, role_token: &str) -> ResolvedTarget {
        match resource.location() {
            Some(location) => ResolvedTarget {
                url: download_url(&self.public_base, location).to_string(),
                bearer: Some(role_token.to_string()),
            },
            None => ResolvedTarget {
                url: resource.url().to_string(),
                bearer: None,
            },
        }
    }

    pub async fn download(&self, resource: &Resource) -> AppResult<Download> {
        let Some(location) = resource.location() else {
            return Err(AppError::validation("Links are opened directly, not downloaded"));
        };

        let bytes = self
            .objects
            .get(location)
            .await?
            .ok_or_else(|| AppError::not_found("Stored file not found"))?;

        let filename = suggested_filename(resource);
        let content_type = extension_of(&filename)
            .map(|ext| content_type_for(&ext))
            .unwrap_or("application/octet-stream");

        Ok(Download {
            bytes,
            filename,
            content_type,
        })
    }

    /// Dépôt d'un fichier puis écriture de ses métadonnées.
    ///
    /// 1. Valide extension, taille et nom (aucun effet de bord en cas d'erreur)
    /// 2. Dépose l'objet sous `{kind}/{year}/{module}/{nom}_{clé}.{ext}`
    /// 3. Écrit la ressource ; si cela échoue, l'objet est retiré (best-effort)
    pub async fn upload(&self, module: &ModulePath, upload: Upload) -> AppResult<Resource> {
        let ext = extension_of(&upload.original_filename)
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| {
                AppError::validation(format!(
                    "File type not allowed (accepted: {})",
                    ALLOWED_EXTENSIONS.join(", ")
                ))
            })?;

        if upload.bytes.is_empty() {
            return Err(AppError::validation("File is empty"));
        }
        let size_bytes = upload.bytes.len() as u64;
        if size_bytes > self.max_upload_bytes {
            return Err(AppError::validation(format!(
                "File too large (max {} MB)",
                self.max_upload_bytes / (1024 * 1024)
            )));
        }

        let description = upload.descriptive_name.trim().to_string();
        if description.is_empty() {
            return Err(AppError::validation("A file name is required"));
        }

        if !self.resources.module_exists(module).await? {
            return Err(AppError::not_found(format!("Module '{}' not found", module.module)));
        }

        let key = self.resources.next_key();
        let storage_key = format!(
            "{}/{}_{}.{}",
            module.storage_prefix(),
            sanitize_storage_name(&description),
            key,
            ext
        );

        self.objects.put(&storage_key, upload.bytes).await?;

        let draft = NewFileResource {
            key,
            description,
            url: download_url(&self.public_base, &storage_key).to_string(),
            storage_key: storage_key.clone(),
            file_type: ext,
            size_bytes,
        };

        match self.resources.add_file_resource(module, draft).await {
            Ok(resource) => {
                info!("📤 File uploaded: {} ({} bytes)", storage_key, size_bytes);
                Ok(resource)
            }
            Err(e) => {
                if let Err(cleanup) = self.objects.delete(&storage_key).await {
                    warn!("⚠️ Orphan object left at {}: {}", storage_key, cleanup);
                }
                Err(e)
            }
        }
    }
}

/// Nom proposé au téléchargement : description + extension du fichier stocké
pub fn suggested_filename(resource: &Resource) -> String {
    let location = resource.location().unwrap_or_default();
    let ext = resource
        .file_type()
        .map(|t| t.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .or_else(|| extension_of(location));

    let mut base: String = resource
        .description
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect();

    if base.is_empty() {
        let stored = location.rsplit('/').next().unwrap_or_default();
        base = match stored.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ if !stored.is_empty() => stored.to_string(),
            _ => resource.id.clone(),
        };
    }

    match ext {
        Some(ext) if !base.to_ascii_lowercase().ends_with(&format!(".{}", ext)) => format!("{}.{}", base, ext),
        _ => base,
    }
}
