// Stockage objet : put/get/delete par clé, le fournisseur réel est interchangeable

pub mod fs;
pub mod gateway;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<()>;

    /// `None` si l'objet n'existe pas
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Supprimer un objet absent n'est pas une erreur
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Refuse les clés vides, absolues ou contenant `..`
pub fn validate_key(key: &str) -> AppResult<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if invalid {
        return Err(AppError::validation(format!("Invalid object path: {}", key)));
    }
    Ok(())
}

/// Extension en minuscules, sans le point
pub fn extension_of(name: &str) -> Option<String> {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub fn content_type_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "zip" => "application/zip",
        "rar" => "application/x-rar-compressed",
        _ => "application/octet-stream",
    }
}
