// ============================================================================
// MODÈLE : ARBRE DES RESSOURCES
// ============================================================================
//
// Chemins (contrat exact):
//   - resources/{cours|td}/{year3|year4|year5}/{module}/{pushKey}
//   - resources/seminar/{pushKey}
//
// Un module vide contient uniquement `_placeholder: true`.
// Une ressource est soit un fichier (stocké, `location` = clé objet),
// soit un lien externe ; jamais les deux.
//
// ============================================================================

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::store::TreePath;

pub const RESOURCES_ROOT: &str = "resources";
pub const PLACEHOLDER_KEY: &str = "_placeholder";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cours,
    Td,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Cours, ResourceKind::Td];

    pub fn segment(&self) -> &'static str {
        match self {
            ResourceKind::Cours => "cours",
            ResourceKind::Td => "td",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cours" => Ok(ResourceKind::Cours),
            "td" => Ok(ResourceKind::Td),
            other => Err(format!("Invalid resource type: {}", other)),
        }
    }
}

/// Année d'étude : segment `year3` dans l'arbre, libellé `3eme` côté utilisateur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcademicYear {
    #[serde(rename = "year3", alias = "3eme")]
    Year3,
    #[serde(rename = "year4", alias = "4eme")]
    Year4,
    #[serde(rename = "year5", alias = "5eme")]
    Year5,
}

impl AcademicYear {
    pub const ALL: [AcademicYear; 3] = [AcademicYear::Year3, AcademicYear::Year4, AcademicYear::Year5];

    pub fn segment(&self) -> &'static str {
        match self {
            AcademicYear::Year3 => "year3",
            AcademicYear::Year4 => "year4",
            AcademicYear::Year5 => "year5",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AcademicYear::Year3 => "3eme",
            AcademicYear::Year4 => "4eme",
            AcademicYear::Year5 => "5eme",
        }
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for AcademicYear {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "year3" | "3eme" => Ok(AcademicYear::Year3),
            "year4" | "4eme" => Ok(AcademicYear::Year4),
            "year5" | "5eme" => Ok(AcademicYear::Year5),
            other => Err(format!("Invalid year: {}", other)),
        }
    }
}

/// `resources/{kind}/{year}`
pub fn year_path(kind: ResourceKind, year: AcademicYear) -> TreePath {
    TreePath::root()
        .child(RESOURCES_ROOT)
        .child(kind.segment())
        .child(year.segment())
}

/// `resources/seminar`
pub fn seminars_path() -> TreePath {
    TreePath::root().child(RESOURCES_ROOT).child("seminar")
}

/// Adresse d'un module (nom déjà normalisé)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath {
    pub kind: ResourceKind,
    pub year: AcademicYear,
    pub module: String,
}

impl ModulePath {
    pub fn new(kind: ResourceKind, year: AcademicYear, module: impl Into<String>) -> Self {
        Self {
            kind,
            year,
            module: module.into(),
        }
    }

    pub fn tree_path(&self) -> TreePath {
        year_path(self.kind, self.year).child(self.module.clone())
    }

    pub fn placeholder_path(&self) -> TreePath {
        self.tree_path().child(PLACEHOLDER_KEY)
    }

    pub fn resource(&self, key: impl Into<String>) -> ResourcePath {
        ResourcePath {
            kind: self.kind,
            year: self.year,
            module: self.module.clone(),
            key: key.into(),
        }
    }

    /// Préfixe des clés objet : `{kind}/{year}/{module}`
    pub fn storage_prefix(&self) -> String {
        format!("{}/{}/{}", self.kind.segment(), self.year.segment(), self.module)
    }
}

/// Adresse complète d'une ressource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    pub kind: ResourceKind,
    pub year: AcademicYear,
    pub module: String,
    pub key: String,
}

impl ResourcePath {
    pub fn module_path(&self) -> ModulePath {
        ModulePath::new(self.kind, self.year, self.module.clone())
    }

    pub fn tree_path(&self) -> TreePath {
        self.module_path().tree_path().child(self.key.clone())
    }
}

/// Taille stockée : octets (nouveaux uploads) ou texte formaté ("1.25 MB", anciens enregistrements)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceSize {
    Bytes(u64),
    Formatted(String),
}

impl ResourceSize {
    /// Taille en octets, en relisant le format texte si nécessaire
    pub fn bytes(&self) -> Option<u64> {
        match self {
            ResourceSize::Bytes(n) => Some(*n),
            ResourceSize::Formatted(text) => {
                let mut parts = text.split_whitespace();
                let value: f64 = parts.next()?.replace(',', ".").parse().ok()?;
                let factor = match parts.next().unwrap_or("B").to_ascii_uppercase().as_str() {
                    "B" => 1.0,
                    "KB" => 1024.0,
                    "MB" => 1024.0 * 1024.0,
                    "GB" => 1024.0 * 1024.0 * 1024.0,
                    "TB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
                    _ => return None,
                };
                Some((value * factor).round() as u64)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourcePayload {
    File {
        file_type: String,
        location: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<ResourceSize>,
    },
    Link {
        url: String,
    },
}

/// Feuille de l'arbre : fichier ou lien. Immuable sauf suppression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub payload: ResourcePayload,
}

impl Resource {
    pub fn is_file(&self) -> bool {
        matches!(self.payload, ResourcePayload::File { .. })
    }

    pub fn url(&self) -> &str {
        match &self.payload {
            ResourcePayload::File { url, .. } | ResourcePayload::Link { url } => url,
        }
    }

    /// Clé objet, seulement pour les fichiers
    pub fn location(&self) -> Option<&str> {
        match &self.payload {
            ResourcePayload::File { location, .. } => Some(location),
            ResourcePayload::Link { .. } => None,
        }
    }

    pub fn file_type(&self) -> Option<&str> {
        match &self.payload {
            ResourcePayload::File { file_type, .. } => Some(file_type),
            ResourcePayload::Link { .. } => None,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        match &self.payload {
            ResourcePayload::File { size: Some(size), .. } => size.bytes().unwrap_or(0),
            _ => 0,
        }
    }
}

/// Ligne de `listModules`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSummary {
    pub name: String,
    pub file_count: usize,
    pub last_resource_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_paths_follow_contract() {
        let module = ModulePath::new(ResourceKind::Cours, AcademicYear::Year3, "Module Gestion");
        assert_eq!(module.tree_path().key(), "resources/cours/year3/Module Gestion");
        assert_eq!(module.placeholder_path().key(), "resources/cours/year3/Module Gestion/_placeholder");
        assert_eq!(module.resource("-Nabc").tree_path().key(), "resources/cours/year3/Module Gestion/-Nabc");
        assert_eq!(module.storage_prefix(), "cours/year3/Module Gestion");
        assert_eq!(seminars_path().key(), "resources/seminar");
    }

    #[test]
    fn test_year_parsing_accepts_both_forms() {
        assert_eq!("year4".parse::<AcademicYear>().unwrap(), AcademicYear::Year4);
        assert_eq!("5eme".parse::<AcademicYear>().unwrap(), AcademicYear::Year5);
        assert!("6eme".parse::<AcademicYear>().is_err());
        assert!("seminar".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_file_record_deserializes() {
        let raw = json!({
            "id": "-Nk1",
            "type": "file",
            "file_type": "pdf",
            "location": "cours/year3/M/Rapport_-Nk1.pdf",
            "url": "https://files.example/download?path=x",
            "size": "1.50 MB",
            "created_at": "2025-01-10T10:00:00.000Z"
        });

        let resource: Resource = serde_json::from_value(raw).unwrap();
        assert!(resource.is_file());
        assert_eq!(resource.description, "");
        assert_eq!(resource.file_type(), Some("pdf"));
        assert_eq!(resource.size_bytes(), 1_572_864);
    }

    #[test]
    fn test_link_record_round_trips_with_type_tag() {
        let resource = Resource {
            id: "-Nk2".into(),
            description: "Vidéo".into(),
            created_at: "2025-01-10T10:00:00.000Z".into(),
            payload: ResourcePayload::Link { url: "https://youtu.be/x".into() },
        };

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["type"], "link");
        assert!(value.get("location").is_none());
        assert_eq!(serde_json::from_value::<Resource>(value).unwrap(), resource);
    }

    #[test]
    fn test_placeholder_is_not_a_resource() {
        assert!(serde_json::from_value::<Resource>(json!(true)).is_err());
    }
}
