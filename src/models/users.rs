// ============================================================================
// MODÈLE : UTILISATEURS
// ============================================================================
//
// Chemin: users/{pushKey}
//
// Champs stockés (noms historiques conservés):
//   - username   : [a-zA-Z0-9_-], 3-20 caractères, unique sans casse
//   - hashed_pwd : SHA-256 hex (ou PBKDF2 Werkzeug)
//   - role       : "student" | "admin"
//   - year       : "3eme" | "4eme" | "5eme" | "" (admin)
//   - isActive   : absent = actif
//   - created_at : ISO-8601 UTC
//
// ============================================================================

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::resource::AcademicYear;
use crate::store::TreePath;

pub const USERS_ROOT: &str = "users";

pub fn users_path() -> TreePath {
    TreePath::root().child(USERS_ROOT)
}

pub fn user_path(id: &str) -> TreePath {
    users_path().child(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Invalid role: {}", other)),
        }
    }
}

fn default_active() -> bool {
    true
}

/// Enregistrement tel que stocké dans l'arbre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(rename = "hashed_pwd")]
    pub password_hash: String,
    pub role: Role,
    #[serde(default, with = "year_label")]
    pub year: Option<AcademicYear>,
    #[serde(rename = "isActive", default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: String,
}

/// Vue exposée par l'API (jamais le hash)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    #[serde(with = "year_label")]
    pub year: Option<AcademicYear>,
    pub is_active: bool,
    pub created_at: String,
}

impl User {
    pub fn from_record(id: &str, record: &UserRecord) -> Self {
        Self {
            id: id.to_string(),
            username: record.username.clone(),
            role: record.role,
            year: record.year,
            is_active: record.is_active,
            created_at: record.created_at.clone(),
        }
    }
}

/// Création par un admin
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters"))]
    pub username: String,
    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    pub password: String,
    pub role: Role,
    #[serde(default, with = "year_label")]
    pub year: Option<AcademicYear>,
}

/// Modification partielle : un champ `None` n'est jamais écrit
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(length(min = 3, max = 20, message = "Username must be 3-20 characters"))]
    pub username: Option<String>,
    #[validate(length(min = 6, max = 128, message = "Password must be 6-128 characters"))]
    pub password: Option<String>,
    pub role: Option<Role>,
    #[serde(default, with = "year_label")]
    pub year: Option<AcademicYear>,
    pub is_active: Option<bool>,
}

/// `year` est stocké comme libellé, chaîne vide pour un admin
mod year_label {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::models::resource::AcademicYear;

    pub fn serialize<S: Serializer>(year: &Option<AcademicYear>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(year.map(|y| y.label()).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<AcademicYear>, D::Error> {
        let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
        Ok(raw.parse().ok())
    }
}
