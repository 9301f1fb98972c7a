//pour les requêtes et réponses de l'API
use serde::{Deserialize, Serialize};

use crate::models::users::Role;

// Connexion (le token anti-bot est obligatoire)
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub bot_token: Option<String>,
}

// Réponse après login : le client conserve le token de rôle
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub role: Role,
    pub username: String,
    pub backing_id: String,
}

// Réponse pour /auth/me
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: String,
    pub role: Role,
    pub backing_id: String,
    pub login_at: String,
    pub last_activity_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateModuleRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameModuleRequest {
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct AddLinkRequest {
    pub url: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct PublicQuery {
    pub limit: Option<usize>,
}

// Passerelle de stockage : GET /download?path=...
#[derive(Debug, Deserialize)]
pub struct ObjectPathQuery {
    pub path: String,
}

// Passerelle de stockage : DELETE /delete {path}, réponse de POST /upload {path}
#[derive(Debug, Serialize, Deserialize)]
pub struct ObjectPathBody {
    pub path: String,
}
