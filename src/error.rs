// ============================================================================
// ERREURS APPLICATIVES
// ============================================================================
//
// Taxonomie:
//   - Validation        : format invalide, doublon (400) - aucune écriture faite
//   - InvalidCredentials: échec de login générique (401) - ne révèle jamais la cause
//   - Unauthorized      : token absent/invalide, vérification anti-bot (401)
//   - Forbidden         : rôle admin requis (403) - explicite
//   - NotFound          : ressource/module/utilisateur absent (404)
//   - TooManyRequests   : quota de tentatives de connexion dépassé (429)
//   - Storage           : panne réseau/backend (500) - message générique
//
// ============================================================================

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid credentials or inactive account")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        AppError::Storage(msg.into())
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(e: sea_orm::DbErr) -> Self {
        AppError::Storage(format!("database: {}", e))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Storage(format!("http: {}", e))
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(format!("io: {}", e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Storage(format!("malformed record: {}", e))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Le détail d'une panne de stockage reste dans les logs
        let message = match self {
            AppError::Storage(detail) => {
                tracing::error!("storage fault: {}", detail);
                "Temporary server error, please retry".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": message
        }))
    }
}

pub type AppResult<T> = Result<T, AppError>;
