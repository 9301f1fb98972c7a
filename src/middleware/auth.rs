use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use futures::future::LocalBoxFuture;
use serde::Serialize;

use crate::error::AppError;
use crate::models::users::Role;
use crate::services::session_service::SessionManager;

/// Session authentifiée résolue depuis le token de rôle
/// Utilisée comme extracteur dans les routes protégées
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub backing_id: String,
    pub username: String,
    pub role: Role,
    /// Token présenté, rejoint aux URLs de téléchargement authentifié
    #[serde(skip)]
    pub token: String,
}

/// Comme `AuthUser`, mais refuse explicitement (403) tout rôle autre qu'admin
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// Extrait le token du header `Authorization: Bearer <token>`
pub fn bearer_token(req: &HttpRequest) -> Result<String, AppError> {
    // 1. Extraire le header Authorization
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

    // 2. Convertir le header en string
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

    // 3. Extraire le token (format: "Bearer <token>")
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format (expected: Bearer <token>)".into()))
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let sessions = req.app_data::<web::Data<SessionManager>>().cloned();
        let token = bearer_token(req);

        Box::pin(async move {
            let sessions = sessions.ok_or_else(|| AppError::storage("session manager not configured"))?;
            let token = token?;

            // 4. Vérifier le token et la session associée
            let session = sessions.authenticate(&token).await?;

            // 5. Créer et retourner AuthUser
            Ok(AuthUser {
                backing_id: session.backing_id,
                username: session.username,
                role: session.role,
                token,
            })
        })
    }
}

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let user = AuthUser::from_request(req, payload);

        Box::pin(async move {
            let user = user.await?;
            if user.role != Role::Admin {
                return Err(AppError::Forbidden("Admin access required".into()));
            }
            Ok(AdminUser(user))
        })
    }
}
