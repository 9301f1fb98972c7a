// ============================================================================
// SESSIONS
// ============================================================================
//
// Une session = une identité anonyme (backing id) liée à un enregistrement
// `user_roles/{backing_id}` dans l'arbre, plus un token de rôle signé (JWT)
// conservé par le client. Le token seul ne suffit pas : l'enregistrement doit
// exister, ce qui permet la déconnexion côté serveur.
//
// Transitions:
//   Anonymous --login ok-->  Authenticated  (enregistrement écrit, observateurs notifiés)
//   Anonymous --login ko-->  Anonymous      (erreur générique)
//   Authenticated --logout/expiration--> Anonymous (enregistrement supprimé)
//
// ============================================================================

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::users::Role;
use crate::services::credential_service::CredentialService;
use crate::store::{TreePath, TreeStore};
use crate::utils::jwt;

pub const USER_ROLES_ROOT: &str = "user_roles";
pub const SESSION_LIFETIME_DAYS: i64 = 365;
/// Intervalle minimal entre deux écritures d'activité
pub const ACTIVITY_WINDOW_SECS: i64 = 30;

pub fn session_path(backing_id: &str) -> TreePath {
    TreePath::root().child(USER_ROLES_ROOT).child(backing_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(skip)]
    pub backing_id: String,
    pub role: Role,
    pub username: String,
    pub login_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.login_at > Duration::days(SESSION_LIFETIME_DAYS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    Authenticated(Session),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleChange {
    LoggedIn { backing_id: String, username: String, role: Role },
    LoggedOut { backing_id: String },
}

#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub token: String,
    pub session: Session,
}

type Observer = Arc<dyn Fn(&RoleChange) + Send + Sync>;

pub struct SessionManager {
    credentials: Arc<CredentialService>,
    store: Arc<dyn TreeStore>,
    jwt_secret: String,
    observers: Mutex<Vec<(u64, Observer)>>,
    next_observer: AtomicU64,
}

impl SessionManager {
    pub fn new(credentials: Arc<CredentialService>, store: Arc<dyn TreeStore>, jwt_secret: impl Into<String>) -> Self {
        Self {
            credentials,
            store,
            jwt_secret: jwt_secret.into(),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(1),
        }
    }

    /// Connexion.
    ///
    /// 1. Vérifie les identifiants (échec générique, aucune écriture)
    /// 2. Réutilise l'identité anonyme présentée, sinon en crée une
    /// 3. Écrit l'enregistrement de session
    /// 4. Émet le token de rôle et notifie les observateurs
    pub async fn login(&self, username: &str, password: &str, reuse_backing_id: Option<&str>) -> AppResult<LoginGrant> {
        let user = self
            .credentials
            .find_user_for_login(username, password)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let backing_id = match reuse_backing_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let now = Utc::now();
        let session = Session {
            backing_id: backing_id.clone(),
            role: user.role,
            username: user.username.clone(),
            login_at: now,
            last_activity_at: now,
            updated_at: now,
        };
        self.store
            .write(&session_path(&backing_id), serde_json::to_value(&session)?)
            .await?;

        let token = jwt::generate_token(
            &self.jwt_secret,
            &backing_id,
            &session.username,
            session.role,
            Duration::days(SESSION_LIFETIME_DAYS),
        )
        .map_err(AppError::storage)?;

        info!("🔐 Login: {} ({})", session.username, session.role);
        self.notify(&RoleChange::LoggedIn {
            backing_id,
            username: session.username.clone(),
            role: session.role,
        });

        Ok(LoginGrant { token, session })
    }

    /// Supprime l'enregistrement : le token devient inutilisable
    pub async fn logout(&self, backing_id: &str) -> AppResult<()> {
        self.store.delete(&session_path(backing_id)).await?;
        info!("👋 Logout: {}", backing_id);
        self.notify(&RoleChange::LoggedOut {
            backing_id: backing_id.to_string(),
        });
        Ok(())
    }

    /// Valide un token de rôle contre l'enregistrement de session
    pub async fn authenticate(&self, token: &str) -> AppResult<Session> {
        let claims = jwt::verify_token(&self.jwt_secret, token).map_err(|e| {
            debug!("Token rejected: {}", e);
            AppError::Unauthorized("Invalid or expired token".into())
        })?;

        let session = self
            .load(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Session ended, please log in again".into()))?;

        if session.is_expired(Utc::now()) {
            self.logout(&session.backing_id).await?;
            return Err(AppError::Unauthorized("Session expired, please log in again".into()));
        }

        Ok(session)
    }

    pub async fn state_for(&self, token: Option<&str>) -> SessionState {
        let Some(token) = token else {
            return SessionState::Anonymous;
        };
        match self.authenticate(token).await {
            Ok(session) => SessionState::Authenticated(session),
            Err(_) => SessionState::Anonymous,
        }
    }

    /// Heartbeat d'activité, écrit au plus une fois par fenêtre de 30 s.
    /// Retourne `true` si l'enregistrement a été mis à jour.
    pub async fn record_activity(&self, backing_id: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let Some(session) = self.load(backing_id).await? else {
            return Ok(false);
        };

        if now - session.last_activity_at < Duration::seconds(ACTIVITY_WINDOW_SECS) {
            return Ok(false);
        }

        let mut fields = serde_json::Map::new();
        fields.insert("last_activity_at".into(), serde_json::to_value(now)?);
        fields.insert("updated_at".into(), serde_json::to_value(now)?);
        self.store.update(&session_path(backing_id), fields).await?;
        Ok(true)
    }

    pub async fn load(&self, backing_id: &str) -> AppResult<Option<Session>> {
        let Some(value) = self.store.read(&session_path(backing_id)).await? else {
            return Ok(None);
        };

        match serde_json::from_value::<Session>(value) {
            Ok(mut session) => {
                session.backing_id = backing_id.to_string();
                Ok(Some(session))
            }
            Err(e) => {
                warn!("⚠️ Malformed session record {}: {}", backing_id, e);
                Ok(None)
            }
        }
    }

    /// Les observateurs sont appelés de façon synchrone, dans l'ordre d'inscription
    pub fn subscribe<F>(&self, observer: F) -> u64
    where
        F: Fn(&RoleChange) + Send + Sync + 'static,
    {
        let id = self.next_observer.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.observers.lock().retain(|(observer_id, _)| *observer_id != id);
    }

    fn notify(&self, change: &RoleChange) {
        // copie pour ne pas tenir le verrou pendant les rappels
        let observers: Vec<Observer> = self.observers.lock().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer(change);
        }
    }
}
