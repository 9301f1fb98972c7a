use std::sync::Arc;

use serde_json::{Map, Value, json};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::users::{NewUser, Role, User, UserRecord, UserUpdate, user_path, users_path};
use crate::models::resource::AcademicYear;
use crate::store::TreeStore;
use crate::utils::clock::now_iso;
use crate::utils::password::{PasswordScheme, hash_with, verify_password};
use crate::utils::sanitize::{is_username_char, sanitize_username};

pub struct CredentialService {
    store: Arc<dyn TreeStore>,
    scheme: PasswordScheme,
}

/// Abonnement à la collection `users` ; annulé à `unsubscribe` ou au drop
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.handle.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl CredentialService {
    pub fn new(store: Arc<dyn TreeStore>, scheme: PasswordScheme) -> Self {
        Self { store, scheme }
    }

    fn hash(&self, password: &str) -> AppResult<String> {
        hash_with(self.scheme, password).map_err(AppError::storage)
    }

    /// Liste les comptes, sans jamais exposer les hashs
    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        let records = load_records(self.store.as_ref()).await?;
        Ok(records
            .iter()
            .map(|(id, record)| User::from_record(id, record))
            .collect())
    }

    pub async fn get_user(&self, id: &str) -> AppResult<User> {
        let record = self.get_record(id).await?;
        Ok(User::from_record(id, &record))
    }

    async fn get_record(&self, id: &str) -> AppResult<UserRecord> {
        let value = self
            .store
            .read(&user_path(id))
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        serde_json::from_value(value).map_err(|e| {
            warn!("⚠️ Malformed user record {}: {}", id, e);
            AppError::not_found("User not found")
        })
    }

    /// Recherche pour la connexion.
    ///
    /// `Ok(None)` couvre aussi bien "utilisateur inconnu" que "mauvais mot de passe"
    /// ou "compte désactivé" : l'appelant ne peut pas distinguer les cas.
    pub async fn find_user_for_login(&self, username: &str, password: &str) -> AppResult<Option<User>> {
        let wanted = sanitize_username(username);
        if wanted.is_empty() {
            return Ok(None);
        }

        for (id, record) in load_records(self.store.as_ref()).await? {
            if record.username != wanted || !record.is_active {
                continue;
            }
            match verify_password(password, &record.password_hash) {
                Ok(true) => return Ok(Some(User::from_record(&id, &record))),
                Ok(false) => {}
                Err(e) => warn!("⚠️ Unreadable password hash for user {}: {}", id, e),
            }
        }

        debug!("Login lookup failed for '{}'", wanted);
        Ok(None)
    }

    /// Création d'un compte par un admin.
    /// Toute la validation est faite avant la moindre écriture.
    pub async fn add_user(&self, draft: NewUser) -> AppResult<User> {
        draft
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        let username = validate_username(&draft.username)?;
        let year = year_for_role(draft.role, draft.year)?;
        self.ensure_unique(&username, None).await?;

        let record = UserRecord {
            username,
            password_hash: self.hash(&draft.password)?,
            role: draft.role,
            year,
            is_active: true,
            created_at: now_iso(),
        };

        let id = self.store.push_key();
        self.store.write(&user_path(&id), serde_json::to_value(&record)?).await?;

        info!("👤 User created: {} ({})", record.username, record.role);
        Ok(User::from_record(&id, &record))
    }

    /// Modification partielle : seuls les champs fournis sont écrits
    pub async fn update_user(&self, id: &str, update: UserUpdate) -> AppResult<User> {
        update
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        let current = self.get_record(id).await?;
        let mut fields = Map::new();

        if let Some(raw) = &update.username {
            let username = validate_username(raw)?;
            if username != current.username {
                self.ensure_unique(&username, Some(id)).await?;
            }
            fields.insert("username".into(), json!(username));
        }

        if let Some(password) = &update.password {
            fields.insert("hashed_pwd".into(), json!(self.hash(password)?));
        }

        // rôle et année restent cohérents : l'année d'un admin est vide
        if update.role.is_some() || update.year.is_some() {
            let role = update.role.unwrap_or(current.role);
            let year = year_for_role(role, update.year.or(current.year))?;
            if update.role.is_some() {
                fields.insert("role".into(), json!(role));
            }
            fields.insert("year".into(), json!(year.map(|y| y.label()).unwrap_or("")));
        }

        if let Some(is_active) = update.is_active {
            fields.insert("isActive".into(), json!(is_active));
        }

        if !fields.is_empty() {
            self.store.update(&user_path(id), fields).await?;
            info!("👤 User updated: {}", id);
        }

        self.get_user(id).await
    }

    pub async fn delete_user(&self, id: &str) -> AppResult<()> {
        let user = self.get_user(id).await?;
        self.store.delete(&user_path(id)).await?;
        info!("🗑️ User deleted: {}", user.username);
        Ok(())
    }

    pub async fn toggle_active(&self, id: &str, is_active: bool) -> AppResult<User> {
        self.update_user(
            id,
            UserUpdate {
                is_active: Some(is_active),
                ..Default::default()
            },
        )
        .await
    }

    /// Comptes admin actifs, pour ne jamais supprimer le dernier
    pub async fn active_admin_count(&self) -> AppResult<usize> {
        Ok(self
            .list_users()
            .await?
            .iter()
            .filter(|u| u.role == Role::Admin && u.is_active)
            .count())
    }

    /// Crée le compte admin initial si aucun admin n'existe
    pub async fn ensure_bootstrap_admin(&self, username: &str, password: &str) -> AppResult<bool> {
        let has_admin = self.list_users().await?.iter().any(|u| u.role == Role::Admin);
        if has_admin {
            return Ok(false);
        }

        self.add_user(NewUser {
            username: username.to_string(),
            password: password.to_string(),
            role: Role::Admin,
            year: None,
        })
        .await?;

        info!("🔑 Bootstrap admin '{}' created", username);
        Ok(true)
    }

    /// Observe la collection `users`.
    ///
    /// `on_change` reçoit la liste complète au démarrage puis à chaque changement.
    /// Une erreur de lecture est remontée à `on_error` sans arrêter l'abonnement.
    pub fn subscribe_users<F, E>(&self, on_change: F, on_error: E) -> Subscription
    where
        F: Fn(Vec<User>) + Send + Sync + 'static,
        E: Fn(AppError) + Send + Sync + 'static,
    {
        let store = Arc::clone(&self.store);
        let mut events = store.subscribe();
        let root = users_path();

        let handle = tokio::spawn(async move {
            publish_users(store.as_ref(), &on_change, &on_error).await;
            loop {
                match events.recv().await {
                    Ok(path) if root.contains(&path) || path.contains(&root) => {
                        publish_users(store.as_ref(), &on_change, &on_error).await
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("⚠️ User subscription lagged ({} events skipped)", skipped);
                        publish_users(store.as_ref(), &on_change, &on_error).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Subscription { handle }
    }

    /// Unicité insensible à la casse ; `except` exclut le compte modifié
    async fn ensure_unique(&self, username: &str, except: Option<&str>) -> AppResult<()> {
        let lowered = username.to_lowercase();
        let taken = load_records(self.store.as_ref())
            .await?
            .iter()
            .any(|(id, record)| Some(id.as_str()) != except && record.username.to_lowercase() == lowered);

        if taken {
            return Err(AppError::validation(format!("Username '{}' already exists", username)));
        }
        Ok(())
    }
}

async fn load_records(store: &dyn TreeStore) -> AppResult<Vec<(String, UserRecord)>> {
    let Some(Value::Object(entries)) = store.read(&users_path()).await? else {
        return Ok(Vec::new());
    };

    Ok(entries
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value::<UserRecord>(value) {
            Ok(record) => Some((id, record)),
            Err(e) => {
                warn!("⚠️ Skipping malformed user record {}: {}", id, e);
                None
            }
        })
        .collect())
}

async fn publish_users<F, E>(store: &dyn TreeStore, on_change: &F, on_error: &E)
where
    F: Fn(Vec<User>),
    E: Fn(AppError),
{
    match load_records(store).await {
        Ok(records) => on_change(
            records
                .iter()
                .map(|(id, record)| User::from_record(id, record))
                .collect(),
        ),
        Err(e) => on_error(e),
    }
}

fn validate_username(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if !trimmed.chars().all(is_username_char) {
        return Err(AppError::validation(
            "Username may only contain letters, digits, '_' and '-'",
        ));
    }

    let username = sanitize_username(trimmed);
    if username.chars().count() < 3 {
        return Err(AppError::validation("Username must be 3-20 characters"));
    }
    Ok(username)
}

fn year_for_role(role: Role, year: Option<AcademicYear>) -> AppResult<Option<AcademicYear>> {
    match role {
        Role::Admin => Ok(None),
        Role::Student => year
            .map(Some)
            .ok_or_else(|| AppError::validation("A student account requires a year")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryTreeStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn service() -> CredentialService {
        CredentialService::new(Arc::new(MemoryTreeStore::new()), PasswordScheme::Sha256)
    }

    fn student(username: &str, password: &str) -> NewUser {
        NewUser {
            username: username.into(),
            password: password.into(),
            role: Role::Student,
            year: Some(AcademicYear::Year3),
        }
    }

    #[tokio::test]
    async fn test_short_username_is_rejected_before_any_write() {
        let store = Arc::new(MemoryTreeStore::new());
        let service = CredentialService::new(store.clone(), PasswordScheme::Sha256);

        let result = service.add_user(student("ab", "123456")).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(store.read(&users_path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_characters_are_rejected() {
        let service = service();
        let result = service.add_user(student("ali baba", "123456")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_usernames_are_unique_ignoring_case() {
        let service = service();
        service.add_user(student("Ali_3", "123456")).await.unwrap();

        let result = service.add_user(student("ali_3", "abcdef")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(service.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_student_requires_year_and_admin_has_none() {
        let service = service();

        let mut no_year = student("eleve1", "123456");
        no_year.year = None;
        assert!(service.add_user(no_year).await.is_err());

        let admin = service
            .add_user(NewUser {
                username: "chef".into(),
                password: "123456".into(),
                role: Role::Admin,
                year: Some(AcademicYear::Year5),
            })
            .await
            .unwrap();
        assert_eq!(admin.year, None);
    }

    #[tokio::test]
    async fn test_login_lookup() {
        let service = service();
        let created = service.add_user(student("ali", "secret1")).await.unwrap();

        let found = service.find_user_for_login("ali", "secret1").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(created.id));

        // caractères interdits retirés avant la comparaison
        assert!(service.find_user_for_login(" ali!", "secret1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let service = service();
        let user = service.add_user(student("ali", "secret1")).await.unwrap();

        let wrong_password = service.find_user_for_login("ali", "nope").await.unwrap();
        let unknown = service.find_user_for_login("nobody", "secret1").await.unwrap();
        assert_eq!(wrong_password, None);
        assert_eq!(unknown, None);

        service.toggle_active(&user.id, false).await.unwrap();
        assert_eq!(service.find_user_for_login("ali", "secret1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_on_empty_collection() {
        assert_eq!(service().find_user_for_login("ali", "secret1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pbkdf2_accounts_can_log_in() {
        let service = CredentialService::new(Arc::new(MemoryTreeStore::new()), PasswordScheme::Pbkdf2);
        service.add_user(student("ali", "secret1")).await.unwrap();
        assert!(service.find_user_for_login("ali", "secret1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_writes_only_given_fields() {
        let store = Arc::new(MemoryTreeStore::new());
        let service = CredentialService::new(store.clone(), PasswordScheme::Sha256);
        let user = service.add_user(student("ali", "secret1")).await.unwrap();

        let before = store.read(&user_path(&user.id)).await.unwrap().unwrap();
        let updated = service
            .update_user(
                &user.id,
                UserUpdate {
                    year: Some(AcademicYear::Year4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let after = store.read(&user_path(&user.id)).await.unwrap().unwrap();

        assert_eq!(updated.year, Some(AcademicYear::Year4));
        assert_eq!(after["username"], before["username"]);
        assert_eq!(after["hashed_pwd"], before["hashed_pwd"]);
        assert_eq!(after["year"], "4eme");
    }

    #[tokio::test]
    async fn test_update_password_changes_login() {
        let service = service();
        let user = service.add_user(student("ali", "secret1")).await.unwrap();

        service
            .update_user(
                &user.id,
                UserUpdate {
                    password: Some("secret2".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(service.find_user_for_login("ali", "secret1").await.unwrap().is_none());
        assert!(service.find_user_for_login("ali", "secret2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_promote_to_admin_clears_year() {
        let service = service();
        let user = service.add_user(student("ali", "secret1")).await.unwrap();

        let updated = service
            .update_user(
                &user.id,
                UserUpdate {
                    role: Some(Role::Admin),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.role, Role::Admin);
        assert_eq!(updated.year, None);
        assert_eq!(service.active_admin_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_user() {
        let result = service().delete_user("-missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_runs_once() {
        let service = service();
        assert!(service.ensure_bootstrap_admin("admin", "changeme").await.unwrap());
        assert!(!service.ensure_bootstrap_admin("admin2", "changeme").await.unwrap());
        assert_eq!(service.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscription_sees_new_users() {
        let service = service();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = service.subscribe_users(
            move |users| {
                let _ = tx.send(users.len());
            },
            |_| {},
        );

        service.add_user(student("ali", "secret1")).await.unwrap();

        let seen_one = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(count) = rx.recv().await {
                if count == 1 {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        assert!(seen_one);
        subscription.unsubscribe();
    }
}
