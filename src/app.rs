// Graphe des services : construit une fois au démarrage, partagé via web::Data

use std::sync::Arc;

use actix_web::web;

use crate::cache::LocalCache;
use crate::config::Config;
use crate::error::AppResult;
use crate::routes;
use crate::services::{
    bot_check::{BotCheckGate, ChallengeVerifier},
    catalog_service::CatalogService,
    credential_service::CredentialService,
    login_limiter::LoginLimiter,
    resolver_service::ResolverService,
    resource_service::ResourceService,
    seminar_service::SeminarService,
    session_service::SessionManager,
};
use crate::storage::ObjectStore;
use crate::store::TreeStore;

#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn TreeStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub credentials: Arc<CredentialService>,
    pub sessions: Arc<SessionManager>,
    pub bot_check: Arc<BotCheckGate>,
    pub login_limiter: Arc<LoginLimiter>,
    pub resources: Arc<ResourceService>,
    pub resolver: Arc<ResolverService>,
    pub seminars: Arc<SeminarService>,
    pub catalog: Arc<CatalogService>,
}

impl AppServices {
    pub fn build(
        config: &Config,
        store: Arc<dyn TreeStore>,
        objects: Arc<dyn ObjectStore>,
        verifier: Option<Arc<dyn ChallengeVerifier>>,
    ) -> AppResult<Self> {
        let cache = Arc::new(LocalCache::new());

        let credentials = Arc::new(CredentialService::new(store.clone(), config.password_scheme));
        let sessions = Arc::new(SessionManager::new(
            credentials.clone(),
            store.clone(),
            config.jwt_secret.clone(),
        ));
        let resources = Arc::new(ResourceService::new(store.clone(), objects.clone(), cache.clone()));
        let resolver = Arc::new(ResolverService::new(
            objects.clone(),
            resources.clone(),
            &config.public_base_url,
            config.max_upload_bytes,
        )?);

        Ok(Self {
            bot_check: Arc::new(BotCheckGate::new(verifier, config.environment)),
            login_limiter: Arc::new(LoginLimiter::default()),
            seminars: Arc::new(SeminarService::new(store.clone(), cache.clone())),
            catalog: Arc::new(CatalogService::new(store.clone(), cache, config.static_dir.clone())),
            store,
            objects,
            credentials,
            sessions,
            resources,
            resolver,
        })
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self.store.clone()))
            .app_data(web::Data::from(self.objects.clone()))
            .app_data(web::Data::from(self.credentials.clone()))
            .app_data(web::Data::from(self.sessions.clone()))
            .app_data(web::Data::from(self.bot_check.clone()))
            .app_data(web::Data::from(self.login_limiter.clone()))
            .app_data(web::Data::from(self.resources.clone()))
            .app_data(web::Data::from(self.resolver.clone()))
            .app_data(web::Data::from(self.seminars.clone()))
            .app_data(web::Data::from(self.catalog.clone()))
            .configure(routes::configure_routes);
    }
}
