mod app;
mod cache;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod storage;
mod store;
mod telemetry;
mod utils;

use std::sync::Arc;

use actix_web::{App, HttpServer};
use tracing::{error, info, warn};

use crate::app::AppServices;
use crate::config::Config;
use crate::services::bot_check::{ChallengeVerifier, TurnstileVerifier};
use crate::storage::{ObjectStore, fs::FsObjectStore, gateway::GatewayObjectStore};
use crate::store::{TreeStore, memory::MemoryTreeStore, postgres::SeaOrmTreeStore};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::from_env();

    let store: Arc<dyn TreeStore> = match &config.database_url {
        Some(url) => {
            info!("🔌 Connecting to database...");
            let db = db::establish_connection(url).await.map_err(std::io::Error::other)?;
            db::ensure_schema(&db).await.map_err(std::io::Error::other)?;
            info!("✅ Database connected!");
            Arc::new(SeaOrmTreeStore::new(db))
        }
        None => {
            warn!("⚠️ DATABASE_URL not set, using in-memory store (data is lost on restart)");
            Arc::new(MemoryTreeStore::new())
        }
    };

    let objects: Arc<dyn ObjectStore> = match &config.object_gateway_url {
        Some(url) => {
            info!("📦 Object storage: gateway at {}", url);
            let token = config.object_gateway_token.clone().unwrap_or_default();
            Arc::new(GatewayObjectStore::new(url, token).map_err(std::io::Error::other)?)
        }
        None => {
            info!("📦 Object storage: local directory {}", config.storage_dir.display());
            Arc::new(FsObjectStore::new(config.storage_dir.clone()))
        }
    };

    let verifier: Option<Arc<dyn ChallengeVerifier>> = config
        .turnstile_secret
        .clone()
        .map(|secret| Arc::new(TurnstileVerifier::new(secret)) as Arc<dyn ChallengeVerifier>);
    if verifier.is_none() {
        if config.is_production() {
            error!("❌ TURNSTILE_SECRET_KEY not set: every login will be refused");
        } else {
            warn!("⚠️ TURNSTILE_SECRET_KEY not set: bot check bypassed (development)");
        }
    }

    let services = AppServices::build(&config, store, objects, verifier).map_err(std::io::Error::other)?;

    if let Some((username, password)) = &config.bootstrap_admin {
        if let Err(e) = services.credentials.ensure_bootstrap_admin(username, password).await {
            error!("❌ Could not create bootstrap admin: {}", e);
        }
    }

    info!("🚀 Starting server on http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        let services = services.clone();
        App::new()
            .wrap(middleware::security_headers())
            .configure(move |cfg| services.configure(cfg))
    })
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
}
