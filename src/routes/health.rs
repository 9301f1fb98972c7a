use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use tracing::warn;

use crate::models::health::HealthResponse;
use crate::store::{TreePath, TreeStore};

#[get("/health")]
pub async fn health_check(store: web::Data<dyn TreeStore>) -> HttpResponse {
    // lecture d'un noeud quelconque pour vérifier que le backend répond
    let status = match store.read(&TreePath::root().child("health")).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("⚠️ Health check: store unreachable: {}", e);
            "degraded"
        }
    };

    let response = HealthResponse {
        status: status.to_string(),
        store: store.backend().to_string(),
        time: Utc::now(),
    };

    HttpResponse::Ok().json(response)
}
