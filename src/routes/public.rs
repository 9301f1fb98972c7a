use actix_web::{get, web, HttpRequest, HttpResponse};
use chrono::Local;
use tracing::warn;

use crate::error::AppError;
use crate::middleware::auth::bearer_token;
use crate::models::dto::PublicQuery;
use crate::models::resource::ResourceKind;
use crate::models::seminar::{SeminarStatus, SeminarView};
use crate::services::catalog_service::{CatalogService, HOME_PREVIEW_LIMIT};
use crate::services::seminar_service::SeminarService;
use crate::services::session_service::{SessionManager, SessionState};

async fn is_authenticated(req: &HttpRequest, sessions: &SessionManager) -> bool {
    let token = bearer_token(req).ok();
    matches!(sessions.state_for(token.as_deref()).await, SessionState::Authenticated(_))
}

/// GET /public/home - Aperçu de la page d'accueil : 3 derniers cours, TD et séminaires à venir
#[get("/home")]
pub async fn home(
    req: HttpRequest,
    sessions: web::Data<SessionManager>,
    catalog: web::Data<CatalogService>,
    seminars: web::Data<SeminarService>,
) -> HttpResponse {
    let authenticated = is_authenticated(&req, &sessions).await;
    let cours = catalog.public_listing(ResourceKind::Cours, authenticated, Some(HOME_PREVIEW_LIMIT)).await;
    let td = catalog.public_listing(ResourceKind::Td, authenticated, Some(HOME_PREVIEW_LIMIT)).await;

    // une panne de lecture des séminaires ne doit pas casser la page d'accueil
    let today = Local::now().date_naive();
    let mut upcoming: Vec<SeminarView> = match seminars.list_with_status(today).await {
        Ok(views) => views
            .into_iter()
            .filter(|view| view.status != SeminarStatus::Past)
            .collect(),
        Err(e) => {
            warn!("⚠️ Home: seminars unavailable: {}", e);
            Vec::new()
        }
    };
    // liste triée du plus lointain au plus proche : on garde les plus proches
    upcoming.reverse();
    upcoming.truncate(HOME_PREVIEW_LIMIT);

    HttpResponse::Ok().json(serde_json::json!({
        "cours": cours,
        "td": td,
        "seminars": upcoming
    }))
}

/// GET /public/{kind}?limit=N - Données vivantes si connecté, index statique sinon
#[get("/{kind}")]
pub async fn listing(
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<PublicQuery>,
    sessions: web::Data<SessionManager>,
    catalog: web::Data<CatalogService>,
) -> Result<HttpResponse, AppError> {
    let kind = path.parse::<ResourceKind>().map_err(AppError::validation)?;
    let authenticated = is_authenticated(&req, &sessions).await;

    let items = catalog.public_listing(kind, authenticated, query.limit).await;
    Ok(HttpResponse::Ok().json(items))
}

pub fn public_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/public")
            .service(home)
            .service(listing)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test};
    use serde_json::Value;

    use crate::app::testing::{bearer, login_as, services};
    use crate::models::resource::{AcademicYear, ModulePath};
    use crate::models::users::Role;

    #[actix_web::test]
    async fn test_listing_source_depends_on_session() {
        let (services, _) = services();
        let token = login_as(&services, "ali", Role::Student).await;
        let module = ModulePath::new(ResourceKind::Cours, AcademicYear::Year3, "Gestion");
        services.resources.create_module(module.kind, module.year, "Gestion").await.unwrap();
        services.resources.add_link_resource(&module, "https://a.example", "A").await.unwrap();
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::get().uri("/api/public/cours?limit=3").insert_header(bearer(&token)).to_request();
        let live: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(live["source"], "live");
        assert_eq!(live["items"][0]["module"], "Gestion");

        let req = test::TestRequest::get().uri("/api/public/cours").to_request();
        let fallback: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fallback["source"], "static");
    }

    #[actix_web::test]
    async fn test_home_preview() {
        let (services, _) = services();
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::get().uri("/api/public/home").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["cours"]["source"], "static");
        assert!(body["seminars"].as_array().unwrap().is_empty());
    }
}
