use std::convert::Infallible;

use actix_web::{delete, get, post, put, web, HttpResponse};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::middleware::AdminUser;
use crate::models::dto::ToggleActiveRequest;
use crate::models::users::{NewUser, Role, UserUpdate};
use crate::services::catalog_service::CatalogService;
use crate::services::credential_service::CredentialService;

/// GET /admin/users - Liste des comptes, sans les hashs
#[get("/users")]
pub async fn list_users(
    _admin: AdminUser,
    credentials: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let users = credentials.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

/// POST /admin/users - Créer un compte
#[post("/users")]
pub async fn create_user(
    _admin: AdminUser,
    body: web::Json<NewUser>,
    credentials: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let user = credentials.add_user(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}

/// GET /admin/users/stream - Liste des comptes en server-sent events
#[get("/users/stream")]
pub async fn users_stream(
    _admin: AdminUser,
    credentials: web::Data<CredentialService>,
) -> HttpResponse {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let errors = tx.clone();

    let subscription = credentials.subscribe_users(
        move |users| match serde_json::to_string(&users) {
            Ok(json) => {
                let _ = tx.send(format!("event: users\ndata: {}\n\n", json));
            }
            Err(e) => warn!("⚠️ Could not serialize users: {}", e),
        },
        move |e| {
            warn!("⚠️ User stream read failed: {}", e);
            let _ = errors.send("event: error\ndata: {\"error\":\"Temporary server error, please retry\"}\n\n".to_string());
        },
    );

    // l'abonnement vit aussi longtemps que le flux : déconnexion client = désabonnement
    let stream = futures::stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, Infallible>(web::Bytes::from(event)), (rx, subscription)))
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}

/// PUT /admin/users/{id} - Modification partielle
#[put("/users/{id}")]
pub async fn update_user(
    _admin: AdminUser,
    path: web::Path<String>,
    body: web::Json<UserUpdate>,
    credentials: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let update = body.into_inner();

    let loses_admin = update.role.is_some_and(|role| role != Role::Admin) || update.is_active == Some(false);
    if loses_admin {
        ensure_not_last_admin(&credentials, &id).await?;
    }

    let user = credentials.update_user(&id, update).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// DELETE /admin/users/{id} - Le dernier admin ne peut pas être supprimé
#[delete("/users/{id}")]
pub async fn delete_user(
    _admin: AdminUser,
    path: web::Path<String>,
    credentials: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    ensure_not_last_admin(&credentials, &id).await?;
    credentials.delete_user(&id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "User deleted"
    })))
}

/// POST /admin/users/{id}/active - Activer / désactiver un compte
#[post("/users/{id}/active")]
pub async fn toggle_active(
    _admin: AdminUser,
    path: web::Path<String>,
    body: web::Json<ToggleActiveRequest>,
    credentials: web::Data<CredentialService>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    if !body.is_active {
        ensure_not_last_admin(&credentials, &id).await?;
    }

    let user = credentials.toggle_active(&id, body.is_active).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// GET /admin/stats - Volumes par type de ressource
#[get("/stats")]
pub async fn stats(
    _admin: AdminUser,
    catalog: web::Data<CatalogService>,
) -> Result<HttpResponse, AppError> {
    let totals = catalog.stats().await?;
    Ok(HttpResponse::Ok().json(totals))
}

async fn ensure_not_last_admin(credentials: &CredentialService, id: &str) -> AppResult<()> {
    let target = credentials.get_user(id).await?;
    if target.role == Role::Admin && target.is_active && credentials.active_admin_count().await? <= 1 {
        return Err(AppError::validation("At least one active admin account is required"));
    }
    Ok(())
}

pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(list_users)
            .service(create_user)
            .service(users_stream)
            .service(update_user)
            .service(delete_user)
            .service(toggle_active)
            .service(stats)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};

    use crate::app::testing::{bearer, login_as, services};

    #[actix_web::test]
    async fn test_student_gets_explicit_forbidden() {
        let (services, _) = services();
        let token = login_as(&services, "ali", Role::Student).await;
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::get().uri("/api/admin/users").insert_header(bearer(&token)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Admin access required");
    }

    #[actix_web::test]
    async fn test_create_list_and_reject_short_username() {
        let (services, _) = services();
        let token = login_as(&services, "chef", Role::Admin).await;
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/api/admin/users")
            .insert_header(bearer(&token))
            .set_json(json!({ "username": "eleve1", "password": "123456", "role": "student", "year": "4eme" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/api/admin/users")
            .insert_header(bearer(&token))
            .set_json(json!({ "username": "ab", "password": "123456", "role": "student", "year": "3eme" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/admin/users").insert_header(bearer(&token)).to_request();
        let users: Value = test::call_and_read_body_json(&app, req).await;
        let users = users.as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.get("hashed_pwd").is_none()));
    }

    #[actix_web::test]
    async fn test_last_admin_cannot_be_deleted_or_disabled() {
        let (services, _) = services();
        let token = login_as(&services, "chef", Role::Admin).await;
        let admin_id = services.credentials.list_users().await.unwrap()[0].id.clone();
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/admin/users/{}", admin_id))
            .insert_header(bearer(&token))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri(&format!("/api/admin/users/{}/active", admin_id))
            .insert_header(bearer(&token))
            .set_json(json!({ "is_active": false }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        assert_eq!(services.credentials.active_admin_count().await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_stats_endpoint() {
        let (services, _) = services();
        let token = login_as(&services, "chef", Role::Admin).await;
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::get().uri("/api/admin/stats").insert_header(bearer(&token)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"]["files"], 0);
        assert_eq!(body["total"]["size"], "0 B");
    }
}
