use actix_web::{get, post, web, HttpRequest, HttpResponse};
use chrono::Utc;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::middleware::auth::bearer_token;
use crate::models::dto::{LoginRequest, LoginResponse, MeResponse};
use crate::services::bot_check::BotCheckGate;
use crate::services::login_limiter::LoginLimiter;
use crate::services::session_service::SessionManager;
use crate::utils::clock::iso;

/// POST /auth/login - Se connecter (PUBLIC, vérification anti-bot obligatoire)
#[post("/login")]
pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    bot_check: web::Data<BotCheckGate>,
    limiter: web::Data<LoginLimiter>,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    // 1. Quota de tentatives, puis vérification anti-bot avant tout accès aux identifiants
    let remote_ip = req.connection_info().realip_remote_addr().map(str::to_string);
    limiter.check(remote_ip.as_deref())?;
    bot_check
        .check(body.bot_token.as_deref(), remote_ip.as_deref())
        .await?;

    // 2. Réutiliser l'identité anonyme d'un token encore valide
    let reuse = match bearer_token(&req) {
        Ok(token) => sessions.authenticate(&token).await.ok().map(|s| s.backing_id),
        Err(_) => None,
    };

    // 3. Vérifier les identifiants et ouvrir la session
    let grant = sessions
        .login(&body.username, &body.password, reuse.as_deref())
        .await?;
    limiter.reset(remote_ip.as_deref());

    // 4. Retourner le token de rôle
    Ok(HttpResponse::Ok().json(LoginResponse {
        token: grant.token,
        role: grant.session.role,
        username: grant.session.username,
        backing_id: grant.session.backing_id,
    }))
}

/// POST /auth/logout - Fermer la session (PROTÉGÉ)
#[post("/logout")]
pub async fn logout(
    user: AuthUser,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    sessions.logout(&user.backing_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out"
    })))
}

/// GET /auth/me - Session courante (PROTÉGÉ)
#[get("/me")]
pub async fn me(
    user: AuthUser,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let session = sessions
        .load(&user.backing_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Session ended, please log in again".into()))?;

    Ok(HttpResponse::Ok().json(MeResponse {
        username: session.username,
        role: session.role,
        backing_id: session.backing_id,
        login_at: iso(session.login_at),
        last_activity_at: iso(session.last_activity_at),
    }))
}

/// POST /auth/activity - Heartbeat (clic, frappe, défilement côté client)
#[post("/activity")]
pub async fn activity(
    user: AuthUser,
    sessions: web::Data<SessionManager>,
) -> Result<HttpResponse, AppError> {
    let recorded = sessions.record_activity(&user.backing_id, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "recorded": recorded
    })))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(login)
            .service(logout)
            .service(me)
            .service(activity)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::{Value, json};

    use crate::app::testing::{bearer, login_as, services};
    use crate::models::users::Role;

    #[actix_web::test]
    async fn test_login_flow_and_logout() {
        let (services, _) = services();
        login_as(&services, "ali", Role::Student).await;
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "username": "ali", "password": "secret1", "bot_token": "tok" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "student");
        let token = body["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&token)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["username"], "ali");

        let req = test::TestRequest::post().uri("/api/auth/logout").insert_header(bearer(&token)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&token)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_login_requires_bot_token() {
        let (services, _) = services();
        login_as(&services, "ali", Role::Student).await;
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({ "username": "ali", "password": "secret1" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_login_failure_is_generic() {
        let (services, _) = services();
        login_as(&services, "ali", Role::Student).await;
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let mut bodies = Vec::new();
        for (username, password) in [("ali", "wrong"), ("nobody", "secret1")] {
            let req = test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({ "username": username, "password": password, "bot_token": "tok" }))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            bodies.push(test::read_body(resp).await);
        }
        assert_eq!(bodies[0], bodies[1]);
    }

    #[actix_web::test]
    async fn test_login_attempts_are_limited_until_success() {
        let (services, _) = services();
        login_as(&services, "ali", Role::Student).await;
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let attempt = |password: &str| {
            test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(json!({ "username": "ali", "password": password, "bot_token": "tok" }))
                .to_request()
        };

        for _ in 0..4 {
            assert_eq!(test::call_service(&app, attempt("wrong")).await.status(), StatusCode::UNAUTHORIZED);
        }
        // la réussite remet le compteur à zéro
        assert_eq!(test::call_service(&app, attempt("secret1")).await.status(), StatusCode::OK);

        for _ in 0..5 {
            assert_eq!(test::call_service(&app, attempt("wrong")).await.status(), StatusCode::UNAUTHORIZED);
        }
        let resp = test::call_service(&app, attempt("secret1")).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[actix_web::test]
    async fn test_missing_header_is_unauthorized() {
        let (services, _) = services();
        let app = test::init_service(App::new().configure(|cfg| services.configure(cfg))).await;

        let req = test::TestRequest::post().uri("/api/auth/activity").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }
}
