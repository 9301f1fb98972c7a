use actix_web::{delete, get, post, web, HttpResponse};
use chrono::Local;

use crate::error::AppError;
use crate::middleware::AdminUser;
use crate::models::seminar::NewSeminar;
use crate::services::seminar_service::SeminarService;

/// GET /seminars - Séminaires avec statut calculé au jour courant (PUBLIC)
#[get("")]
pub async fn list_seminars(seminars: web::Data<SeminarService>) -> Result<HttpResponse, AppError> {
    let today = Local::now().date_naive();
    let views = seminars.list_with_status(today).await?;
    Ok(HttpResponse::Ok().json(views))
}

/// POST /seminars - Annoncer un séminaire
#[post("")]
pub async fn add_seminar(
    _admin: AdminUser,
    body: web::Json<NewSeminar>,
    seminars: web::Data<SeminarService>,
) -> Result<HttpResponse, AppError> {
    let seminar = seminars.add_seminar(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(seminar))
}

/// DELETE /seminars/{id}
#[delete("/{id}")]
pub async fn delete_seminar(
    _admin: AdminUser,
    path: web::Path<String>,
    seminars: web::Data<SeminarService>,
) -> Result<HttpResponse, AppError> {
    seminars.delete_seminar(&path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Seminar deleted"
    })))
}

pub fn seminars_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/seminars")
            .service(list_seminars)
            .service(add_seminar)
            .service(delete_seminar)
    );
}
