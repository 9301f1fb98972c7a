// Passerelle de stockage objet (contrat HTTP) :
//   POST   /upload            multipart `file`, `path`   -> {path}
//   GET    /download?path=    contenu brut
//   DELETE /delete            {path}
// Toutes exigent `Authorization: Bearer <token de rôle>` ; écriture réservée aux admins.

use actix_multipart::Multipart;
use actix_web::{delete, get, post, web, HttpResponse};

use crate::error::AppError;
use crate::middleware::{AdminUser, AuthUser};
use crate::models::dto::{ObjectPathBody, ObjectPathQuery};
use crate::routes::resources::read_form;
use crate::services::resolver_service::ResolverService;
use crate::storage::{ObjectStore, content_type_for, extension_of, validate_key};

#[post("/upload")]
pub async fn upload(
    _admin: AdminUser,
    payload: Multipart,
    objects: web::Data<dyn ObjectStore>,
    resolver: web::Data<ResolverService>,
) -> Result<HttpResponse, AppError> {
    let form = read_form(payload, resolver.max_upload_bytes()).await?;

    let path = form.path.ok_or_else(|| AppError::validation("Missing 'path' field"))?;
    let bytes = form.file.ok_or_else(|| AppError::validation("Missing 'file' field"))?;
    validate_key(&path)?;

    objects.put(&path, bytes).await?;
    Ok(HttpResponse::Created().json(ObjectPathBody { path }))
}

#[get("/download")]
pub async fn download(
    _user: AuthUser,
    query: web::Query<ObjectPathQuery>,
    objects: web::Data<dyn ObjectStore>,
) -> Result<HttpResponse, AppError> {
    let bytes = objects
        .get(&query.path)
        .await?
        .ok_or_else(|| AppError::not_found("Stored file not found"))?;

    let content_type = extension_of(&query.path)
        .map(|ext| content_type_for(&ext))
        .unwrap_or("application/octet-stream");

    Ok(HttpResponse::Ok().content_type(content_type).body(bytes))
}

#[delete("/delete")]
pub async fn delete_object(
    _admin: AdminUser,
    body: web::Json<ObjectPathBody>,
    objects: web::Data<dyn ObjectStore>,
) -> Result<HttpResponse, AppError> {
    objects.delete(&body.path).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Object deleted"
    })))
}

pub fn gateway_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(upload)
        .service(download)
        .service(delete_object);
}
