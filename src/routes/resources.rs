use actix_multipart::Multipart;
use actix_web::{delete, get, post, put, web, HttpResponse, http::header::ContentDisposition};
use futures::StreamExt;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::{AdminUser, AuthUser};
use crate::models::dto::{AddLinkRequest, CreateModuleRequest, RenameModuleRequest};
use crate::models::resource::{AcademicYear, ModulePath, ResourceKind, ResourcePath};
use crate::services::resolver_service::{ResolverService, Upload};
use crate::services::resource_service::ResourceService;

// Paramètres de chemin : /resources/{kind}/{year}/modules/{module}/items/{key}
#[derive(Debug, Deserialize)]
pub struct YearParams {
    pub kind: String,
    pub year: String,
}

impl YearParams {
    fn parse(&self) -> AppResult<(ResourceKind, AcademicYear)> {
        let kind = self.kind.parse::<ResourceKind>().map_err(AppError::validation)?;
        let year = self.year.parse::<AcademicYear>().map_err(AppError::validation)?;
        Ok((kind, year))
    }
}

#[derive(Debug, Deserialize)]
pub struct ModuleParams {
    pub kind: String,
    pub year: String,
    pub module: String,
}

impl ModuleParams {
    fn module_path(&self) -> AppResult<ModulePath> {
        let (kind, year) = YearParams {
            kind: self.kind.clone(),
            year: self.year.clone(),
        }
        .parse()?;
        Ok(ModulePath::new(kind, year, self.module.clone()))
    }
}

#[derive(Debug, Deserialize)]
pub struct ItemParams {
    pub kind: String,
    pub year: String,
    pub module: String,
    pub key: String,
}

impl ItemParams {
    fn resource_path(&self) -> AppResult<ResourcePath> {
        let module = ModuleParams {
            kind: self.kind.clone(),
            year: self.year.clone(),
            module: self.module.clone(),
        }
        .module_path()?;
        Ok(module.resource(self.key.clone()))
    }
}

/// GET /resources/{kind}/{year}/modules - Modules et nombre de ressources
#[get("/{kind}/{year}/modules")]
pub async fn list_modules(
    _user: AuthUser,
    path: web::Path<YearParams>,
    resources: web::Data<ResourceService>,
) -> Result<HttpResponse, AppError> {
    let (kind, year) = path.parse()?;
    let modules = resources.list_modules(kind, year).await?;
    Ok(HttpResponse::Ok().json(modules))
}

/// POST /resources/{kind}/{year}/modules - Créer un module vide
#[post("/{kind}/{year}/modules")]
pub async fn create_module(
    _admin: AdminUser,
    path: web::Path<YearParams>,
    body: web::Json<CreateModuleRequest>,
    resources: web::Data<ResourceService>,
) -> Result<HttpResponse, AppError> {
    let (kind, year) = path.parse()?;
    let module = resources.create_module(kind, year, &body.name).await?;
    Ok(HttpResponse::Created().json(module))
}

/// PUT /resources/{kind}/{year}/modules/{module} - Renommer
#[put("/{kind}/{year}/modules/{module}")]
pub async fn rename_module(
    _admin: AdminUser,
    path: web::Path<ModuleParams>,
    body: web::Json<RenameModuleRequest>,
    resources: web::Data<ResourceService>,
) -> Result<HttpResponse, AppError> {
    let module = path.module_path()?;
    let renamed = resources
        .rename_module(module.kind, module.year, &module.module, &body.new_name)
        .await?;
    Ok(HttpResponse::Ok().json(renamed))
}

/// DELETE /resources/{kind}/{year}/modules/{module} - Supprimer avec ses fichiers
#[delete("/{kind}/{year}/modules/{module}")]
pub async fn delete_module(
    _admin: AdminUser,
    path: web::Path<ModuleParams>,
    resources: web::Data<ResourceService>,
) -> Result<HttpResponse, AppError> {
    let module = path.module_path()?;
    let removed = resources
        .delete_module(module.kind, module.year, &module.module)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Module deleted",
        "deleted_resources": removed
    })))
}

/// GET .../modules/{module}/items - Ressources du module
#[get("/{kind}/{year}/modules/{module}/items")]
pub async fn list_items(
    _user: AuthUser,
    path: web::Path<ModuleParams>,
    resources: web::Data<ResourceService>,
) -> Result<HttpResponse, AppError> {
    let module = path.module_path()?;
    let items = resources.list_resources(&module).await?;
    Ok(HttpResponse::Ok().json(items))
}

/// POST .../modules/{module}/items/links - Ajouter un lien
#[post("/{kind}/{year}/modules/{module}/items/links")]
pub async fn add_link(
    _admin: AdminUser,
    path: web::Path<ModuleParams>,
    body: web::Json<AddLinkRequest>,
    resources: web::Data<ResourceService>,
) -> Result<HttpResponse, AppError> {
    let module = path.module_path()?;
    let resource = resources
        .add_link_resource(&module, &body.url, &body.description)
        .await?;
    Ok(HttpResponse::Created().json(resource))
}

/// POST .../modules/{module}/items/files - Déposer un fichier (multipart `file` + `name`)
#[post("/{kind}/{year}/modules/{module}/items/files")]
pub async fn upload_file(
    _admin: AdminUser,
    path: web::Path<ModuleParams>,
    payload: Multipart,
    resolver: web::Data<ResolverService>,
) -> Result<HttpResponse, AppError> {
    let module = path.module_path()?;
    let form = read_form(payload, resolver.max_upload_bytes()).await?;

    let bytes = form.file.ok_or_else(|| AppError::validation("Missing 'file' field"))?;
    let upload = Upload {
        bytes,
        descriptive_name: form.name.unwrap_or_default(),
        original_filename: form.filename.unwrap_or_default(),
    };

    let resource = resolver.upload(&module, upload).await?;
    Ok(HttpResponse::Created().json(resource))
}

/// DELETE .../items/{key} - Supprimer une ressource et son fichier
#[delete("/{kind}/{year}/modules/{module}/items/{key}")]
pub async fn delete_item(
    _admin: AdminUser,
    path: web::Path<ItemParams>,
    resources: web::Data<ResourceService>,
) -> Result<HttpResponse, AppError> {
    let resource_path = path.resource_path()?;
    let removed = resources.delete_resource(&resource_path).await?;
    Ok(HttpResponse::Ok().json(removed))
}

/// GET .../items/{key}/resolve - URL à ouvrir (lien direct ou téléchargement authentifié)
#[get("/{kind}/{year}/modules/{module}/items/{key}/resolve")]
pub async fn resolve_item(
    user: AuthUser,
    path: web::Path<ItemParams>,
    resources: web::Data<ResourceService>,
    resolver: web::Data<ResolverService>,
) -> Result<HttpResponse, AppError> {
    let resource = resources.get_resource(&path.resource_path()?).await?;
    Ok(HttpResponse::Ok().json(resolver.resolve(&resource, &user.token)))
}

/// GET .../items/{key}/download - Contenu du fichier, nom proposé d'après la description
#[get("/{kind}/{year}/modules/{module}/items/{key}/download")]
pub async fn download_item(
    _user: AuthUser,
    path: web::Path<ItemParams>,
    resources: web::Data<ResourceService>,
    resolver: web::Data<ResolverService>,
) -> Result<HttpResponse, AppError> {
    let resource = resources.get_resource(&path.resource_path()?).await?;
    let download = resolver.download(&resource).await?;

    Ok(HttpResponse::Ok()
        .content_type(download.content_type)
        .insert_header(ContentDisposition::attachment(download.filename))
        .body(download.bytes))
}

/// Champs d'un formulaire de dépôt
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<Vec<u8>>,
    pub filename: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
}

/// Lit un formulaire multipart (`file`, `name`, `path`) en bornant la taille du fichier
pub async fn read_form(mut payload: Multipart, max_bytes: u64) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::validation(format!("Invalid multipart body: {}", e)))?;
        let field_name = field.name().unwrap_or_default().to_string();

        let is_file = field_name == "file";
        if is_file {
            form.filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);
        }

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::validation(format!("Invalid multipart body: {}", e)))?;
            if (data.len() + chunk.len()) as u64 > max_bytes {
                return Err(AppError::validation(format!(
                    "File too large (max {} MB)",
                    max_bytes / (1024 * 1024)
                )));
            }
            data.extend_from_slice(&chunk);
        }

        match field_name.as_str() {
            "file" => form.file = Some(data),
            "name" => form.name = Some(String::from_utf8_lossy(&data).into_owned()),
            "path" => form.path = Some(String::from_utf8_lossy(&data).into_owned()),
            _ => {}
        }
    }

    Ok(form)
}

pub fn resources_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/resources")
            .service(list_modules)
            .service(create_module)
            .service(rename_module)
            .service(delete_module)
            .service(list_items)
            .service(add_link)
            .service(upload_file)
            .service(resolve_item)
            .service(download_item)
            .service(delete_item)
    );
}
