// Client de la passerelle de stockage HTTP (POST /upload, GET /download, DELETE /delete)

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url, multipart};

use super::{ObjectStore, validate_key};
use crate::error::{AppError, AppResult};
use crate::models::dto::ObjectPathBody;

pub struct GatewayObjectStore {
    client: Client,
    base: Url,
    token: String,
}

impl GatewayObjectStore {
    pub fn new(base_url: &str, token: impl Into<String>) -> AppResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| AppError::validation(format!("Invalid gateway URL '{}': {}", base_url, e)))?;

        Ok(Self {
            client: Client::new(),
            base,
            token: token.into(),
        })
    }
}

/// `{base}/{name}` en conservant un éventuel préfixe de chemin
pub fn endpoint(base: &Url, name: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(name);
    }
    url
}

/// URL de téléchargement authentifié d'un objet
pub fn download_url(base: &Url, key: &str) -> Url {
    let mut url = endpoint(base, "download");
    url.query_pairs_mut().append_pair("path", key);
    url
}

#[async_trait]
impl ObjectStore for GatewayObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> AppResult<()> {
        validate_key(key)?;
        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();

        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name))
            .text("path", key.to_string());

        self.client
            .post(endpoint(&self.base, "upload"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let response = self
            .client
            .get(download_url(&self.base, key))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let bytes = response.error_for_status()?.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;
        let response = self
            .client
            .delete(endpoint(&self.base, "delete"))
            .bearer_auth(&self.token)
            .json(&ObjectPathBody { path: key.to_string() })
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }
}
