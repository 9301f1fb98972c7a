use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey, Algorithm};
use serde::{Deserialize, Serialize};
use chrono::{Utc, Duration};

use crate::models::users::Role;

/// Token de rôle conservé côté client et présenté en `Authorization: Bearer`
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,     // identité anonyme (backing id)
    pub username: String,
    pub role: Role,
    pub exp: i64,        // expiration timestamp
}

/// Génère un token de rôle pour une session
pub fn generate_token(
    secret: &str,
    backing_id: &str,
    username: &str,
    role: Role,
    lifetime: Duration,
) -> Result<String, String> {
    let expiration = Utc::now()
        .checked_add_signed(lifetime)
        .ok_or("Failed to calculate expiration")?
        .timestamp();

    let claims = Claims {
        sub: backing_id.to_string(),
        username: username.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
        .map_err(|e| format!("Failed to generate token: {}", e))
}

/// Vérifie et décode un token de rôle
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
        .map(|data| data.claims)
        .map_err(|e| format!("Invalid token: {}", e))
}
