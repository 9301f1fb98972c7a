use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::{Digest, Sha256};
use rand::Rng;
use base64::{Engine, engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD}};
use std::str::FromStr;

type HmacSha256 = Hmac<Sha256>;

const ITERATIONS: u32 = 260000;
const KEY_LENGTH: usize = 32;
const PBKDF2_PREFIX: &str = "pbkdf2:";

/// Schéma utilisé pour les NOUVEAUX hashs.
/// La vérification accepte toujours les deux formats (migration progressive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordScheme {
    /// SHA-256 hex sans salt, compatible avec les comptes existants
    Sha256,
    /// PBKDF2-HMAC-SHA256 salé au format Werkzeug
    Pbkdf2,
}

impl FromStr for PasswordScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(PasswordScheme::Sha256),
            "pbkdf2" => Ok(PasswordScheme::Pbkdf2),
            other => Err(format!("unknown password scheme '{}'", other)),
        }
    }
}

/// SHA-256 déterministe sur les octets UTF-8, encodé en hex minuscule.
/// Pas de salt par utilisateur : faiblesse connue, voir PasswordScheme::Pbkdf2.
pub fn sha256_hex(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    hex::encode(digest)
}

/// Hash un mot de passe selon le schéma configuré
pub fn hash_with(scheme: PasswordScheme, password: &str) -> Result<String, String> {
    match scheme {
        PasswordScheme::Sha256 => Ok(sha256_hex(password)),
        PasswordScheme::Pbkdf2 => hash_pbkdf2(password),
    }
}

/// Hash un mot de passe au format Werkzeug (compatible Python)
/// Utilise PBKDF2-HMAC-SHA256 avec 260000 itérations et un salt de 16 bytes
pub fn hash_pbkdf2(password: &str) -> Result<String, String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill(&mut salt);

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, ITERATIONS, &mut key)
        .map_err(|e| format!("PBKDF2 hash generation failed: {}", e))?;

    // Format: pbkdf2:sha256:iterations$salt$hash
    let salt_b64 = URL_SAFE_NO_PAD.encode(salt);
    let hash_b64 = URL_SAFE_NO_PAD.encode(key);

    Ok(format!("pbkdf2:sha256:{}${}${}", ITERATIONS, salt_b64, hash_b64))
}

/// Vérifie un mot de passe contre un hash stocké (SHA-256 hex ou PBKDF2 Werkzeug)
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, String> {
    if stored_hash.starts_with(PBKDF2_PREFIX) {
        verify_pbkdf2(password, stored_hash)
    } else {
        Ok(sha256_hex(password).eq_ignore_ascii_case(stored_hash))
    }
}

fn verify_pbkdf2(password: &str, stored_hash: &str) -> Result<bool, String> {
    let parts: Vec<&str> = stored_hash.split('$').collect();
    if parts.len() != 3 {
        return Err("Invalid hash format".to_string());
    }

    let header_parts: Vec<&str> = parts[0].split(':').collect();
    if header_parts.len() != 3 {
        return Err("Invalid header".to_string());
    }

    let iterations = header_parts[2]
        .parse::<u32>()
        .map_err(|_| "Invalid iterations".to_string())?;

    let salt = decode_flexible(parts[1])?;
    let expected_hash = decode_flexible(parts[2])?;

    let mut computed = vec![0u8; expected_hash.len()];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut computed)
        .map_err(|e| format!("PBKDF2 hash verification failed: {}", e))?;

    Ok(computed == expected_hash)
}

/// Décode une chaîne encodée en base64 ou hexadécimal
fn decode_flexible(input: &str) -> Result<Vec<u8>, String> {
    if input.len() == 64 && input.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(input)
            .map_err(|e| format!("Hex decode failed: {}", e));
    }

    let padded = add_base64_padding(input);

    if let Ok(decoded) = STANDARD.decode(&padded) {
        return Ok(decoded);
    }
    if let Ok(decoded) = URL_SAFE.decode(&padded) {
        return Ok(decoded);
    }
    if let Ok(decoded) = URL_SAFE_NO_PAD.decode(input) {
        return Ok(decoded);
    }
    if let Ok(decoded) = STANDARD_NO_PAD.decode(input) {
        return Ok(decoded);
    }

    hex::decode(input)
        .map_err(|_| "Failed to decode".to_string())
}

fn add_base64_padding(input: &str) -> String {
    let padding_needed = (4 - (input.len() % 4)) % 4;
    format!("{}{}", input, "=".repeat(padding_needed))
}
