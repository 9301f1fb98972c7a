// Configuration chargée depuis l'environnement (.env chargé par dotenv dans main)

use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::utils::password::PasswordScheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" | "local" => Ok(Environment::Development),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub environment: Environment,
    pub turnstile_secret: Option<String>,
    pub storage_dir: PathBuf,
    pub object_gateway_url: Option<String>,
    pub object_gateway_token: Option<String>,
    pub public_base_url: String,
    pub static_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub password_scheme: PasswordScheme,
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = try_load("PORT", "8080");
        let host: String = try_load("HOST", "127.0.0.1");

        let jwt_secret = optional("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set, using default (INSECURE)");
            "default-insecure-key-change-this".to_string()
        });

        let bootstrap_admin = match (
            optional("BOOTSTRAP_ADMIN_USERNAME"),
            optional("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        Config {
            public_base_url: optional("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://{}:{}", host, port)),
            host,
            port,
            database_url: optional("DATABASE_URL"),
            jwt_secret,
            environment: try_load("APP_ENV", "development"),
            turnstile_secret: optional("TURNSTILE_SECRET_KEY"),
            storage_dir: PathBuf::from(try_load::<String>("STORAGE_DIR", "./storage")),
            object_gateway_url: optional("OBJECT_GATEWAY_URL"),
            object_gateway_token: optional("OBJECT_GATEWAY_TOKEN"),
            static_dir: PathBuf::from(try_load::<String>("STATIC_DIR", "./public")),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", "52428800"),
            password_scheme: try_load("PASSWORD_SCHEME", "sha256"),
            bootstrap_admin,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    optional(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

#[cfg(test)]
impl Config {
    /// Configuration de développement sans variables d'environnement
    pub fn for_tests() -> Self {
        Config {
            host: "127.0.0.1".into(),
            port: 8080,
            database_url: None,
            jwt_secret: "test-secret".into(),
            environment: Environment::Development,
            turnstile_secret: None,
            storage_dir: env::temp_dir().join("encg-portal-tests"),
            object_gateway_url: None,
            object_gateway_token: None,
            public_base_url: "http://127.0.0.1:8080".into(),
            static_dir: env::temp_dir().join("encg-portal-tests-static"),
            max_upload_bytes: 1024 * 1024,
            password_scheme: PasswordScheme::Sha256,
            bootstrap_admin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("Dev".parse::<Environment>().unwrap(), Environment::Development);
        assert!("staging".parse::<Environment>().is_err());
    }
}
